//! Per-layer record schemas.
//!
//! Each supported [`PduType`] has one record schema listing its fields in
//! encoding order. Every record is followed by an implicit `inner` field: a
//! union of `null` and every registered record, which carries the next layer
//! of the frame. Union branch `0` is `null`; branch `i + 1` is the record at
//! position `i` of the registry.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use serde_json::{json, Value as Json};
use sha2::{Digest, Sha256};

use crate::models::pdu::PduType;

/// Declared type of a record field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldType {
    Boolean,
    Int,
    Long,
    Bytes,
    String,
    Fixed(usize),
    /// Union of `null` and the wrapped type.
    Optional(Box<FieldType>),
    Array(Box<FieldType>),
}

impl FieldType {
    pub fn optional(inner: FieldType) -> Self {
        Self::Optional(Box::new(inner))
    }

    pub fn array(items: FieldType) -> Self {
        Self::Array(Box::new(items))
    }

    /// Human-readable form used in encoding errors.
    pub fn describe(&self) -> String {
        match self {
            Self::Boolean => "boolean".into(),
            Self::Int => "int".into(),
            Self::Long => "long".into(),
            Self::Bytes => "bytes".into(),
            Self::String => "string".into(),
            Self::Fixed(size) => format!("fixed({size})"),
            Self::Optional(inner) => format!("optional<{}>", inner.describe()),
            Self::Array(items) => format!("array<{}>", items.describe()),
        }
    }

    fn to_json(&self, record: &str, field: &str) -> Json {
        match self {
            Self::Boolean => json!("boolean"),
            Self::Int => json!("int"),
            Self::Long => json!("long"),
            Self::Bytes => json!("bytes"),
            Self::String => json!("string"),
            Self::Fixed(size) => json!({
                "type": "fixed",
                "name": format!("{record}_{field}"),
                "size": size,
            }),
            Self::Optional(inner) => json!(["null", inner.to_json(record, field)]),
            Self::Array(items) => json!({
                "type": "array",
                "items": items.to_json(record, field),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSchema {
    pub name: String,
    pub ty: FieldType,
}

impl FieldSchema {
    pub fn new(name: &str, ty: FieldType) -> Self {
        Self {
            name: name.to_string(),
            ty,
        }
    }
}

/// Record schema for one protocol layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordSchema {
    pub pdu_type: PduType,
    pub name: String,
    pub fields: Vec<FieldSchema>,
}

impl RecordSchema {
    pub fn new(pdu_type: PduType, name: &str, fields: Vec<FieldSchema>) -> Self {
        Self {
            pdu_type,
            name: name.to_string(),
            fields,
        }
    }
}

static BUILTIN: LazyLock<Arc<SchemaRegistry>> =
    LazyLock::new(|| Arc::new(SchemaRegistry::new(builtin_records())));

/// Read-only collection of record schemas keyed by layer type.
#[derive(Debug)]
pub struct SchemaRegistry {
    records: Vec<RecordSchema>,
    index: HashMap<PduType, usize>,
}

impl SchemaRegistry {
    /// Build a registry. If a layer type appears twice, the first record wins.
    pub fn new(records: Vec<RecordSchema>) -> Self {
        let mut index = HashMap::with_capacity(records.len());
        for (position, record) in records.iter().enumerate() {
            index.entry(record.pdu_type).or_insert(position);
        }
        Self { records, index }
    }

    /// Process-wide registry covering every layer the dissector produces.
    pub fn builtin() -> Arc<SchemaRegistry> {
        Arc::clone(&BUILTIN)
    }

    pub fn get(&self, pdu_type: PduType) -> Option<&RecordSchema> {
        self.index.get(&pdu_type).map(|&i| &self.records[i])
    }

    /// Union branch index of a layer type inside an `inner` field.
    pub fn branch(&self, pdu_type: PduType) -> Option<usize> {
        self.index.get(&pdu_type).map(|&i| i + 1)
    }

    pub fn records(&self) -> &[RecordSchema] {
        &self.records
    }

    /// JSON schema document for one record, including its `inner` union.
    pub fn record_json(&self, pdu_type: PduType) -> Option<Json> {
        let record = self.get(pdu_type)?;

        let mut fields: Vec<Json> = record
            .fields
            .iter()
            .map(|f| json!({ "name": f.name, "type": f.ty.to_json(&record.name, &f.name) }))
            .collect();

        let mut branches = vec![json!("null")];
        branches.extend(self.records.iter().map(|r| json!(r.name)));
        fields.push(json!({ "name": "inner", "type": branches }));

        Some(json!({
            "type": "record",
            "name": record.name,
            "tag": record.pdu_type.tag(),
            "fields": fields,
        }))
    }

    /// JSON document describing the frame envelope and every record.
    pub fn to_json(&self) -> Json {
        let records: Vec<Json> = self
            .records
            .iter()
            .filter_map(|r| self.record_json(r.pdu_type))
            .collect();
        json!({
            "envelope": [
                { "name": "timestamp_us", "type": "long" },
                { "name": "length", "type": "long" },
            ],
            "records": records,
        })
    }

    /// SHA-256 of a record's canonical JSON form.
    pub fn fingerprint(&self, pdu_type: PduType) -> Option<[u8; 32]> {
        let canonical = serde_json::to_vec(&self.record_json(pdu_type)?).ok()?;
        let digest = Sha256::digest(&canonical);
        let mut fingerprint = [0u8; 32];
        fingerprint.copy_from_slice(&digest);
        Some(fingerprint)
    }
}

fn builtin_records() -> Vec<RecordSchema> {
    use FieldType::*;

    let f = FieldSchema::new;
    vec![
        RecordSchema::new(PduType::Raw, "Raw", vec![f("payload", Bytes)]),
        RecordSchema::new(
            PduType::EthernetII,
            "EthernetII",
            vec![
                f("dst_addr", Fixed(6)),
                f("src_addr", Fixed(6)),
                f("payload_type", Int),
            ],
        ),
        RecordSchema::new(
            PduType::Dot1Q,
            "Dot1Q",
            vec![
                f("priority", Int),
                f("cfi", Boolean),
                f("id", Int),
                f("payload_type", Int),
            ],
        ),
        RecordSchema::new(
            PduType::Arp,
            "Arp",
            vec![
                f("hw_addr_format", Int),
                f("prot_addr_format", Int),
                f("opcode", Int),
                f("sender_hw_addr", Fixed(6)),
                f("sender_ip_addr", Fixed(4)),
                f("target_hw_addr", Fixed(6)),
                f("target_ip_addr", Fixed(4)),
            ],
        ),
        RecordSchema::new(
            PduType::Ip,
            "Ip",
            vec![
                f("tos", Int),
                f("tot_len", Int),
                f("id", Int),
                f("dont_fragment", Boolean),
                f("more_fragments", Boolean),
                f("frag_off", Int),
                f("ttl", Int),
                f("protocol", Int),
                f("checksum", Int),
                f("src_addr", Fixed(4)),
                f("dst_addr", Fixed(4)),
            ],
        ),
        RecordSchema::new(
            PduType::Ipv6,
            "Ipv6",
            vec![
                f("traffic_class", Int),
                f("flow_label", Int),
                f("payload_length", Int),
                f("next_header", Int),
                f("hop_limit", Int),
                f("src_addr", Fixed(16)),
                f("dst_addr", Fixed(16)),
            ],
        ),
        RecordSchema::new(
            PduType::Tcp,
            "Tcp",
            vec![
                f("sport", Int),
                f("dport", Int),
                f("seq", Long),
                f("ack_seq", Long),
                f("data_offset", Int),
                f("flags", Int),
                f("window", Int),
                f("checksum", Int),
                f("urg_ptr", Int),
                f("options", Bytes),
            ],
        ),
        RecordSchema::new(
            PduType::Udp,
            "Udp",
            vec![
                f("sport", Int),
                f("dport", Int),
                f("length", Int),
                f("checksum", Int),
            ],
        ),
        RecordSchema::new(
            PduType::Icmp,
            "Icmp",
            vec![
                f("type", Int),
                f("code", Int),
                f("checksum", Int),
                f("rest_of_header", Fixed(4)),
            ],
        ),
        RecordSchema::new(
            PduType::Icmpv6,
            "Icmpv6",
            vec![
                f("type", Int),
                f("code", Int),
                f("checksum", Int),
                f("rest_of_header", Fixed(4)),
            ],
        ),
    ]
}
