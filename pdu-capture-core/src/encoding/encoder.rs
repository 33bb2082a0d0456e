use std::sync::Arc;

use crate::models::error::EncodingError;
use crate::models::pdu::{Layer, Pdu, Value};

use super::binary;
use super::schema::{FieldType, RecordSchema, SchemaRegistry};

/// Serializes PDUs into self-describing binary records.
///
/// Record layout:
/// ```text
/// [timestamp_us: long] [length: long]
/// [root layer fields...] [inner: union index] [inner layer fields...] ... [0]
/// ```
///
/// Output depends only on the registry and the PDU, so encoding the same PDU
/// twice yields identical bytes.
pub struct Encoder {
    registry: Arc<SchemaRegistry>,
    scratch: Vec<u8>,
}

impl Encoder {
    pub fn new() -> Self {
        Self::with_registry(SchemaRegistry::builtin())
    }

    pub fn with_registry(registry: Arc<SchemaRegistry>) -> Self {
        Self {
            registry,
            scratch: Vec::with_capacity(256),
        }
    }

    pub fn registry(&self) -> &Arc<SchemaRegistry> {
        &self.registry
    }

    /// Encode a PDU into the encoder's scratch buffer and return the bytes.
    ///
    /// The returned slice is valid until the next call.
    pub fn encode(&mut self, pdu: &Pdu) -> Result<&[u8], EncodingError> {
        self.scratch.clear();
        if self.registry.get(pdu.pdu_type()).is_none() {
            return Err(EncodingError::UnknownSchema(pdu.pdu_type()));
        }

        binary::write_long(&mut self.scratch, pdu.timestamp_us);
        binary::write_long(&mut self.scratch, i64::from(pdu.length));
        encode_layer(&self.registry, &pdu.root, &mut self.scratch)?;
        Ok(&self.scratch)
    }

    pub fn encode_to_vec(&mut self, pdu: &Pdu) -> Result<Vec<u8>, EncodingError> {
        self.encode(pdu).map(<[u8]>::to_vec)
    }
}

impl Default for Encoder {
    fn default() -> Self {
        Self::new()
    }
}

fn encode_layer(
    registry: &SchemaRegistry,
    layer: &Layer,
    out: &mut Vec<u8>,
) -> Result<(), EncodingError> {
    let schema = registry
        .get(layer.pdu_type)
        .ok_or(EncodingError::UnknownSchema(layer.pdu_type))?;

    if schema.fields.len() != layer.fields.len() {
        return Err(EncodingError::FieldCount {
            record: schema.name.clone(),
            expected: schema.fields.len(),
            found: layer.fields.len(),
        });
    }

    for (field, value) in schema.fields.iter().zip(&layer.fields) {
        encode_value(schema, &field.name, &field.ty, value, out)?;
    }

    match &layer.inner {
        None => binary::write_long(out, 0),
        Some(inner) => {
            let branch = registry
                .branch(inner.pdu_type)
                .ok_or(EncodingError::UnknownSchema(inner.pdu_type))?;
            binary::write_long(out, branch as i64);
            encode_layer(registry, inner, out)?;
        }
    }
    Ok(())
}

fn encode_value(
    schema: &RecordSchema,
    field: &str,
    ty: &FieldType,
    value: &Value,
    out: &mut Vec<u8>,
) -> Result<(), EncodingError> {
    match (ty, value) {
        (FieldType::Boolean, Value::Boolean(b)) => binary::write_boolean(out, *b),
        (FieldType::Int, Value::Int(n)) => binary::write_int(out, *n),
        (FieldType::Long, Value::Long(n)) => binary::write_long(out, *n),
        (FieldType::Long, Value::Int(n)) => binary::write_long(out, i64::from(*n)),
        (FieldType::Bytes, Value::Bytes(bytes)) => binary::write_bytes(out, bytes),
        (FieldType::String, Value::String(s)) => binary::write_bytes(out, s.as_bytes()),
        (FieldType::Fixed(size), Value::Fixed(bytes)) => {
            if bytes.len() != *size {
                return Err(EncodingError::FixedSize {
                    record: schema.name.clone(),
                    field: field.to_string(),
                    expected: *size,
                    found: bytes.len(),
                });
            }
            out.extend_from_slice(bytes);
        }
        (FieldType::Optional(_), Value::Null) => binary::write_long(out, 0),
        (FieldType::Optional(inner), value) => {
            binary::write_long(out, 1);
            encode_value(schema, field, inner, value, out)?;
        }
        (FieldType::Array(items), Value::Array(values)) => {
            if !values.is_empty() {
                binary::write_long(out, values.len() as i64);
                for item in values {
                    encode_value(schema, field, items, item, out)?;
                }
            }
            binary::write_long(out, 0);
        }
        (ty, value) => {
            return Err(EncodingError::FieldType {
                record: schema.name.clone(),
                field: field.to_string(),
                expected: ty.describe(),
                found: value.kind().to_string(),
            })
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::schema::FieldSchema;
    use crate::models::pdu::PduType;

    fn udp_pdu(payload: &[u8]) -> Pdu {
        let udp = Layer::new(
            PduType::Udp,
            vec![
                Value::Int(5353),
                Value::Int(53),
                Value::Int(8 + payload.len() as i32),
                Value::Int(0),
            ],
        )
        .with_inner(Layer::raw(payload));
        Pdu::new(1_000, 8 + payload.len() as u32, udp)
    }

    fn custom(fields: Vec<FieldSchema>) -> Encoder {
        Encoder::with_registry(Arc::new(SchemaRegistry::new(vec![RecordSchema::new(
            PduType::Raw,
            "Custom",
            fields,
        )])))
    }

    #[test]
    fn encodes_envelope_and_layer_chain() {
        let mut encoder = Encoder::new();
        let bytes = encoder.encode_to_vec(&udp_pdu(b"ok")).unwrap();

        let raw_branch = SchemaRegistry::builtin().branch(PduType::Raw).unwrap() as u8;
        let expected = vec![
            0xd0, 0x0f, // timestamp 1000
            0x14, // length 10
            0xd2, 0x53, // sport 5353
            0x6a, // dport 53
            0x14, // length 10
            0x00, // checksum 0
            raw_branch << 1, // inner → Raw
            0x04, b'o', b'k', // payload
            0x00, // Raw inner → null
        ];
        assert_eq!(bytes, expected);
    }

    #[test]
    fn encoding_is_idempotent() {
        let mut encoder = Encoder::new();
        let pdu = udp_pdu(b"same bytes");
        let first = encoder.encode_to_vec(&pdu).unwrap();
        let second = encoder.encode_to_vec(&pdu).unwrap();
        assert_eq!(first, second);

        let mut other = Encoder::new();
        assert_eq!(other.encode_to_vec(&pdu).unwrap(), first);
    }

    #[test]
    fn unknown_root_schema_is_an_error() {
        let mut encoder = Encoder::with_registry(Arc::new(SchemaRegistry::new(vec![])));
        let err = encoder.encode(&udp_pdu(b"")).unwrap_err();
        assert_eq!(err, EncodingError::UnknownSchema(PduType::Udp));
    }

    #[test]
    fn unknown_inner_schema_is_an_error() {
        let mut encoder = custom(vec![]);
        let pdu = Pdu::new(
            0,
            0,
            Layer::new(PduType::Raw, vec![]).with_inner(Layer::new(PduType::Tcp, vec![])),
        );
        assert_eq!(
            encoder.encode(&pdu).unwrap_err(),
            EncodingError::UnknownSchema(PduType::Tcp)
        );
    }

    #[test]
    fn field_count_mismatch() {
        let mut encoder = Encoder::new();
        let pdu = Pdu::new(0, 0, Layer::new(PduType::Udp, vec![Value::Int(1)]));
        assert!(matches!(
            encoder.encode(&pdu),
            Err(EncodingError::FieldCount { expected: 4, found: 1, .. })
        ));
    }

    #[test]
    fn field_type_mismatch_names_field() {
        let mut encoder = Encoder::new();
        let pdu = Pdu::new(0, 0, Layer::new(PduType::Raw, vec![Value::Int(7)]));
        assert_eq!(
            encoder.encode(&pdu).unwrap_err(),
            EncodingError::FieldType {
                record: "Raw".into(),
                field: "payload".into(),
                expected: "bytes".into(),
                found: "int".into(),
            }
        );
    }

    #[test]
    fn fixed_size_is_enforced() {
        let mut encoder = custom(vec![FieldSchema::new("mac", FieldType::Fixed(6))]);
        let pdu = Pdu::new(0, 0, Layer::new(PduType::Raw, vec![Value::Fixed(vec![0; 4])]));
        assert!(matches!(
            encoder.encode(&pdu),
            Err(EncodingError::FixedSize { expected: 6, found: 4, .. })
        ));
    }

    #[test]
    fn long_accepts_int_but_int_rejects_long() {
        let mut encoder = custom(vec![FieldSchema::new("n", FieldType::Long)]);
        let promoted = Pdu::new(0, 0, Layer::new(PduType::Raw, vec![Value::Int(-1)]));
        assert_eq!(encoder.encode_to_vec(&promoted).unwrap(), vec![0, 0, 0x01, 0]);

        let mut narrow = custom(vec![FieldSchema::new("n", FieldType::Int)]);
        let wide = Pdu::new(0, 0, Layer::new(PduType::Raw, vec![Value::Long(1)]));
        assert!(matches!(
            narrow.encode(&wide),
            Err(EncodingError::FieldType { .. })
        ));
    }

    #[test]
    fn optional_and_array_encoding() {
        let mut encoder = custom(vec![
            FieldSchema::new("note", FieldType::optional(FieldType::String)),
            FieldSchema::new("ports", FieldType::array(FieldType::Int)),
        ]);

        let absent = Pdu::new(
            0,
            0,
            Layer::new(PduType::Raw, vec![Value::Null, Value::Array(vec![])]),
        );
        assert_eq!(encoder.encode_to_vec(&absent).unwrap(), vec![0, 0, 0, 0, 0]);

        let present = Pdu::new(
            0,
            0,
            Layer::new(
                PduType::Raw,
                vec![
                    Value::String("a".into()),
                    Value::Array(vec![Value::Int(1), Value::Int(2)]),
                ],
            ),
        );
        assert_eq!(
            encoder.encode_to_vec(&present).unwrap(),
            vec![0, 0, 0x02, 0x02, b'a', 0x04, 0x02, 0x04, 0x00, 0x00]
        );
    }

    #[test]
    fn array_item_type_is_checked() {
        let mut encoder = custom(vec![FieldSchema::new("ports", FieldType::array(FieldType::Int))]);
        let pdu = Pdu::new(
            0,
            0,
            Layer::new(PduType::Raw, vec![Value::Array(vec![Value::Boolean(true)])]),
        );
        assert!(matches!(
            encoder.encode(&pdu),
            Err(EncodingError::FieldType { .. })
        ));
    }
}
