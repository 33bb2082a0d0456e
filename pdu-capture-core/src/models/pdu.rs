use std::fmt;

use serde::{Deserialize, Serialize};

/// Protocol-layer type tag.
///
/// Discriminants follow the classic PDU numbering so tags stay stable for
/// consumers that already key on them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum PduType {
    Raw = 0,
    EthernetII = 1,
    Ip = 28,
    Arp = 29,
    Tcp = 30,
    Udp = 31,
    Icmp = 32,
    Ipv6 = 40,
    Icmpv6 = 41,
    Dot1Q = 44,
}

/// Names for every tag in the classic PDU table, indexed by tag.
const PDU_NAMES: [&str; 51] = [
    "RAW",
    "ETHERNET_II",
    "IEEE802_3",
    "RADIOTAP",
    "DOT11",
    "DOT11_ACK",
    "DOT11_ASSOC_REQ",
    "DOT11_ASSOC_RESP",
    "DOT11_AUTH",
    "DOT11_BEACON",
    "DOT11_BLOCK_ACK",
    "DOT11_BLOCK_ACK_REQ",
    "DOT11_CF_END",
    "DOT11_DATA",
    "DOT11_CONTROL",
    "DOT11_DEAUTH",
    "DOT11_DIASSOC",
    "DOT11_END_CF_ACK",
    "DOT11_MANAGEMENT",
    "DOT11_PROBE_REQ",
    "DOT11_PROBE_RESP",
    "DOT11_PS_POLL",
    "DOT11_REASSOC_REQ",
    "DOT11_REASSOC_RESP",
    "DOT11_RTS",
    "DOT11_QOS_DATA",
    "LLC",
    "SNAP",
    "IP",
    "ARP",
    "TCP",
    "UDP",
    "ICMP",
    "BOOTP",
    "DHCP",
    "EAPOL",
    "RC4EAPOL",
    "RSNEAPOL",
    "DNS",
    "LOOPBACK",
    "IPv6",
    "ICMPv6",
    "SLL",
    "DHCPv6",
    "DOT1Q",
    "PPPOE",
    "STP",
    "PPI",
    "IPSEC_AH",
    "IPSEC_ESP",
    "PKTAP",
];

/// Look up the display name of any PDU tag, including ones this crate does
/// not dissect.
pub fn pdu_type_name(tag: u8) -> Option<&'static str> {
    PDU_NAMES.get(tag as usize).copied()
}

impl PduType {
    pub fn tag(self) -> u8 {
        self as u8
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::Raw),
            1 => Some(Self::EthernetII),
            28 => Some(Self::Ip),
            29 => Some(Self::Arp),
            30 => Some(Self::Tcp),
            31 => Some(Self::Udp),
            32 => Some(Self::Icmp),
            40 => Some(Self::Ipv6),
            41 => Some(Self::Icmpv6),
            44 => Some(Self::Dot1Q),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        PDU_NAMES[self as usize]
    }
}

impl fmt::Display for PduType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Data link type of a capture, as stored in pcap headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LinkType {
    Ethernet,
    Raw,
    Ipv4,
    Ipv6,
    Other(u32),
}

impl LinkType {
    pub fn code(self) -> u32 {
        match self {
            Self::Ethernet => 1,
            Self::Raw => 101,
            Self::Ipv4 => 228,
            Self::Ipv6 => 229,
            Self::Other(code) => code,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Ethernet => "EN10MB",
            Self::Raw => "RAW",
            Self::Ipv4 => "IPV4",
            Self::Ipv6 => "IPV6",
            Self::Other(_) => "UNKNOWN",
        }
    }
}

impl From<u32> for LinkType {
    fn from(code: u32) -> Self {
        match code {
            1 => Self::Ethernet,
            // LINKTYPE_RAW has two historical values.
            101 | 12 => Self::Raw,
            228 => Self::Ipv4,
            229 => Self::Ipv6,
            other => Self::Other(other),
        }
    }
}

/// A single field value inside a layer record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Null,
    Boolean(bool),
    Int(i32),
    Long(i64),
    Bytes(Vec<u8>),
    String(String),
    Fixed(Vec<u8>),
    Array(Vec<Value>),
}

impl Value {
    /// Short type name used in encoding diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Boolean(_) => "boolean",
            Self::Int(_) => "int",
            Self::Long(_) => "long",
            Self::Bytes(_) => "bytes",
            Self::String(_) => "string",
            Self::Fixed(_) => "fixed",
            Self::Array(_) => "array",
        }
    }
}

/// One protocol layer: its type, its field values in schema order, and the
/// layer it encapsulates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layer {
    pub pdu_type: PduType,
    pub fields: Vec<Value>,
    pub inner: Option<Box<Layer>>,
}

impl Layer {
    pub fn new(pdu_type: PduType, fields: Vec<Value>) -> Self {
        Self {
            pdu_type,
            fields,
            inner: None,
        }
    }

    pub fn with_inner(mut self, inner: Layer) -> Self {
        self.inner = Some(Box::new(inner));
        self
    }

    /// Raw payload layer.
    pub fn raw(payload: &[u8]) -> Self {
        Self::new(PduType::Raw, vec![Value::Bytes(payload.to_vec())])
    }
}

/// A captured protocol data unit.
///
/// Immutable once produced; ownership moves from the source to the session
/// and into the encoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pdu {
    /// Capture timestamp in microseconds since the Unix epoch.
    pub timestamp_us: i64,
    /// Length of the frame on the wire, which may exceed the captured bytes.
    pub length: u32,
    pub root: Layer,
}

impl Pdu {
    pub fn new(timestamp_us: i64, length: u32, root: Layer) -> Self {
        Self {
            timestamp_us,
            length,
            root,
        }
    }

    /// Type of the outermost layer, which selects the record schema.
    pub fn pdu_type(&self) -> PduType {
        self.root.pdu_type
    }

    /// Layers from outermost to innermost.
    pub fn layers(&self) -> Layers<'_> {
        Layers {
            next: Some(&self.root),
        }
    }

    pub fn find(&self, pdu_type: PduType) -> Option<&Layer> {
        self.layers().find(|layer| layer.pdu_type == pdu_type)
    }

    pub fn pdu_types(&self) -> Vec<PduType> {
        self.layers().map(|layer| layer.pdu_type).collect()
    }
}

/// Iterator over the layer chain of a [`Pdu`].
pub struct Layers<'a> {
    next: Option<&'a Layer>,
}

impl<'a> Iterator for Layers<'a> {
    type Item = &'a Layer;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = current.inner.as_deref();
        Some(current)
    }
}
