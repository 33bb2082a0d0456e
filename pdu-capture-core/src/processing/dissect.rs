//! Frame dissection into layered PDUs.
//!
//! Turns raw link-layer bytes into a [`Layer`] chain whose field values
//! follow the builtin record schemas. Anything that cannot be parsed below
//! the last good layer is kept as a `Raw` payload rather than dropped.

use etherparse::{
    Ethernet2HeaderSlice, Ipv4HeaderSlice, Ipv6HeaderSlice, TcpHeaderSlice, UdpHeaderSlice,
};

use crate::models::pdu::{Layer, LinkType, Pdu, PduType, Value};

/// Well-known EtherTypes.
pub mod ethertype {
    pub const IPV4: u16 = 0x0800;
    pub const ARP: u16 = 0x0806;
    pub const VLAN: u16 = 0x8100;
    pub const IPV6: u16 = 0x86DD;
}

/// IP protocol numbers.
pub mod ip_proto {
    pub const ICMP: u8 = 1;
    pub const TCP: u8 = 6;
    pub const UDP: u8 = 17;
    pub const ICMPV6: u8 = 58;
}

const ARP_ETHERNET_IPV4_LEN: usize = 28;
const DOT1Q_LEN: usize = 4;
const ICMP_HEADER_LEN: usize = 8;

/// Build a PDU from one captured frame.
pub fn decode_frame(link_type: LinkType, timestamp_us: i64, length: u32, data: &[u8]) -> Pdu {
    Pdu::new(timestamp_us, length, dissect(link_type, data))
}

/// Dissect a frame starting at the layer implied by its link type.
pub fn dissect(link_type: LinkType, data: &[u8]) -> Layer {
    match link_type {
        LinkType::Ethernet => ethernet(data),
        LinkType::Ipv4 => ipv4(data),
        LinkType::Ipv6 => ipv6(data),
        LinkType::Raw => match data.first().map(|b| b >> 4) {
            Some(4) => ipv4(data),
            Some(6) => ipv6(data),
            _ => Layer::raw(data),
        },
        LinkType::Other(_) => Layer::raw(data),
    }
}

fn int(n: impl Into<i32>) -> Value {
    Value::Int(n.into())
}

fn fixed(bytes: &[u8]) -> Value {
    Value::Fixed(bytes.to_vec())
}

/// Attach `payload` as the inner layer unless it is empty.
fn with_payload(layer: Layer, payload: Option<Layer>) -> Layer {
    match payload {
        Some(inner) => layer.with_inner(inner),
        None => layer,
    }
}

fn raw_unless_empty(data: &[u8]) -> Option<Layer> {
    (!data.is_empty()).then(|| Layer::raw(data))
}

fn ethernet(data: &[u8]) -> Layer {
    let Ok(eth) = Ethernet2HeaderSlice::from_slice(data) else {
        return Layer::raw(data);
    };
    let ether_type = eth.ether_type().0;
    let header = Layer::new(
        PduType::EthernetII,
        vec![
            fixed(&eth.destination()),
            fixed(&eth.source()),
            int(ether_type),
        ],
    );
    let rest = &data[eth.slice().len()..];
    with_payload(header, ethertype_payload(ether_type, rest))
}

fn ethertype_payload(ether_type: u16, data: &[u8]) -> Option<Layer> {
    if data.is_empty() {
        return None;
    }
    Some(match ether_type {
        ethertype::IPV4 => ipv4(data),
        ethertype::IPV6 => ipv6(data),
        ethertype::ARP => arp(data),
        ethertype::VLAN => dot1q(data),
        _ => Layer::raw(data),
    })
}

fn dot1q(data: &[u8]) -> Layer {
    if data.len() < DOT1Q_LEN {
        return Layer::raw(data);
    }
    let tci = u16::from_be_bytes([data[0], data[1]]);
    let ether_type = u16::from_be_bytes([data[2], data[3]]);
    let header = Layer::new(
        PduType::Dot1Q,
        vec![
            int((tci >> 13) as u8),
            Value::Boolean(tci & 0x1000 != 0),
            int(tci & 0x0fff),
            int(ether_type),
        ],
    );
    with_payload(header, ethertype_payload(ether_type, &data[DOT1Q_LEN..]))
}

fn arp(data: &[u8]) -> Layer {
    // Only Ethernet/IPv4 ARP has a fixed record shape.
    if data.len() < ARP_ETHERNET_IPV4_LEN || data[4] != 6 || data[5] != 4 {
        return Layer::raw(data);
    }
    let header = Layer::new(
        PduType::Arp,
        vec![
            int(u16::from_be_bytes([data[0], data[1]])),
            int(u16::from_be_bytes([data[2], data[3]])),
            int(u16::from_be_bytes([data[6], data[7]])),
            fixed(&data[8..14]),
            fixed(&data[14..18]),
            fixed(&data[18..24]),
            fixed(&data[24..28]),
        ],
    );
    with_payload(header, raw_unless_empty(&data[ARP_ETHERNET_IPV4_LEN..]))
}

fn ipv4(data: &[u8]) -> Layer {
    let Ok(ip) = Ipv4HeaderSlice::from_slice(data) else {
        return Layer::raw(data);
    };
    let raw = ip.slice();
    let header_len = raw.len();
    let frag_off = u16::from_be_bytes([raw[6], raw[7]]) & 0x1fff;
    let protocol = ip.protocol().0;

    let header = Layer::new(
        PduType::Ip,
        vec![
            int(raw[1]),
            int(ip.total_len()),
            int(ip.identification()),
            Value::Boolean(ip.dont_fragment()),
            Value::Boolean(ip.more_fragments()),
            int(frag_off),
            int(ip.ttl()),
            int(protocol),
            int(ip.header_checksum()),
            fixed(&ip.source()),
            fixed(&ip.destination()),
        ],
    );

    // Ethernet padding may follow the datagram; trust total_len when sane.
    let total_len = usize::from(ip.total_len());
    let end = if total_len >= header_len && total_len <= data.len() {
        total_len
    } else {
        data.len()
    };
    let payload = &data[header_len..end];

    let inner = if ip.more_fragments() || frag_off != 0 {
        raw_unless_empty(payload)
    } else {
        ip_payload(protocol, payload)
    };
    with_payload(header, inner)
}

fn ipv6(data: &[u8]) -> Layer {
    let Ok(ip) = Ipv6HeaderSlice::from_slice(data) else {
        return Layer::raw(data);
    };
    let raw = ip.slice();
    let flow_label = u32::from_be_bytes([0, raw[1] & 0x0f, raw[2], raw[3]]);
    let next_header = ip.next_header().0;

    let header = Layer::new(
        PduType::Ipv6,
        vec![
            int(ip.traffic_class()),
            Value::Int(flow_label as i32),
            int(ip.payload_length()),
            int(next_header),
            int(ip.hop_limit()),
            fixed(&ip.source()),
            fixed(&ip.destination()),
        ],
    );

    let rest = &data[raw.len()..];
    let end = usize::from(ip.payload_length()).min(rest.len());
    with_payload(header, ip_payload(next_header, &rest[..end]))
}

fn ip_payload(protocol: u8, data: &[u8]) -> Option<Layer> {
    if data.is_empty() {
        return None;
    }
    Some(match protocol {
        ip_proto::TCP => tcp(data),
        ip_proto::UDP => udp(data),
        ip_proto::ICMP => icmp(PduType::Icmp, data),
        ip_proto::ICMPV6 => icmp(PduType::Icmpv6, data),
        _ => Layer::raw(data),
    })
}

fn tcp(data: &[u8]) -> Layer {
    let Ok(tcp) = TcpHeaderSlice::from_slice(data) else {
        return Layer::raw(data);
    };
    let raw = tcp.slice();
    let flags = (u16::from(raw[12] & 0x01) << 8) | u16::from(raw[13]);

    let header = Layer::new(
        PduType::Tcp,
        vec![
            int(tcp.source_port()),
            int(tcp.destination_port()),
            Value::Long(i64::from(tcp.sequence_number())),
            Value::Long(i64::from(tcp.acknowledgment_number())),
            int(tcp.data_offset()),
            int(flags),
            int(tcp.window_size()),
            int(tcp.checksum()),
            int(tcp.urgent_pointer()),
            Value::Bytes(tcp.options().to_vec()),
        ],
    );
    with_payload(header, raw_unless_empty(&data[raw.len()..]))
}

fn udp(data: &[u8]) -> Layer {
    let Ok(udp) = UdpHeaderSlice::from_slice(data) else {
        return Layer::raw(data);
    };
    let header = Layer::new(
        PduType::Udp,
        vec![
            int(udp.source_port()),
            int(udp.destination_port()),
            int(udp.length()),
            int(udp.checksum()),
        ],
    );
    with_payload(header, raw_unless_empty(&data[udp.slice().len()..]))
}

fn icmp(pdu_type: PduType, data: &[u8]) -> Layer {
    if data.len() < ICMP_HEADER_LEN {
        return Layer::raw(data);
    }
    let header = Layer::new(
        pdu_type,
        vec![
            int(data[0]),
            int(data[1]),
            int(u16::from_be_bytes([data[2], data[3]])),
            fixed(&data[4..8]),
        ],
    );
    with_payload(header, raw_unless_empty(&data[ICMP_HEADER_LEN..]))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::encoding::encoder::Encoder;

    const DST_MAC: [u8; 6] = [0xff, 0xff, 0xff, 0xff, 0xff, 0xff];
    const SRC_MAC: [u8; 6] = [0x00, 0x11, 0x22, 0x33, 0x44, 0x55];

    fn ethernet_header(ether_type: u16) -> Vec<u8> {
        let mut frame = Vec::new();
        frame.extend_from_slice(&DST_MAC);
        frame.extend_from_slice(&SRC_MAC);
        frame.extend_from_slice(&ether_type.to_be_bytes());
        frame
    }

    fn ipv4_header(protocol: u8, payload_len: usize) -> Vec<u8> {
        let total = (20 + payload_len) as u16;
        let mut header = vec![
            0x45, 0x00, // version/ihl, tos
            0, 0, // total length
            0x12, 0x34, // identification
            0x40, 0x00, // don't fragment
            64, protocol, // ttl, protocol
            0, 0, // checksum
            10, 0, 0, 1, // source
            10, 0, 0, 2, // destination
        ];
        header[2..4].copy_from_slice(&total.to_be_bytes());
        header
    }

    /// Ethernet / IPv4 / UDP frame carrying `payload`.
    pub(crate) fn udp_frame(payload: &[u8]) -> Vec<u8> {
        let udp_len = (8 + payload.len()) as u16;
        let mut frame = ethernet_header(ethertype::IPV4);
        frame.extend_from_slice(&ipv4_header(ip_proto::UDP, 8 + payload.len()));
        frame.extend_from_slice(&5353u16.to_be_bytes());
        frame.extend_from_slice(&53u16.to_be_bytes());
        frame.extend_from_slice(&udp_len.to_be_bytes());
        frame.extend_from_slice(&[0, 0]);
        frame.extend_from_slice(payload);
        frame
    }

    #[test]
    fn ethernet_ipv4_udp_chain() {
        let frame = udp_frame(b"query");
        let pdu = decode_frame(LinkType::Ethernet, 42, frame.len() as u32, &frame);

        assert_eq!(
            pdu.pdu_types(),
            vec![PduType::EthernetII, PduType::Ip, PduType::Udp, PduType::Raw]
        );
        assert_eq!(pdu.timestamp_us, 42);

        let eth = pdu.find(PduType::EthernetII).unwrap();
        assert_eq!(eth.fields[1], Value::Fixed(SRC_MAC.to_vec()));
        assert_eq!(eth.fields[2], Value::Int(0x0800));

        let ip = pdu.find(PduType::Ip).unwrap();
        assert_eq!(ip.fields[3], Value::Boolean(true));
        assert_eq!(ip.fields[6], Value::Int(64));
        assert_eq!(ip.fields[9], Value::Fixed(vec![10, 0, 0, 1]));

        let udp = pdu.find(PduType::Udp).unwrap();
        assert_eq!(udp.fields[0], Value::Int(5353));
        assert_eq!(udp.fields[1], Value::Int(53));

        let raw = pdu.find(PduType::Raw).unwrap();
        assert_eq!(raw.fields[0], Value::Bytes(b"query".to_vec()));
    }

    #[test]
    fn ethernet_padding_is_trimmed() {
        let mut frame = udp_frame(b"");
        frame.extend_from_slice(&[0u8; 18]);
        let pdu = decode_frame(LinkType::Ethernet, 0, frame.len() as u32, &frame);

        assert_eq!(
            pdu.pdu_types(),
            vec![PduType::EthernetII, PduType::Ip, PduType::Udp]
        );
    }

    #[test]
    fn ipv6_tcp_chain() {
        let mut tcp = vec![
            0x1f, 0x90, // sport 8080
            0x00, 0x50, // dport 80
            0, 0, 0, 1, // seq
            0, 0, 0, 0, // ack
            0x50, 0x02, // data offset 5, SYN
            0xff, 0xff, // window
            0, 0, 0, 0, // checksum, urgent
        ];
        let mut frame = ethernet_header(ethertype::IPV6);
        let mut ip = vec![0x60, 0x00, 0x00, 0x07];
        ip.extend_from_slice(&(tcp.len() as u16).to_be_bytes());
        ip.push(ip_proto::TCP);
        ip.push(64);
        ip.extend_from_slice(&[0xfe; 16]);
        ip.extend_from_slice(&[0xfd; 16]);
        frame.append(&mut ip);
        frame.append(&mut tcp);

        let pdu = decode_frame(LinkType::Ethernet, 0, frame.len() as u32, &frame);
        assert_eq!(
            pdu.pdu_types(),
            vec![PduType::EthernetII, PduType::Ipv6, PduType::Tcp]
        );

        let ip = pdu.find(PduType::Ipv6).unwrap();
        assert_eq!(ip.fields[1], Value::Int(7));
        assert_eq!(ip.fields[4], Value::Int(64));

        let tcp = pdu.find(PduType::Tcp).unwrap();
        assert_eq!(tcp.fields[0], Value::Int(8080));
        assert_eq!(tcp.fields[2], Value::Long(1));
        assert_eq!(tcp.fields[5], Value::Int(0x02));
        assert_eq!(tcp.fields[9], Value::Bytes(vec![]));
    }

    #[test]
    fn vlan_tagged_arp() {
        let mut frame = ethernet_header(ethertype::VLAN);
        frame.extend_from_slice(&[0xa0, 0x64]); // pcp 5, vid 100
        frame.extend_from_slice(&ethertype::ARP.to_be_bytes());
        frame.extend_from_slice(&[0x00, 0x01, 0x08, 0x00, 6, 4, 0x00, 0x01]);
        frame.extend_from_slice(&SRC_MAC);
        frame.extend_from_slice(&[192, 168, 0, 1]);
        frame.extend_from_slice(&[0; 6]);
        frame.extend_from_slice(&[192, 168, 0, 2]);

        let pdu = decode_frame(LinkType::Ethernet, 0, frame.len() as u32, &frame);
        assert_eq!(
            pdu.pdu_types(),
            vec![PduType::EthernetII, PduType::Dot1Q, PduType::Arp]
        );

        let vlan = pdu.find(PduType::Dot1Q).unwrap();
        assert_eq!(vlan.fields[0], Value::Int(5));
        assert_eq!(vlan.fields[2], Value::Int(100));

        let arp = pdu.find(PduType::Arp).unwrap();
        assert_eq!(arp.fields[2], Value::Int(1));
        assert_eq!(arp.fields[6], Value::Fixed(vec![192, 168, 0, 2]));
    }

    #[test]
    fn raw_link_type_sniffs_ip_version() {
        let mut packet = ipv4_header(ip_proto::ICMP, 8);
        packet.extend_from_slice(&[8, 0, 0xf7, 0xff, 0, 1, 0, 0]);

        let pdu = decode_frame(LinkType::Raw, 0, packet.len() as u32, &packet);
        assert_eq!(pdu.pdu_types(), vec![PduType::Ip, PduType::Icmp]);
        assert_eq!(pdu.find(PduType::Icmp).unwrap().fields[0], Value::Int(8));
    }

    #[test]
    fn malformed_layers_become_raw() {
        let truncated = &udp_frame(b"x")[..20];
        let pdu = decode_frame(LinkType::Ethernet, 0, 60, truncated);
        assert_eq!(pdu.pdu_types(), vec![PduType::EthernetII, PduType::Raw]);

        let tiny = [0u8; 3];
        let pdu = decode_frame(LinkType::Ethernet, 0, 3, &tiny);
        assert_eq!(pdu.pdu_types(), vec![PduType::Raw]);

        let pdu = decode_frame(LinkType::Other(127), 0, 3, &tiny);
        assert_eq!(pdu.pdu_types(), vec![PduType::Raw]);
    }

    #[test]
    fn dissected_frames_encode_under_builtin_schemas() {
        let frame = udp_frame(b"payload");
        let pdu = decode_frame(LinkType::Ethernet, 1, frame.len() as u32, &frame);
        assert!(Encoder::new().encode(&pdu).is_ok());
    }
}
