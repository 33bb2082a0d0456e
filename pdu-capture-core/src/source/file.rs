use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use log::{debug, warn};
use pcap_parser::pcapng::Block;
use pcap_parser::traits::PcapReaderIterator;
use pcap_parser::{LegacyPcapReader, PcapBlockOwned, PcapError, PcapNGReader};

use crate::models::config::CaptureConfiguration;
use crate::models::error::{CaptureError, FileError};
use crate::models::pdu::{LinkType, Pdu};
use crate::processing::dissect;
use crate::traits::packet_source::PacketSource;

/// Read buffer handed to the pcap-parser readers.
const BUFFER_SIZE: usize = 65536;

/// Container format, detected from the leading magic number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureFormat {
    /// Classic pcap with microsecond timestamps (either byte order).
    Legacy,
    /// Classic pcap with nanosecond timestamps (either byte order).
    LegacyNano,
    PcapNg,
}

impl CaptureFormat {
    pub fn detect(magic: [u8; 4]) -> Option<Self> {
        match u32::from_le_bytes(magic) {
            0xa1b2_c3d4 | 0xd4c3_b2a1 => Some(Self::Legacy),
            0xa1b2_3c4d | 0x4d3c_b2a1 => Some(Self::LegacyNano),
            0x0a0d_0d0a => Some(Self::PcapNg),
            _ => None,
        }
    }
}

/// One frame lifted out of the container, before filtering and dissection.
struct RawFrame {
    timestamp_us: i64,
    length: u32,
    link_type: LinkType,
    data: Vec<u8>,
}

/// Timestamp resolution and link type announced by a pcapng interface block.
#[derive(Debug, Clone, Copy)]
struct Interface {
    link_type: LinkType,
    snaplen: u32,
    units_per_sec: u64,
    offset_secs: i64,
}

impl Interface {
    fn timestamp_us(&self, ts_high: u32, ts_low: u32) -> i64 {
        let ticks = (u128::from(ts_high) << 32) | u128::from(ts_low);
        let us = ticks * 1_000_000 / u128::from(self.units_per_sec.max(1));
        (us as i64).saturating_add(self.offset_secs.saturating_mul(1_000_000))
    }
}

/// Units per second for a pcapng `if_tsresol` value: the high bit selects a
/// power of two, otherwise a power of ten.
fn ts_units(if_tsresol: u8) -> u64 {
    let exp = u32::from(if_tsresol & 0x7f);
    if if_tsresol & 0x80 == 0 {
        10u64.checked_pow(exp).unwrap_or(1_000_000)
    } else {
        2u64.checked_pow(exp).unwrap_or(1_000_000)
    }
}

enum ReaderInner {
    Legacy {
        reader: LegacyPcapReader<File>,
        nanos: bool,
        link_type: LinkType,
    },
    Ng {
        reader: PcapNGReader<File>,
        interfaces: Vec<Interface>,
    },
}

/// Replays frames from a pcap or pcapng file in file order.
///
/// ```text
/// [File] → [pcap-parser block] → [filter] → [dissect] → Pdu
/// ```
///
/// Signals end of source once the last block has been read.
pub struct FileSource {
    path: PathBuf,
    inner: Option<ReaderInner>,
    link_type: LinkType,
    snaplen: u32,
    config: CaptureConfiguration,
    frames_read: u64,
}

impl FileSource {
    /// Open a capture file and read its header blocks.
    ///
    /// Fails with `FileError::NotFound` if the path does not exist and with
    /// `FileError::InvalidFormat` if the container magic or header is not
    /// recognized.
    pub fn open(path: impl AsRef<Path>, config: &CaptureConfiguration) -> Result<Self, CaptureError> {
        config.validate().map_err(CaptureError::ConfigurationFailed)?;

        let path = path.as_ref().to_path_buf();
        let shown = path.display().to_string();
        let mut file = File::open(&path).map_err(|e| open_error(&shown, e))?;

        let mut magic = [0u8; 4];
        file.read_exact(&mut magic).map_err(|e| match e.kind() {
            io::ErrorKind::UnexpectedEof => {
                FileError::InvalidFormat(format!("{shown}: too short for a capture header"))
            }
            _ => FileError::Io(format!("{shown}: {e}")),
        })?;
        let format = CaptureFormat::detect(magic).ok_or_else(|| {
            FileError::InvalidFormat(format!(
                "{shown}: unknown magic 0x{:08x}",
                u32::from_le_bytes(magic)
            ))
        })?;
        file.seek(SeekFrom::Start(0))
            .map_err(|e| FileError::Io(format!("{shown}: {e}")))?;

        let mut inner = match format {
            CaptureFormat::Legacy | CaptureFormat::LegacyNano => {
                let reader = LegacyPcapReader::new(BUFFER_SIZE, file).map_err(|e| {
                    FileError::InvalidFormat(format!("{shown}: failed to parse pcap: {e}"))
                })?;
                ReaderInner::Legacy {
                    reader,
                    nanos: format == CaptureFormat::LegacyNano,
                    link_type: LinkType::Ethernet,
                }
            }
            CaptureFormat::PcapNg => {
                let reader = PcapNGReader::new(BUFFER_SIZE, file).map_err(|e| {
                    FileError::InvalidFormat(format!("{shown}: failed to parse pcapng: {e}"))
                })?;
                ReaderInner::Ng {
                    reader,
                    interfaces: Vec::new(),
                }
            }
        };

        let snaplen = prime(&mut inner)
            .map_err(|reason| FileError::InvalidFormat(format!("{shown}: {reason}")))?
            .unwrap_or(config.snaplen);
        let link_type = match &inner {
            ReaderInner::Legacy { link_type, .. } => *link_type,
            ReaderInner::Ng { interfaces, .. } => interfaces
                .first()
                .map_or(LinkType::Ethernet, |i| i.link_type),
        };

        debug!(
            "Opened capture file {} ({:?}, link type {}, snaplen {})",
            shown,
            format,
            link_type.name(),
            snaplen
        );

        Ok(Self {
            path,
            inner: Some(inner),
            link_type,
            snaplen,
            config: config.clone(),
            frames_read: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Frames read from the container so far, including filtered ones.
    pub fn frames_read(&self) -> u64 {
        self.frames_read
    }

    fn next_frame(&mut self) -> Result<Option<RawFrame>, String> {
        let Some(inner) = self.inner.as_mut() else {
            return Ok(None);
        };
        match inner {
            ReaderInner::Legacy {
                reader,
                nanos,
                link_type,
            } => read_legacy_frame(reader, *nanos, link_type),
            ReaderInner::Ng { reader, interfaces } => read_pcapng_frame(reader, interfaces),
        }
    }
}

impl PacketSource for FileSource {
    fn next_pdu(&mut self) -> Result<Option<Pdu>, CaptureError> {
        loop {
            let frame = match self.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => return Ok(None),
                Err(reason) => {
                    return Err(FileError::InvalidFormat(format!(
                        "{}: {}",
                        self.path.display(),
                        reason
                    ))
                    .into())
                }
            };
            self.frames_read += 1;
            self.link_type = frame.link_type;

            let mut data = frame.data;
            data.truncate(self.config.snaplen as usize);
            if !self.config.accepts(&data) {
                continue;
            }
            return Ok(Some(dissect::decode_frame(
                frame.link_type,
                frame.timestamp_us,
                frame.length,
                &data,
            )));
        }
    }

    fn link_type(&self) -> LinkType {
        self.link_type
    }

    fn snaplen(&self) -> u32 {
        self.snaplen
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn close(&mut self) {
        if self.inner.take().is_some() {
            debug!(
                "Closed capture file {} after {} frames",
                self.path.display(),
                self.frames_read
            );
        }
    }
}

fn open_error(path: &str, e: io::Error) -> FileError {
    match e.kind() {
        io::ErrorKind::NotFound => FileError::NotFound(path.to_string()),
        _ => FileError::Io(format!("{path}: {e}")),
    }
}

/// Consume header blocks up to the first packet block and return the
/// snapshot length they announce.
fn prime(inner: &mut ReaderInner) -> Result<Option<u32>, String> {
    match inner {
        ReaderInner::Legacy {
            reader, link_type, ..
        } => loop {
            match reader.next() {
                Ok((offset, PcapBlockOwned::LegacyHeader(header))) => {
                    *link_type = LinkType::from(header.network.0 as u32);
                    let snaplen = header.snaplen;
                    reader.consume(offset);
                    return Ok(Some(snaplen));
                }
                Ok(_) => return Err("missing pcap file header".into()),
                Err(PcapError::Incomplete(_)) => {
                    reader.refill().map_err(|e| format!("refill error: {e}"))?;
                }
                Err(e) => return Err(format!("pcap header error: {e}")),
            }
        },
        ReaderInner::Ng { reader, interfaces } => loop {
            match reader.next() {
                Ok((offset, PcapBlockOwned::NG(Block::SectionHeader(_)))) => {
                    reader.consume(offset);
                }
                Ok((offset, PcapBlockOwned::NG(Block::InterfaceDescription(idb)))) => {
                    interfaces.push(Interface {
                        link_type: LinkType::from(idb.linktype.0 as u32),
                        snaplen: idb.snaplen,
                        units_per_sec: ts_units(idb.if_tsresol),
                        offset_secs: i64::try_from(idb.if_tsoffset).unwrap_or(0),
                    });
                    reader.consume(offset);
                }
                Ok(_) | Err(PcapError::Eof) => {
                    return Ok(interfaces.first().map(|i| i.snaplen).filter(|s| *s > 0));
                }
                Err(PcapError::Incomplete(_)) => {
                    reader.refill().map_err(|e| format!("refill error: {e}"))?;
                }
                Err(e) => return Err(format!("pcapng header error: {e}")),
            }
        },
    }
}

fn read_legacy_frame(
    reader: &mut LegacyPcapReader<File>,
    nanos: bool,
    link_type: &mut LinkType,
) -> Result<Option<RawFrame>, String> {
    loop {
        match reader.next() {
            Ok((offset, block)) => match block {
                PcapBlockOwned::Legacy(packet) => {
                    let fraction = if nanos {
                        i64::from(packet.ts_usec) / 1000
                    } else {
                        i64::from(packet.ts_usec)
                    };
                    let caplen = (packet.caplen as usize).min(packet.data.len());
                    let frame = RawFrame {
                        timestamp_us: i64::from(packet.ts_sec) * 1_000_000 + fraction,
                        length: packet.origlen,
                        link_type: *link_type,
                        data: packet.data[..caplen].to_vec(),
                    };
                    reader.consume(offset);
                    return Ok(Some(frame));
                }
                PcapBlockOwned::LegacyHeader(header) => {
                    *link_type = LinkType::from(header.network.0 as u32);
                    reader.consume(offset);
                }
                _ => reader.consume(offset),
            },
            Err(PcapError::Eof) => return Ok(None),
            Err(PcapError::Incomplete(_)) => {
                reader.refill().map_err(|e| format!("refill error: {e}"))?;
            }
            Err(e) => return Err(format!("pcap parse error: {e}")),
        }
    }
}

fn read_pcapng_frame(
    reader: &mut PcapNGReader<File>,
    interfaces: &mut Vec<Interface>,
) -> Result<Option<RawFrame>, String> {
    loop {
        match reader.next() {
            Ok((offset, PcapBlockOwned::NG(block))) => match block {
                Block::SectionHeader(_) => {
                    // Interface ids restart in every section.
                    interfaces.clear();
                    reader.consume(offset);
                }
                Block::InterfaceDescription(idb) => {
                    interfaces.push(Interface {
                        link_type: LinkType::from(idb.linktype.0 as u32),
                        snaplen: idb.snaplen,
                        units_per_sec: ts_units(idb.if_tsresol),
                        offset_secs: i64::try_from(idb.if_tsoffset).unwrap_or(0),
                    });
                    reader.consume(offset);
                }
                Block::EnhancedPacket(epb) => {
                    let Some(iface) = interfaces.get(epb.if_id as usize).copied() else {
                        return Err(format!("packet references unknown interface {}", epb.if_id));
                    };
                    let caplen = (epb.caplen as usize).min(epb.data.len());
                    let frame = RawFrame {
                        timestamp_us: iface.timestamp_us(epb.ts_high, epb.ts_low),
                        length: epb.origlen,
                        link_type: iface.link_type,
                        data: epb.data[..caplen].to_vec(),
                    };
                    reader.consume(offset);
                    return Ok(Some(frame));
                }
                Block::SimplePacket(spb) => {
                    let Some(iface) = interfaces.first().copied() else {
                        return Err("simple packet block before any interface".into());
                    };
                    let mut caplen = (spb.origlen as usize).min(spb.data.len());
                    if iface.snaplen > 0 {
                        caplen = caplen.min(iface.snaplen as usize);
                    }
                    let frame = RawFrame {
                        timestamp_us: 0,
                        length: spb.origlen,
                        link_type: iface.link_type,
                        data: spb.data[..caplen].to_vec(),
                    };
                    reader.consume(offset);
                    return Ok(Some(frame));
                }
                _ => reader.consume(offset),
            },
            Ok((offset, _)) => {
                warn!("Skipping non-pcapng block in pcapng stream");
                reader.consume(offset);
            }
            Err(PcapError::Eof) => return Ok(None),
            Err(PcapError::Incomplete(_)) => {
                reader.refill().map_err(|e| format!("refill error: {e}"))?;
            }
            Err(e) => return Err(format!("pcapng parse error: {e}")),
        }
    }
}
