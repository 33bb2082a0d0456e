//! # pdu-capture-core
//!
//! Platform-agnostic PDU capture core library.
//!
//! Pulls frames from a packet source, dissects them into layered PDUs,
//! encodes each PDU as a schema-described binary record and packs whole
//! records into caller-supplied buffers. Platform backends (Linux
//! `AF_PACKET`) implement the `PacketSource` trait and plug into the generic
//! `CaptureSession`.
//!
//! ## Architecture
//!
//! ```text
//! pdu-capture-core (this crate)
//! ├── traits/       ← PacketSource, PacketFilter, CaptureDelegate
//! ├── models/       ← CaptureError, CaptureState, CaptureConfiguration, Pdu, FillReport
//! ├── encoding/     ← SchemaRegistry, Encoder, binary primitives
//! ├── processing/   ← BufferWriter, frame dissection
//! ├── source/       ← FileSource (pcap/pcapng), ScriptedSource, ChannelSource
//! └── session/      ← CaptureSession (fill loop), CaptureWorker (background, single-flight)
//! ```
//!
//! ## Usage
//!
//! ```no_run
//! use pdu_capture_core::{open_file, CaptureConfiguration};
//!
//! let worker = open_file("capture.pcap", &CaptureConfiguration::default())?;
//! loop {
//!     let outcome = worker.fill_buffer(vec![0; 64 * 1024])?.wait()?;
//!     let (count, exhausted) = outcome.report.clone().into_result()?;
//!     println!("{count} records, {} bytes", outcome.written().len());
//!     if exhausted {
//!         break;
//!     }
//! }
//! # Ok::<(), pdu_capture_core::CaptureError>(())
//! ```

pub mod encoding;
pub mod models;
pub mod processing;
pub mod session;
pub mod source;
pub mod traits;

// Re-export key types at crate root for convenience.
pub use encoding::encoder::Encoder;
pub use encoding::schema::{FieldSchema, FieldType, RecordSchema, SchemaRegistry};
pub use models::config::{CaptureConfiguration, MAX_SNAPLEN};
pub use models::error::{CaptureError, DeviceError, EncodingError, FileError};
pub use models::fill_result::{CaptureStats, FillOutcome, FillReport, SessionInfo};
pub use models::pdu::{pdu_type_name, Layer, LinkType, Pdu, PduType, Value};
pub use models::state::CaptureState;
pub use processing::buffer_writer::BufferWriter;
pub use session::capture::CaptureSession;
pub use session::worker::{open_file, CaptureWorker, FillTicket};
pub use source::file::FileSource;
pub use source::scripted::{ChannelSource, ScriptedSource};
pub use traits::capture_delegate::CaptureDelegate;
pub use traits::packet_filter::PacketFilter;
pub use traits::packet_source::PacketSource;
