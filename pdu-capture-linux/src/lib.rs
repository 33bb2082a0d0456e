//! # pdu-capture-linux
//!
//! Linux `AF_PACKET` backend for pdu-capture.
//!
//! Provides:
//! - `LiveSource`: live capture from a network interface via a raw packet socket
//! - `list_interfaces` / `interface_index`: interface enumeration
//! - `has_capture_privilege`: `CAP_NET_RAW` probe
//! - `open_live`: open an interface and start a capture worker on it
//!
//! ## Platform Requirements
//! - Linux with `AF_PACKET` support
//! - `CAP_NET_RAW` (or root) to open the socket
//!
//! ## Usage
//! ```ignore
//! use pdu_capture_core::CaptureConfiguration;
//! use pdu_capture_linux::open_live;
//!
//! let worker = open_live("eth0", &CaptureConfiguration::default())?;
//! let outcome = worker.fill_buffer(vec![0; 64 * 1024])?.wait()?;
//! println!("{} PDUs", outcome.report.pdu_count);
//! ```

#[cfg(target_os = "linux")]
pub mod af_packet;
#[cfg(target_os = "linux")]
pub mod interfaces;

#[cfg(target_os = "linux")]
pub use af_packet::LiveSource;
#[cfg(target_os = "linux")]
pub use interfaces::{has_capture_privilege, interface_index, list_interfaces, InterfaceInfo};

#[cfg(target_os = "linux")]
use pdu_capture_core::{CaptureConfiguration, CaptureError, CaptureSession, CaptureWorker};

/// Open `interface` for live capture and start a worker on it.
#[cfg(target_os = "linux")]
pub fn open_live(
    interface: &str,
    config: &CaptureConfiguration,
) -> Result<CaptureWorker, CaptureError> {
    let source = LiveSource::open(interface, config)?;
    let session = CaptureSession::new(Box::new(source));
    CaptureWorker::spawn(session, &config.worker_name)
}
