use serde::Serialize;
use uuid::Uuid;

use super::error::CaptureError;
use super::pdu::LinkType;

/// Result of one fill operation.
///
/// Runtime errors are reported alongside the PDUs written before the error,
/// so partial progress is never lost.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FillReport {
    /// Whole PDUs written into the buffer during this fill.
    pub pdu_count: usize,
    /// Bytes used at the start of the buffer.
    pub bytes_written: usize,
    /// The source has no more PDUs and nothing is pending.
    pub exhausted: bool,
    pub error: Option<CaptureError>,
}

impl FillReport {
    /// Collapse into `(count, exhausted)` or the error, discarding the count
    /// when an error occurred.
    pub fn into_result(self) -> Result<(usize, bool), CaptureError> {
        match self.error {
            Some(e) => Err(e),
            None => Ok((self.pdu_count, self.exhausted)),
        }
    }
}

/// A completed fill delivered by the worker: the caller's buffer handed back
/// together with the report describing its first `bytes_written` bytes.
#[derive(Debug)]
pub struct FillOutcome {
    pub buffer: Vec<u8>,
    pub report: FillReport,
}

impl FillOutcome {
    /// The encoded records written by this fill.
    pub fn written(&self) -> &[u8] {
        &self.buffer[..self.report.bytes_written]
    }
}

/// Cumulative counters for a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CaptureStats {
    pub fills: u64,
    pub pdus_written: u64,
    pub bytes_written: u64,
    /// Fills that stopped because the next record did not fit.
    pub deferrals: u64,
    /// Fills that ended with a runtime error.
    pub fill_errors: u64,
}

/// Descriptive information about an open session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionInfo {
    pub id: Uuid,
    /// Interface name or file path the session reads from.
    pub source: String,
    pub link_type: LinkType,
    pub snaplen: u32,
    /// RFC 3339 timestamp of when the session was opened.
    pub opened_at: String,
}
