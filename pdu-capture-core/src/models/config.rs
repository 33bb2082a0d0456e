use std::sync::Arc;

use crate::traits::packet_filter::PacketFilter;

/// Largest snapshot length accepted for a source.
pub const MAX_SNAPLEN: u32 = 262_144;

/// Configuration for opening a capture session.
#[derive(Clone)]
pub struct CaptureConfiguration {
    /// Maximum bytes captured per frame (default: 65535).
    pub snaplen: u32,

    /// Put a live interface into promiscuous mode (default: true).
    /// Ignored by file replay.
    pub promiscuous: bool,

    /// Optional compiled capture filter; frames it rejects are skipped by the
    /// source before dissection.
    pub filter: Option<Arc<dyn PacketFilter>>,

    /// Name of the background worker thread.
    pub worker_name: String,
}

impl CaptureConfiguration {
    pub fn validate(&self) -> Result<(), String> {
        if self.snaplen == 0 {
            return Err("snaplen must be positive".into());
        }
        if self.snaplen > MAX_SNAPLEN {
            return Err(format!(
                "snaplen {} exceeds maximum {}",
                self.snaplen, MAX_SNAPLEN
            ));
        }
        if self.worker_name.is_empty() {
            return Err("worker name must not be empty".into());
        }
        Ok(())
    }

    /// Whether a raw frame passes the configured filter.
    pub fn accepts(&self, frame: &[u8]) -> bool {
        self.filter.as_ref().map_or(true, |f| f.matches(frame))
    }
}

impl Default for CaptureConfiguration {
    fn default() -> Self {
        Self {
            snaplen: 65535,
            promiscuous: true,
            filter: None,
            worker_name: "pdu-capture".into(),
        }
    }
}

impl std::fmt::Debug for CaptureConfiguration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureConfiguration")
            .field("snaplen", &self.snaplen)
            .field("promiscuous", &self.promiscuous)
            .field("filter", &self.filter.as_ref().map(|_| "<filter>"))
            .field("worker_name", &self.worker_name)
            .finish()
    }
}
