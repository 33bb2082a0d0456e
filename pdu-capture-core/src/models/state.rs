use serde::Serialize;

/// Capture session state machine.
///
/// State transitions:
/// ```text
/// idle → filling → idle
///   ↓       ↓
///   └──→ closed ←── (close requested while filling, applied on completion)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureState {
    Idle,
    Filling,
    Closed,
}

impl CaptureState {
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    pub fn is_filling(&self) -> bool {
        matches!(self, Self::Filling)
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }
}
