use crate::models::error::CaptureError;
use crate::models::fill_result::FillReport;
use crate::models::state::CaptureState;

/// Event delegate for capture session notifications.
///
/// All methods are called from the worker thread, not the caller's thread.
/// Implementations should marshal elsewhere if they need to.
pub trait CaptureDelegate: Send + Sync {
    /// Called when the session state changes.
    fn on_state_changed(&self, state: &CaptureState);

    /// Called after each fill, before its result is delivered to the caller.
    fn on_fill_complete(&self, report: &FillReport);

    /// Called when a fill ends with a runtime error.
    fn on_error(&self, error: &CaptureError);
}
