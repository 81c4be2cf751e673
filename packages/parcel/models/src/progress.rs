//! Progress reporting for the long-running pipeline stages.
//!
//! Stages report through [`ProgressCallback`] so the library crates stay
//! independent of any terminal rendering. The `indicatif` implementation
//! lives in `field_panel_cli_utils`.

use std::sync::Arc;

/// Receives progress updates from a pipeline stage.
///
/// Implementations must be `Send + Sync` because per-parcel work runs on
/// the `rayon` pool.
pub trait ProgressCallback: Send + Sync {
    /// Set the total expected units of work.
    fn set_total(&self, total: u64);

    /// Advance progress by `delta` units.
    fn inc(&self, delta: u64);

    /// Update the message displayed alongside the progress indicator.
    fn set_message(&self, msg: String);

    /// Mark progress as complete with a final message.
    fn finish(&self, msg: String);
}

/// Ignores every update. Used by tests and non-interactive callers.
pub struct NullProgress;

impl ProgressCallback for NullProgress {
    fn set_total(&self, _total: u64) {}
    fn inc(&self, _delta: u64) {}
    fn set_message(&self, _msg: String) {}
    fn finish(&self, _msg: String) {}
}

/// Returns a shared [`NullProgress`].
#[must_use]
pub fn null_progress() -> Arc<dyn ProgressCallback> {
    Arc::new(NullProgress)
}
