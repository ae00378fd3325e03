//! Sink for terminal adjustment outcomes.

use qos_types::FileId;

use crate::error::AdjusterError;

/// Receives exactly one terminal outcome per task.
///
/// Implemented by the scanner, which decides whether and when to
/// re-verify the file. Calls arrive on worker threads and must not block.
pub trait CompletionHandler: Send + Sync {
    /// The adjustment reached its desired end state.
    ///
    /// `target` names the pool now holding the adjusted replica, when known.
    fn task_completed(&self, file_id: &FileId, target: Option<&str>);

    /// The adjustment failed.
    fn task_failed(&self, file_id: &FileId, target: Option<&str>, error: AdjusterError);

    /// The adjustment was cancelled.
    fn task_cancelled(&self, file_id: &FileId);
}
