//! Failure taxonomy reported to the completion handler.

use qos_net::{NetError, RemoteError};
use qos_types::{FileId, QosAction};

/// Why an adjustment failed.
///
/// Cancellation is never an error; it is reported through
/// [`CompletionHandler::task_cancelled`](crate::CompletionHandler::task_cancelled).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AdjusterError {
    /// The request could not be dispatched: no reply handle was produced.
    #[error("{action} for {file_id}: service unavailable")]
    ServiceUnavailable {
        /// The file being adjusted.
        file_id: FileId,
        /// The action that was attempted.
        action: QosAction,
    },

    /// Waiting for the pool's reply failed or was interrupted.
    #[error("{action} for {file_id}: selected pool {pool} failed: {source}")]
    SelectedPoolFailed {
        /// The file being adjusted.
        file_id: FileId,
        /// The action that was attempted.
        action: QosAction,
        /// The pool that was contacted.
        pool: String,
        /// Underlying transport failure.
        source: NetError,
    },

    /// A non-pool endpoint (pin manager, migration endpoint) failed in transit.
    #[error("{action} for {file_id}: transport failure: {source}")]
    Transport {
        /// The file being adjusted.
        file_id: FileId,
        /// The action that was attempted.
        action: QosAction,
        /// Underlying transport failure.
        source: NetError,
    },

    /// The remote side answered with an error payload.
    #[error("{action} for {file_id}: remote error: {error}")]
    Remote {
        /// The file being adjusted.
        file_id: FileId,
        /// The action that was attempted.
        action: QosAction,
        /// Pool that produced the error, when one is known.
        pool: Option<String>,
        /// The payload, unchanged.
        #[source]
        error: RemoteError,
    },

    /// Local configuration prevented the request from being built.
    #[error("{action} for {file_id}: invalid configuration: {reason}")]
    InvalidConfiguration {
        /// The file being adjusted.
        file_id: FileId,
        /// The action that was attempted.
        action: QosAction,
        /// What was wrong.
        reason: String,
    },

    /// The task lacks information its action needs.
    #[error("{action} for {file_id}: invalid task: {reason}")]
    InvalidTask {
        /// The file being adjusted.
        file_id: FileId,
        /// The action that was attempted.
        action: QosAction,
        /// What was missing.
        reason: String,
    },
}

/// Coarse classification of an [`AdjusterError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Nothing could be dispatched.
    ServiceUnavailable,
    /// The chosen pool failed while we waited.
    SelectedPoolFailed,
    /// Transport failure talking to a non-pool endpoint.
    Transport,
    /// Remote error payload.
    Remote,
    /// Local misconfiguration.
    InvalidConfiguration,
    /// Malformed task.
    InvalidTask,
}

impl AdjusterError {
    /// Classify this error.
    pub fn kind(&self) -> FailureKind {
        match self {
            AdjusterError::ServiceUnavailable { .. } => FailureKind::ServiceUnavailable,
            AdjusterError::SelectedPoolFailed { .. } => FailureKind::SelectedPoolFailed,
            AdjusterError::Transport { .. } => FailureKind::Transport,
            AdjusterError::Remote { .. } => FailureKind::Remote,
            AdjusterError::InvalidConfiguration { .. } => FailureKind::InvalidConfiguration,
            AdjusterError::InvalidTask { .. } => FailureKind::InvalidTask,
        }
    }

    /// Whether re-verifying the file on a later scan may succeed.
    ///
    /// Configuration and task defects will fail the same way every time.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self.kind(),
            FailureKind::InvalidConfiguration | FailureKind::InvalidTask
        )
    }

    /// The file this error concerns.
    pub fn file_id(&self) -> &FileId {
        match self {
            AdjusterError::ServiceUnavailable { file_id, .. }
            | AdjusterError::SelectedPoolFailed { file_id, .. }
            | AdjusterError::Transport { file_id, .. }
            | AdjusterError::Remote { file_id, .. }
            | AdjusterError::InvalidConfiguration { file_id, .. }
            | AdjusterError::InvalidTask { file_id, .. } => file_id,
        }
    }
}
