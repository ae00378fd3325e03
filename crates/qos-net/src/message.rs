//! Request and reply messages exchanged with remote endpoints.
//!
//! Every outgoing request carries the [`SessionId`] of the task that sent
//! it, so the state-change notifications it triggers can be recognized.

use std::fmt;

use qos_types::{FileAttributes, FileId, SessionId};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Remote error payloads
// ---------------------------------------------------------------------------

/// Classification of an error payload returned by a remote endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RemoteErrorCode {
    /// The pool does not hold a replica of the file.
    FileNotInRepository,
    /// The pool is disabled for the requested operation.
    PoolDisabled,
    /// No pool in the group could serve the request.
    NoPoolOnline,
    /// The endpoint gave up waiting on its own collaborators.
    Timeout,
    /// The endpoint's storage backend reported a failure.
    StorageFailure,
    /// Anything else.
    Unexpected,
}

impl fmt::Display for RemoteErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RemoteErrorCode::FileNotInRepository => "file not in repository",
            RemoteErrorCode::PoolDisabled => "pool disabled",
            RemoteErrorCode::NoPoolOnline => "no pool online",
            RemoteErrorCode::Timeout => "timeout",
            RemoteErrorCode::StorageFailure => "storage failure",
            RemoteErrorCode::Unexpected => "unexpected error",
        };
        f.write_str(s)
    }
}

/// Error payload carried inside an otherwise well-formed reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{code}: {message}")]
pub struct RemoteError {
    /// Error classification.
    pub code: RemoteErrorCode,
    /// Human-readable detail from the remote side.
    pub message: String,
}

impl RemoteError {
    /// Build an error payload.
    pub fn new(code: RemoteErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Whether the payload means the replica is no longer on the pool.
    pub fn is_file_not_in_repository(&self) -> bool {
        self.code == RemoteErrorCode::FileNotInRepository
    }
}

// ---------------------------------------------------------------------------
// Replica state changes
// ---------------------------------------------------------------------------

/// Retention bit change applied to a resident replica.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StateChange {
    /// Mark the replica as safely flushed.
    ClearPrecious,
    /// Protect the replica from eviction.
    SetSticky,
    /// Make the replica evictable again.
    ClearSticky,
}

/// Ask a pool to change the state bits of one replica.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicaStateRequest {
    /// Pool hosting the replica.
    pub pool: String,
    /// The file whose replica is changed.
    pub file_id: FileId,
    /// Which bit to flip.
    pub change: StateChange,
    /// Correlation marker of the requesting task.
    pub session: SessionId,
}

/// Reply to a [`ReplicaStateRequest`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicaStateReply {
    /// Error payload, `None` on success.
    pub error: Option<RemoteError>,
}

// ---------------------------------------------------------------------------
// Pinning
// ---------------------------------------------------------------------------

/// Transfer protocol the pin is requested for.
///
/// Staging only needs the pin to trigger retrieval, so this never
/// describes a real client transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolDescriptor {
    /// Protocol name, e.g. `"Http"`.
    pub protocol: String,
    /// Major protocol version.
    pub major: u32,
    /// Minor protocol version.
    pub minor: u32,
    /// Where the (never performed) transfer would go.
    pub uri: String,
}

/// Pin a file, staging it from nearline storage when necessary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinRequest {
    /// Attribute snapshot used by the pin manager for pool selection.
    pub attributes: FileAttributes,
    /// Protocol the file is pinned for.
    pub protocol: ProtocolDescriptor,
    /// Identifies the pin, so the same id can later be unpinned.
    pub request_id: String,
    /// How long the pin should be held, in milliseconds.
    pub lifetime_ms: u64,
    /// Restricts pool selection to this group.
    pub pool_group: Option<String>,
    /// Correlation marker of the requesting task.
    pub session: SessionId,
}

/// Reply to a [`PinRequest`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinReply {
    /// The pool that ended up holding the pinned replica.
    pub pool: Option<String>,
    /// Error payload, `None` on success.
    pub error: Option<RemoteError>,
}

/// Release a pin. Fire-and-forget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnpinRequest {
    /// The pinned file.
    pub file_id: FileId,
    /// Request id used when pinning.
    pub request_id: String,
    /// Correlation marker of the requesting task.
    pub session: SessionId,
}

// ---------------------------------------------------------------------------
// Pool-to-pool migration
// ---------------------------------------------------------------------------

/// Knobs for a pool-to-pool copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferParameters {
    /// Replace existing replicas on the target eagerly.
    pub eager: bool,
    /// Move only metadata, not data.
    pub meta_only: bool,
    /// Recompute the checksum when updating an existing replica.
    pub compute_checksum_on_update: bool,
    /// Copy even if the source pool is not readable.
    pub force_source_mode: bool,
    /// Preserve the file's access time on the new replica.
    pub maintain_atime: bool,
    /// Number of new replicas to create.
    pub replicas: u32,
}

/// Start copying one replica from `source` to `target`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopyRequest {
    /// The file being copied.
    pub file_id: FileId,
    /// Pool holding the readable replica.
    pub source: String,
    /// Pool receiving the new replica.
    pub target: String,
    /// Transfer behaviour.
    pub parameters: TransferParameters,
    /// Access time to preserve on the new replica.
    pub access_time: u64,
    /// Correlation marker of the requesting task.
    pub session: SessionId,
}

/// Abort a copy started with a [`CopyRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelCopy {
    /// The file being copied.
    pub file_id: FileId,
    /// Pool receiving the new replica.
    pub target: String,
    /// Why the copy is being abandoned.
    pub explanation: String,
    /// Correlation marker of the requesting task.
    pub session: SessionId,
}

/// Inbound notice that a copy has ended, relayed to the waiting sub-task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopyFinished {
    /// The copied file.
    pub file_id: FileId,
    /// Correlation marker of the task that requested the copy.
    pub session: SessionId,
    /// Pool that received the replica.
    pub target: String,
    /// Error payload, `None` on success.
    pub error: Option<RemoteError>,
}
