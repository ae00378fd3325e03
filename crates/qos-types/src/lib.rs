//! Shared types for the QoS adjustment engine.
//!
//! This crate defines the vocabulary used across the workspace:
//! identifiers ([`FileId`], [`SessionId`]), the file snapshot
//! ([`FileAttributes`]), pool descriptors ([`PoolInfo`]), the closed
//! action catalog ([`QosAction`]) and the unit of work handed to an
//! adjuster ([`AdjustmentTask`]).

pub mod events;

use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// ID types
// ---------------------------------------------------------------------------

/// Opaque, globally unique file identifier.
///
/// Correlates a task with the messages it sends and the callbacks it
/// produces. The engine never interprets the contents.
#[derive(Clone, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct FileId(String);

impl FileId {
    /// Wrap a raw identifier string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Return the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for FileId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FileId({})", self.0)
    }
}

/// Per-task correlation marker.
///
/// Attached to every outgoing request so that the state-change
/// notifications those requests cause can be recognized as self-inflicted
/// and not re-trigger verification.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct SessionId([u8; 16]);

impl SessionId {
    /// Generate a fresh random session marker.
    pub fn generate() -> Self {
        Self(rand::random())
    }

    /// Return the raw 16-byte representation.
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl From<[u8; 16]> for SessionId {
    fn from(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "qos:")?;
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionId({self})")
    }
}

// ---------------------------------------------------------------------------
// File and pool descriptors
// ---------------------------------------------------------------------------

/// Read-only snapshot of file metadata taken when the task was created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileAttributes {
    /// The file this snapshot describes.
    pub file_id: FileId,
    /// Size of the file in bytes.
    pub size: u64,
    /// Last access time, milliseconds since the Unix epoch.
    pub access_time: u64,
    /// Pools currently known to hold a replica.
    pub locations: Vec<String>,
    /// Storage class used for nearline placement (e.g. `"exp:raw@osm"`).
    pub storage_class: Option<String>,
    /// Whether a nearline (tape) copy of the file exists.
    pub on_nearline: bool,
}

impl FileAttributes {
    /// Minimal attributes for a file with no known locations.
    pub fn new(file_id: FileId, size: u64) -> Self {
        Self {
            file_id,
            size,
            access_time: 0,
            locations: Vec::new(),
            storage_class: None,
            on_nearline: false,
        }
    }
}

/// Pool description as resolved by the pool selection layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolInfo {
    /// Pool name, unique within the installation.
    pub name: String,
    /// Free space reported by the pool at selection time, in bytes.
    pub free_space: u64,
    /// Whether the pool accepted reads at selection time.
    pub readable: bool,
}

impl PoolInfo {
    /// A readable pool with unknown free space.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            free_space: 0,
            readable: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Action catalog
// ---------------------------------------------------------------------------

/// Corrective actions the verification layer can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QosAction {
    /// Create one more replica on a pre-selected target pool.
    ReplicateCopy,
    /// Write a precious replica to nearline storage.
    FlushToNearline,
    /// Bring the file back from nearline storage.
    WaitForStage,
    /// Clear the sticky bit, leaving an evictable cached replica.
    SetCached,
    /// Set the sticky bit so the replica is never evicted.
    SetPersisted,
    /// Clear the precious bit on a replica already safe on tape.
    UnsetPrecious,
}

impl QosAction {
    /// Every action in the catalog.
    pub const ALL: [QosAction; 6] = [
        QosAction::ReplicateCopy,
        QosAction::FlushToNearline,
        QosAction::WaitForStage,
        QosAction::SetCached,
        QosAction::SetPersisted,
        QosAction::UnsetPrecious,
    ];

    /// Stable lowercase name, used in config files and on the CLI.
    pub fn as_str(&self) -> &'static str {
        match self {
            QosAction::ReplicateCopy => "replicate-copy",
            QosAction::FlushToNearline => "flush-to-nearline",
            QosAction::WaitForStage => "wait-for-stage",
            QosAction::SetCached => "set-cached",
            QosAction::SetPersisted => "set-persisted",
            QosAction::UnsetPrecious => "unset-precious",
        }
    }
}

impl fmt::Display for QosAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for QosAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        QosAction::ALL
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| format!("unknown QoS action: {s}"))
    }
}

// ---------------------------------------------------------------------------
// Adjustment task
// ---------------------------------------------------------------------------

/// One unit of corrective work, handed to exactly one adjuster.
///
/// Built by the verification layer after pool selection, so `target`
/// (or `pool_group` for staging) is already resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdjustmentTask {
    /// The file being adjusted.
    pub file_id: FileId,
    /// Attribute snapshot taken at task creation.
    pub attributes: FileAttributes,
    /// The corrective action to take.
    pub action: QosAction,
    /// Name of the pool that currently holds a readable replica.
    pub source: Option<String>,
    /// Pool that should receive or already holds the replica being changed.
    pub target: Option<PoolInfo>,
    /// Pool group that scopes staging requests.
    pub pool_group: Option<String>,
}

impl AdjustmentTask {
    /// Create a task with no source, target or pool group.
    pub fn new(attributes: FileAttributes, action: QosAction) -> Self {
        Self {
            file_id: attributes.file_id.clone(),
            attributes,
            action,
            source: None,
            target: None,
            pool_group: None,
        }
    }

    /// Set the source pool.
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Set the target pool.
    pub fn with_target(mut self, target: PoolInfo) -> Self {
        self.target = Some(target);
        self
    }

    /// Set the pool group.
    pub fn with_pool_group(mut self, group: impl Into<String>) -> Self {
        self.pool_group = Some(group.into());
        self
    }

    /// Name of the target pool, if one was selected.
    pub fn target_name(&self) -> Option<&str> {
        self.target.as_ref().map(|t| t.name.as_str())
    }
}
