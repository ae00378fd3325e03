//! QoS adjustment engine.
//!
//! Once the verification layer decides that a file's replica layout does
//! not satisfy its QoS policy, it hands an [`AdjustmentTask`] to an
//! adjuster built by the [`AdjusterFactory`]. This crate provides:
//!
//! - [`AdjusterFactory`]: maps a [`QosAction`] to a freshly wired adjuster.
//! - [`CopyAdjuster`]: one extra replica via a pool-to-pool [`MigrationTask`].
//! - [`ReplicaStateAdjuster`]: sticky / precious bit changes on a resident replica.
//! - [`StagingAdjuster`]: nearline retrieval triggered by a short-lived pin.
//! - [`WorkerPool`]: the shared executor every adjuster waits on.
//! - [`CompletionHandler`]: the sink for exactly one terminal outcome per task.
//!
//! The engine does not retry, persist or prioritise tasks; that belongs
//! to the scanner driving it.
//!
//! [`AdjustmentTask`]: qos_types::AdjustmentTask
//! [`QosAction`]: qos_types::QosAction

pub mod adjuster;
pub mod completion;
pub mod config;
pub mod error;
pub mod factory;
mod lifecycle;
pub mod migration;
pub mod worker;

pub use adjuster::{
    Adjuster, AdjusterBase, CopyAdjuster, ReplicaStateAdjuster, STAGE_PIN_REQUEST_ID,
    StagingAdjuster,
};
pub use completion::CompletionHandler;
pub use config::AdjusterConfig;
pub use error::{AdjusterError, FailureKind};
pub use factory::{AdjusterBuilder, AdjusterFactory, AdjusterKind, adjuster_kind};
pub use lifecycle::AdjusterState;
pub use migration::{
    CopyRelay, MigrationTask, PoolSelectionStrategy, SinglePoolSelection, single_copy_parameters,
};
pub use worker::WorkerPool;

/// Tracing target for the audit trail of remote activity started by adjusters.
///
/// Kept separate from diagnostic logs so operators can route it to its own sink.
pub const ACTIVITY_TARGET: &str = "qos::activity";
