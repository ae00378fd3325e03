//! The [`Adjuster`] trait and the state every variant shares.

mod copy;
mod replica_state;
mod staging;

use std::sync::Arc;

use qos_types::events::EventBus;
use qos_types::{AdjustmentTask, SessionId};

use crate::completion::CompletionHandler;
use crate::config::AdjusterConfig;
use crate::error::AdjusterError;
use crate::factory::AdjusterKind;
use crate::lifecycle::{AdjusterState, Lifecycle, Outcome, Start};
use crate::worker::WorkerPool;

pub use copy::CopyAdjuster;
pub use replica_state::ReplicaStateAdjuster;
pub use staging::{STAGE_PIN_REQUEST_ID, StagingAdjuster};

/// Executes exactly one adjustment task.
///
/// An adjuster is built unbound, receives one task through
/// [`adjust_qos`](Adjuster::adjust_qos), and delivers exactly one outcome
/// to its [`CompletionHandler`]. It is never reused.
pub trait Adjuster: Send + Sync {
    /// Which protocol family this adjuster implements.
    fn kind(&self) -> AdjusterKind;

    /// Shared lifecycle state.
    fn base(&self) -> &AdjusterBase;

    /// Variant-specific work, invoked by [`adjust_qos`](Adjuster::adjust_qos)
    /// once the session is established. Must not block.
    fn run_adjuster(self: Arc<Self>, task: AdjustmentTask, session: SessionId);

    /// Cancel the task. Safe to call at any time, any number of times.
    fn cancel(&self, explanation: &str);

    /// Bind `task`, establish its session and start the variant's protocol.
    ///
    /// Returns as soon as the remote work is scheduled.
    ///
    /// # Panics
    ///
    /// Panics if called more than once on the same adjuster.
    fn adjust_qos(self: Arc<Self>, task: AdjustmentTask) {
        let start = self.base().lifecycle.start(&task);
        match start {
            Start::Run(session) => self.run_adjuster(task, session),
            Start::Cancelled => {}
        }
    }

    /// Current lifecycle state.
    fn state(&self) -> AdjusterState {
        self.base().lifecycle.state()
    }

    /// Correlation marker of the bound task, once one is bound.
    fn session(&self) -> Option<SessionId> {
        self.base().lifecycle.session()
    }
}

/// Collaborators and lifecycle shared by every adjuster variant.
pub struct AdjusterBase {
    pub(crate) lifecycle: Lifecycle,
    pub(crate) workers: Arc<WorkerPool>,
    pub(crate) config: Arc<AdjusterConfig>,
}

impl AdjusterBase {
    pub(crate) fn new(
        handler: Arc<dyn CompletionHandler>,
        events: EventBus,
        workers: Arc<WorkerPool>,
        config: Arc<AdjusterConfig>,
    ) -> Self {
        Self {
            lifecycle: Lifecycle::new(handler, events),
            workers,
            config,
        }
    }

    pub(crate) fn complete(&self, target: Option<String>) -> bool {
        self.lifecycle.finish(Outcome::Completed(target))
    }

    pub(crate) fn fail(&self, target: Option<String>, error: AdjusterError) -> bool {
        self.lifecycle.finish(Outcome::Failed(target, error))
    }
}

impl std::fmt::Debug for AdjusterBase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdjusterBase")
            .field("state", &self.lifecycle.state())
            .field("session", &self.lifecycle.session())
            .finish()
    }
}
