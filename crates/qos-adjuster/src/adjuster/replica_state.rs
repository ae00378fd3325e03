//! Replica state adjuster: flips sticky / precious bits without moving data.

use std::sync::Arc;

use qos_net::{NetError, PoolClient, ReplicaStateReply, ReplicaStateRequest, StateChange};
use qos_types::{AdjustmentTask, FileId, QosAction, SessionId};
use tracing::debug;

use super::{Adjuster, AdjusterBase};
use crate::error::AdjusterError;
use crate::factory::AdjusterKind;
use crate::worker::wait_for_reply;

/// Handles [`QosAction::SetCached`], [`QosAction::SetPersisted`] and
/// [`QosAction::UnsetPrecious`].
///
/// Sends one state-change request to the pool hosting the replica and
/// waits for the reply on the worker pool.
pub struct ReplicaStateAdjuster {
    base: AdjusterBase,
    pools: Arc<dyn PoolClient>,
}

impl ReplicaStateAdjuster {
    pub(crate) fn new(base: AdjusterBase, pools: Arc<dyn PoolClient>) -> Self {
        Self { base, pools }
    }

    fn handle_reply(
        &self,
        file_id: FileId,
        action: QosAction,
        pool: String,
        reply: Result<ReplicaStateReply, NetError>,
    ) {
        match reply {
            Ok(ReplicaStateReply { error: None }) => {
                self.base.complete(Some(pool));
            }
            Ok(ReplicaStateReply { error: Some(e) }) if e.is_file_not_in_repository() => {
                // Nothing left to change; the desired end state already holds.
                debug!(%file_id, %pool, "replica no longer on pool, treating as done");
                self.base.complete(Some(pool));
            }
            Ok(ReplicaStateReply { error: Some(e) }) => {
                self.base.fail(
                    Some(pool.clone()),
                    AdjusterError::Remote {
                        file_id,
                        action,
                        pool: Some(pool),
                        error: e,
                    },
                );
            }
            Err(e) => {
                self.base.fail(
                    Some(pool.clone()),
                    AdjusterError::SelectedPoolFailed {
                        file_id,
                        action,
                        pool,
                        source: e,
                    },
                );
            }
        }
    }
}

/// State change implied by `action`, or `None` for actions this adjuster
/// does not handle.
pub(crate) fn state_change_for(action: QosAction) -> Option<StateChange> {
    match action {
        QosAction::UnsetPrecious => Some(StateChange::ClearPrecious),
        QosAction::SetPersisted => Some(StateChange::SetSticky),
        QosAction::SetCached => Some(StateChange::ClearSticky),
        _ => None,
    }
}

impl Adjuster for ReplicaStateAdjuster {
    fn kind(&self) -> AdjusterKind {
        AdjusterKind::ReplicaState
    }

    fn base(&self) -> &AdjusterBase {
        &self.base
    }

    #[tracing::instrument(skip_all, fields(file_id = %task.file_id, action = %task.action))]
    fn run_adjuster(self: Arc<Self>, task: AdjustmentTask, session: SessionId) {
        let file_id = task.file_id.clone();
        let action = task.action;

        let Some(change) = state_change_for(action) else {
            self.base.fail(
                None,
                AdjusterError::InvalidTask {
                    file_id,
                    action,
                    reason: "not a replica state action".to_string(),
                },
            );
            return;
        };

        let Some(pool) = task
            .target_name()
            .map(str::to_string)
            .or_else(|| task.source.clone())
        else {
            self.base.fail(
                None,
                AdjusterError::InvalidTask {
                    file_id,
                    action,
                    reason: "no pool hosting the replica".to_string(),
                },
            );
            return;
        };

        if !self.base.lifecycle.is_running() {
            return;
        }

        debug!(%pool, ?change, "sending replica state change");
        let request = ReplicaStateRequest {
            pool: pool.clone(),
            file_id: file_id.clone(),
            change,
            session,
        };

        let Some(pending) = self.pools.change_replica_state(request) else {
            self.base.fail(
                Some(pool),
                AdjusterError::ServiceUnavailable { file_id, action },
            );
            return;
        };

        let max_wait = self.base.config.max_reply_wait;
        let this = self.clone();
        let handle = self.base.workers.spawn(async move {
            let reply = wait_for_reply(pending, max_wait).await;
            this.handle_reply(file_id, action, pool, reply);
        });
        self.base.lifecycle.attach(handle);
    }

    fn cancel(&self, explanation: &str) {
        // Aborting the wait cannot recall a request the pool already received.
        self.base.lifecycle.cancel(explanation, |_, _| {});
    }
}
