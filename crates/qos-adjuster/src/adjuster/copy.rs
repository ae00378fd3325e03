//! Copy adjuster: one extra replica on a pre-selected pool.

use std::sync::{Arc, Mutex};

use qos_net::{CopyFinished, MigrationClient, NetError};
use qos_types::{AdjustmentTask, FileId, QosAction, SessionId};
use tracing::{debug, info};

use super::{Adjuster, AdjusterBase};
use crate::ACTIVITY_TARGET;
use crate::error::AdjusterError;
use crate::factory::AdjusterKind;
use crate::lifecycle::AdjusterState;
use crate::migration::{CopyRelay, MigrationTask, SinglePoolSelection, single_copy_parameters};
use crate::worker::wait_for_reply;

/// Handles [`QosAction::ReplicateCopy`].
///
/// The target pool was chosen by the scanner, so the migration sub-task
/// gets a one-element pool list and a selection strategy that simply
/// returns it.
pub struct CopyAdjuster {
    base: AdjusterBase,
    client: Arc<dyn MigrationClient>,
    relay: Arc<CopyRelay>,
    migration: Mutex<Option<Arc<MigrationTask>>>,
}

impl CopyAdjuster {
    pub(crate) fn new(
        base: AdjusterBase,
        client: Arc<dyn MigrationClient>,
        relay: Arc<CopyRelay>,
    ) -> Self {
        Self {
            base,
            client,
            relay,
            migration: Mutex::new(None),
        }
    }

    fn invalid(&self, file_id: FileId, reason: &str) {
        self.base.fail(
            None,
            AdjusterError::InvalidTask {
                file_id,
                action: QosAction::ReplicateCopy,
                reason: reason.to_string(),
            },
        );
    }

    fn handle_finished(
        &self,
        file_id: FileId,
        target: String,
        finished: Result<CopyFinished, NetError>,
    ) {
        let action = QosAction::ReplicateCopy;
        match finished {
            Ok(CopyFinished { error: None, .. }) => {
                self.base.complete(Some(target));
            }
            Ok(CopyFinished { error: Some(e), .. }) => {
                self.base.fail(
                    Some(target.clone()),
                    AdjusterError::Remote {
                        file_id,
                        action,
                        pool: Some(target),
                        error: e,
                    },
                );
            }
            Err(e) => {
                self.base.fail(
                    Some(target.clone()),
                    AdjusterError::SelectedPoolFailed {
                        file_id,
                        action,
                        pool: target,
                        source: e,
                    },
                );
            }
        }
    }

    fn cancel_migration(&self, explanation: &str) {
        let migration = self.migration.lock().expect("copy lock poisoned").take();
        if let Some(migration) = migration {
            migration.cancel(explanation);
        }
    }
}

impl Adjuster for CopyAdjuster {
    fn kind(&self) -> AdjusterKind {
        AdjusterKind::Copy
    }

    fn base(&self) -> &AdjusterBase {
        &self.base
    }

    #[tracing::instrument(skip_all, fields(file_id = %task.file_id))]
    fn run_adjuster(self: Arc<Self>, task: AdjustmentTask, session: SessionId) {
        let file_id = task.file_id.clone();

        let Some(source) = task.source.clone() else {
            self.invalid(file_id, "copy has no source pool");
            return;
        };
        let Some(target) = task.target.clone() else {
            self.invalid(file_id, "copy has no target pool");
            return;
        };

        let migration = Arc::new(MigrationTask::new(
            &task.attributes,
            source.clone(),
            vec![target.clone()],
            Box::new(SinglePoolSelection),
            single_copy_parameters(),
            session,
            self.client.clone(),
            self.relay.clone(),
        ));
        *self.migration.lock().expect("copy lock poisoned") = Some(migration.clone());

        if !self.base.lifecycle.is_running() {
            return;
        }

        info!(
            target: ACTIVITY_TARGET,
            %file_id,
            %source,
            pool = %target.name,
            "Initiating replication of {} from {} to pools: [{}]",
            file_id,
            source,
            target.name
        );

        let (selected, pending) = match migration.start() {
            Ok(started) => started,
            Err(e) => {
                self.base.fail(
                    Some(target.name.clone()),
                    AdjusterError::Transport {
                        file_id,
                        action: QosAction::ReplicateCopy,
                        source: e,
                    },
                );
                return;
            }
        };
        debug!(target_pool = %selected, "migration submitted");

        let max_wait = self.base.config.max_reply_wait;
        let this = self.clone();
        let handle = self.base.workers.spawn(async move {
            let finished = wait_for_reply(pending, max_wait).await;
            this.handle_finished(file_id, selected, finished);
        });

        // Cancelled while submitting: the cancel may have run before the
        // sub-task was running, so forward it again. A copy whose notice
        // already completed the adjuster must be left alone.
        if !self.base.lifecycle.attach(handle) && self.state() == AdjusterState::Cancelled {
            migration.cancel("adjuster cancelled during submission");
        }
    }

    fn cancel(&self, explanation: &str) {
        self.base
            .lifecycle
            .cancel(explanation, |_, _| self.cancel_migration(explanation));
    }
}
