//! Lifecycle cell shared by every adjuster variant.
//!
//! All terminal transitions go through one mutex. The first caller to move
//! the cell out of `Running` wins and delivers the only callback; everyone
//! after it observes a terminal state and does nothing.

use std::sync::{Arc, Mutex};

use qos_types::events::{
    AdjustmentCancelled, AdjustmentCompleted, AdjustmentFailed, AdjustmentStarted, EventBus,
};
use qos_types::{AdjustmentTask, FileId, SessionId};
use tokio::task::AbortHandle;
use tracing::{debug, warn};

use crate::completion::CompletionHandler;
use crate::error::AdjusterError;

/// Observable state of an adjuster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdjusterState {
    /// Built, not yet bound to a task.
    Created,
    /// Bound to a task; remote work may be in flight.
    Running,
    /// Finished successfully.
    Completed,
    /// Finished with an error.
    Failed,
    /// Cancelled, either before or during the run.
    Cancelled,
}

impl AdjusterState {
    /// Whether the adjuster has delivered (or will deliver on bind) its outcome.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AdjusterState::Completed | AdjusterState::Failed | AdjusterState::Cancelled
        )
    }
}

/// Result of binding a task.
pub(crate) enum Start {
    /// Proceed with the variant-specific run under this session.
    Run(SessionId),
    /// Cancelled before the task arrived; the cancellation has been reported.
    Cancelled,
}

/// Terminal outcome other than cancellation.
pub(crate) enum Outcome {
    Completed(Option<String>),
    Failed(Option<String>, AdjusterError),
}

struct Inner {
    state: AdjusterState,
    file_id: Option<FileId>,
    session: Option<SessionId>,
    outstanding: Option<AbortHandle>,
    early_cancel: Option<String>,
}

pub(crate) struct Lifecycle {
    handler: Arc<dyn CompletionHandler>,
    events: EventBus,
    inner: Mutex<Inner>,
}

impl Lifecycle {
    pub(crate) fn new(handler: Arc<dyn CompletionHandler>, events: EventBus) -> Self {
        Self {
            handler,
            events,
            inner: Mutex::new(Inner {
                state: AdjusterState::Created,
                file_id: None,
                session: None,
                outstanding: None,
                early_cancel: None,
            }),
        }
    }

    /// Bind the task and establish its session.
    ///
    /// # Panics
    ///
    /// Panics if a task was already bound: adjusters are single-use.
    pub(crate) fn start(&self, task: &AdjustmentTask) -> Start {
        let mut inner = self.inner.lock().expect("lifecycle lock poisoned");
        let state = inner.state;

        match state {
            AdjusterState::Created => {
                let session = SessionId::generate();
                inner.state = AdjusterState::Running;
                inner.file_id = Some(task.file_id.clone());
                inner.session = Some(session);
                drop(inner);

                debug!(file_id = %task.file_id, action = %task.action, %session, "adjuster bound");
                self.events.emit(AdjustmentStarted {
                    file_id: task.file_id.clone(),
                    action: task.action,
                    session,
                });
                Start::Run(session)
            }
            AdjusterState::Cancelled if inner.file_id.is_none() => {
                inner.file_id = Some(task.file_id.clone());
                let explanation = inner.early_cancel.take().unwrap_or_default();
                drop(inner);

                debug!(file_id = %task.file_id, "adjuster cancelled before start");
                self.report_cancelled(&task.file_id, explanation);
                Start::Cancelled
            }
            _ => {
                drop(inner);
                panic!(
                    "adjuster reused: task for {} arrived in state {state:?}",
                    task.file_id
                );
            }
        }
    }

    /// Record the handle of the outstanding wait so cancellation can abort it.
    ///
    /// Returns `false` (and aborts the handle) if the adjuster already
    /// reached a terminal state.
    pub(crate) fn attach(&self, handle: AbortHandle) -> bool {
        let mut inner = self.inner.lock().expect("lifecycle lock poisoned");
        if inner.state == AdjusterState::Running {
            inner.outstanding = Some(handle);
            true
        } else {
            drop(inner);
            handle.abort();
            false
        }
    }

    /// Deliver a completion or failure, unless another outcome won first.
    pub(crate) fn finish(&self, outcome: Outcome) -> bool {
        let file_id = {
            let mut inner = self.inner.lock().expect("lifecycle lock poisoned");
            if inner.state != AdjusterState::Running {
                debug!(state = ?inner.state, "late outcome suppressed");
                return false;
            }
            let Some(file_id) = inner.file_id.clone() else {
                return false;
            };
            inner.state = match outcome {
                Outcome::Completed(_) => AdjusterState::Completed,
                Outcome::Failed(..) => AdjusterState::Failed,
            };
            inner.outstanding = None;
            file_id
        };

        match outcome {
            Outcome::Completed(target) => {
                debug!(%file_id, target = ?target, "adjustment completed");
                self.handler.task_completed(&file_id, target.as_deref());
                self.events.emit(AdjustmentCompleted { file_id, target });
            }
            Outcome::Failed(target, error) => {
                warn!(%file_id, target = ?target, error = %error, "adjustment failed");
                self.events.emit(AdjustmentFailed {
                    file_id: file_id.clone(),
                    reason: error.to_string(),
                });
                self.handler.task_failed(&file_id, target.as_deref(), error);
            }
        }
        true
    }

    /// Cancel the adjuster.
    ///
    /// If a task is running, the outstanding wait is aborted, `compensate`
    /// runs with the task's identity, and the cancellation is reported.
    /// Before a task is bound, the cancellation is remembered and reported
    /// on bind. Once terminal this is a no-op. Returns whether this call
    /// performed the transition.
    pub(crate) fn cancel<F>(&self, explanation: &str, compensate: F) -> bool
    where
        F: FnOnce(&FileId, SessionId),
    {
        let (file_id, session, outstanding) = {
            let mut inner = self.inner.lock().expect("lifecycle lock poisoned");
            match inner.state {
                AdjusterState::Created => {
                    inner.state = AdjusterState::Cancelled;
                    inner.early_cancel = Some(explanation.to_string());
                    debug!("adjuster cancelled before a task was bound");
                    return true;
                }
                AdjusterState::Running => {
                    let (Some(file_id), Some(session)) = (inner.file_id.clone(), inner.session)
                    else {
                        return false;
                    };
                    inner.state = AdjusterState::Cancelled;
                    (file_id, session, inner.outstanding.take())
                }
                _ => return false,
            }
        };

        if let Some(handle) = outstanding {
            handle.abort();
        }
        compensate(&file_id, session);
        self.report_cancelled(&file_id, explanation.to_string());
        true
    }

    pub(crate) fn state(&self) -> AdjusterState {
        self.inner.lock().expect("lifecycle lock poisoned").state
    }

    pub(crate) fn is_running(&self) -> bool {
        self.state() == AdjusterState::Running
    }

    pub(crate) fn session(&self) -> Option<SessionId> {
        self.inner.lock().expect("lifecycle lock poisoned").session
    }

    fn report_cancelled(&self, file_id: &FileId, explanation: String) {
        debug!(%file_id, %explanation, "adjustment cancelled");
        self.handler.task_cancelled(file_id);
        self.events.emit(AdjustmentCancelled {
            file_id: file_id.clone(),
            explanation,
        });
    }
}
