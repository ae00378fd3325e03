//! Shared test harness for QoS engine integration tests.
//!
//! Provides [`TestEngine`]: an [`AdjusterFactory`] wired to [`FakeEndpoints`]
//! and a [`RecordingHandler`]. The fake endpoints hold every reply sender so
//! a test decides when, and how, each remote request is answered.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use qos_adjuster::{
    AdjusterConfig, AdjusterError, AdjusterFactory, CompletionHandler, WorkerPool,
};
use qos_net::*;
use qos_types::FileId;
use tokio::sync::Notify;

/// How long a test waits for outcomes before giving up.
pub const OUTCOME_WAIT: Duration = Duration::from_secs(10);

// =========================================================================
// Recording completion handler
// =========================================================================

/// One terminal callback as observed by [`RecordingHandler`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Completed {
        file_id: FileId,
        target: Option<String>,
    },
    Failed {
        file_id: FileId,
        target: Option<String>,
        error: AdjusterError,
    },
    Cancelled {
        file_id: FileId,
    },
}

impl Outcome {
    /// The file the outcome concerns.
    pub fn file_id(&self) -> &FileId {
        match self {
            Outcome::Completed { file_id, .. }
            | Outcome::Failed { file_id, .. }
            | Outcome::Cancelled { file_id } => file_id,
        }
    }
}

/// Completion handler that records every callback in arrival order.
#[derive(Default)]
pub struct RecordingHandler {
    outcomes: Mutex<Vec<Outcome>>,
    notify: Notify,
}

impl RecordingHandler {
    /// Every outcome recorded so far.
    pub fn outcomes(&self) -> Vec<Outcome> {
        self.outcomes.lock().unwrap().clone()
    }

    /// Outcomes recorded for `file_id`.
    pub fn outcomes_for(&self, file_id: &FileId) -> Vec<Outcome> {
        self.outcomes()
            .into_iter()
            .filter(|o| o.file_id() == file_id)
            .collect()
    }

    /// Wait until at least `n` outcomes have been recorded.
    pub async fn wait_for(&self, n: usize) -> Vec<Outcome> {
        tokio::time::timeout(OUTCOME_WAIT, async {
            loop {
                let notified = self.notify.notified();
                let seen = self.outcomes();
                if seen.len() >= n {
                    return seen;
                }
                notified.await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {n} outcomes: {:?}", self.outcomes()))
    }

    fn record(&self, outcome: Outcome) {
        self.outcomes.lock().unwrap().push(outcome);
        self.notify.notify_waiters();
    }
}

impl CompletionHandler for RecordingHandler {
    fn task_completed(&self, file_id: &FileId, target: Option<&str>) {
        self.record(Outcome::Completed {
            file_id: file_id.clone(),
            target: target.map(str::to_string),
        });
    }

    fn task_failed(&self, file_id: &FileId, target: Option<&str>, error: AdjusterError) {
        self.record(Outcome::Failed {
            file_id: file_id.clone(),
            target: target.map(str::to_string),
            error,
        });
    }

    fn task_cancelled(&self, file_id: &FileId) {
        self.record(Outcome::Cancelled {
            file_id: file_id.clone(),
        });
    }
}

// =========================================================================
// Fake endpoints
// =========================================================================

/// Fake pools, pin manager and migration endpoint.
///
/// Requests are recorded. Requests that expect a reply park their sender
/// in a queue for the test to answer.
#[derive(Default)]
pub struct FakeEndpoints {
    pools_offline: AtomicBool,
    pin_manager_offline: AtomicBool,

    state_requests: Mutex<Vec<ReplicaStateRequest>>,
    state_replies: Mutex<VecDeque<ReplySender<ReplicaStateReply>>>,

    pin_requests: Mutex<Vec<PinRequest>>,
    pin_replies: Mutex<VecDeque<ReplySender<PinReply>>>,
    unpin_requests: Mutex<Vec<UnpinRequest>>,

    copy_requests: Mutex<Vec<CopyRequest>>,
    copy_cancels: Mutex<Vec<CancelCopy>>,
}

impl FakeEndpoints {
    /// Make every pool refuse to produce a reply handle.
    pub fn set_pools_offline(&self, offline: bool) {
        self.pools_offline.store(offline, Ordering::SeqCst);
    }

    /// Make the pin manager refuse to produce a reply handle.
    pub fn set_pin_manager_offline(&self, offline: bool) {
        self.pin_manager_offline.store(offline, Ordering::SeqCst);
    }

    pub fn state_requests(&self) -> Vec<ReplicaStateRequest> {
        self.state_requests.lock().unwrap().clone()
    }

    pub fn pin_requests(&self) -> Vec<PinRequest> {
        self.pin_requests.lock().unwrap().clone()
    }

    pub fn unpin_requests(&self) -> Vec<UnpinRequest> {
        self.unpin_requests.lock().unwrap().clone()
    }

    pub fn copy_requests(&self) -> Vec<CopyRequest> {
        self.copy_requests.lock().unwrap().clone()
    }

    pub fn copy_cancels(&self) -> Vec<CancelCopy> {
        self.copy_cancels.lock().unwrap().clone()
    }

    /// Oldest unanswered state-change reply.
    pub fn next_state_reply(&self) -> ReplySender<ReplicaStateReply> {
        self.state_replies
            .lock()
            .unwrap()
            .pop_front()
            .expect("no state change pending")
    }

    /// Oldest unanswered pin reply.
    pub fn next_pin_reply(&self) -> ReplySender<PinReply> {
        self.pin_replies
            .lock()
            .unwrap()
            .pop_front()
            .expect("no pin pending")
    }
}

impl PoolClient for FakeEndpoints {
    fn change_replica_state(
        &self,
        request: ReplicaStateRequest,
    ) -> Option<PendingReply<ReplicaStateReply>> {
        self.state_requests.lock().unwrap().push(request);
        if self.pools_offline.load(Ordering::SeqCst) {
            return None;
        }
        let (tx, rx) = reply_channel();
        self.state_replies.lock().unwrap().push_back(tx);
        Some(rx)
    }
}

impl PinClient for FakeEndpoints {
    fn pin(&self, request: PinRequest) -> Option<PendingReply<PinReply>> {
        self.pin_requests.lock().unwrap().push(request);
        if self.pin_manager_offline.load(Ordering::SeqCst) {
            return None;
        }
        let (tx, rx) = reply_channel();
        self.pin_replies.lock().unwrap().push_back(tx);
        Some(rx)
    }

    fn unpin(&self, request: UnpinRequest) -> Result<(), NetError> {
        self.unpin_requests.lock().unwrap().push(request);
        Ok(())
    }
}

impl MigrationClient for FakeEndpoints {
    fn start_copy(&self, request: CopyRequest) -> Result<(), NetError> {
        self.copy_requests.lock().unwrap().push(request);
        Ok(())
    }

    fn cancel_copy(&self, request: CancelCopy) -> Result<(), NetError> {
        self.copy_cancels.lock().unwrap().push(request);
        Ok(())
    }
}

// =========================================================================
// TestEngine
// =========================================================================

/// A factory wired to fake endpoints and a recording handler.
pub struct TestEngine {
    pub factory: AdjusterFactory,
    pub endpoints: Arc<FakeEndpoints>,
    pub handler: Arc<RecordingHandler>,
    pub workers: Arc<WorkerPool>,
}

impl TestEngine {
    /// Engine with the default configuration.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new() -> Self {
        Self::with_config(AdjusterConfig::default())
    }

    /// Engine with a custom configuration.
    pub fn with_config(config: AdjusterConfig) -> Self {
        let endpoints = Arc::new(FakeEndpoints::default());
        let handler = Arc::new(RecordingHandler::default());
        let workers = WorkerPool::current(config.max_concurrent);
        let factory = AdjusterFactory::new(
            endpoints.clone(),
            endpoints.clone(),
            endpoints.clone(),
            workers.clone(),
            handler.clone(),
            config,
        );
        Self {
            factory,
            endpoints,
            handler,
            workers,
        }
    }
}

impl Default for TestEngine {
    fn default() -> Self {
        Self::new()
    }
}
