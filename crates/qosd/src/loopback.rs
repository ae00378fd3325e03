//! In-memory pools and pin manager for `qosd simulate`.
//!
//! Every request is answered on the runtime after a short delay. Answers
//! for requests the engine has given up on are dropped, the same way a
//! real endpoint discards replies nobody waits for.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use qos_adjuster::{AdjusterError, CompletionHandler, CopyRelay};
use qos_net::{
    CancelCopy, CopyFinished, CopyRequest, MigrationClient, NetError, PendingReply, PinClient,
    PinReply, PinRequest, PoolClient, RemoteError, RemoteErrorCode, ReplicaStateReply,
    ReplicaStateRequest, ReplySender, UnpinRequest, reply_channel,
};
use qos_types::FileId;
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tracing::{debug, trace};

/// Number of pools a loopback pool group stages onto.
const GROUP_SIZE: u64 = 4;

/// Loopback implementation of every remote endpoint the engine talks to.
pub struct Loopback {
    handle: Handle,
    relay: Arc<CopyRelay>,
    latency: Duration,
    fail_every: Option<u64>,
    requests: AtomicU64,
    unpins: AtomicU64,
    cancelled_copies: AtomicU64,
}

/// Counters collected by a [`Loopback`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopbackStats {
    /// Requests that expected an answer.
    pub requests: u64,
    /// Unpin requests received.
    pub unpins: u64,
    /// Copy cancellations received.
    pub cancelled_copies: u64,
}

impl Loopback {
    /// Create a loopback answering on `handle`. Copy notices are delivered
    /// to `relay`. With `fail_every = Some(n)`, every n-th request is
    /// answered with an error payload.
    pub fn new(
        handle: Handle,
        relay: Arc<CopyRelay>,
        latency: Duration,
        fail_every: Option<u64>,
    ) -> Arc<Self> {
        Arc::new(Self {
            handle,
            relay,
            latency,
            fail_every: fail_every.filter(|n| *n > 0),
            requests: AtomicU64::new(0),
            unpins: AtomicU64::new(0),
            cancelled_copies: AtomicU64::new(0),
        })
    }

    /// Snapshot of the counters.
    pub fn stats(&self) -> LoopbackStats {
        LoopbackStats {
            requests: self.requests.load(Ordering::Relaxed),
            unpins: self.unpins.load(Ordering::Relaxed),
            cancelled_copies: self.cancelled_copies.load(Ordering::Relaxed),
        }
    }

    /// Count a request and decide whether it should fail.
    fn next_fails(&self) -> (u64, bool) {
        let n = self.requests.fetch_add(1, Ordering::Relaxed) + 1;
        let fails = self.fail_every.is_some_and(|every| n % every == 0);
        (n, fails)
    }

    /// Answer `sender` after the configured latency, unless the requester
    /// gives up first.
    fn answer_later<T: Send + 'static>(&self, mut sender: ReplySender<T>, value: T) {
        let latency = self.latency;
        self.handle.spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(latency) => {
                    if !sender.reply(value) {
                        trace!("reply arrived after requester left");
                    }
                }
                _ = sender.cancelled() => {
                    debug!("request abandoned by requester");
                }
            }
        });
    }
}

fn injected_failure(n: u64) -> RemoteError {
    RemoteError::new(RemoteErrorCode::PoolDisabled, format!("injected failure #{n}"))
}

impl PoolClient for Loopback {
    fn change_replica_state(
        &self,
        request: ReplicaStateRequest,
    ) -> Option<PendingReply<ReplicaStateReply>> {
        let (n, fails) = self.next_fails();
        debug!(
            pool = %request.pool,
            file_id = %request.file_id,
            change = ?request.change,
            "loopback state change"
        );

        let (tx, rx) = reply_channel();
        let reply = ReplicaStateReply {
            error: fails.then(|| injected_failure(n)),
        };
        self.answer_later(tx, reply);
        Some(rx)
    }
}

impl PinClient for Loopback {
    fn pin(&self, request: PinRequest) -> Option<PendingReply<PinReply>> {
        let (n, fails) = self.next_fails();
        let group = request.pool_group.as_deref().unwrap_or("default");

        let (tx, rx) = reply_channel();
        let reply = if fails {
            PinReply {
                pool: None,
                error: Some(injected_failure(n)),
            }
        } else {
            PinReply {
                pool: Some(format!("{group}-pool{}", n % GROUP_SIZE)),
                error: None,
            }
        };
        self.answer_later(tx, reply);
        Some(rx)
    }

    fn unpin(&self, request: UnpinRequest) -> Result<(), NetError> {
        debug!(file_id = %request.file_id, request_id = %request.request_id, "loopback unpin");
        self.unpins.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

impl MigrationClient for Loopback {
    fn start_copy(&self, request: CopyRequest) -> Result<(), NetError> {
        let (n, fails) = self.next_fails();
        let notice = CopyFinished {
            file_id: request.file_id,
            session: request.session,
            target: request.target,
            error: fails.then(|| injected_failure(n)),
        };

        let relay = self.relay.clone();
        let latency = self.latency;
        self.handle.spawn(async move {
            tokio::time::sleep(latency).await;
            if !relay.copy_finished(notice) {
                trace!("copy notice arrived after cancellation");
            }
        });
        Ok(())
    }

    fn cancel_copy(&self, request: CancelCopy) -> Result<(), NetError> {
        debug!(file_id = %request.file_id, target = %request.target, "loopback copy cancel");
        self.cancelled_copies.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tally
// ---------------------------------------------------------------------------

/// Completion handler that counts outcomes.
#[derive(Default)]
pub struct Tally {
    completed: AtomicUsize,
    failed: AtomicUsize,
    cancelled: AtomicUsize,
    notify: Notify,
}

impl Tally {
    /// Outcomes seen so far, as `(completed, failed, cancelled)`.
    pub fn counts(&self) -> (usize, usize, usize) {
        (
            self.completed.load(Ordering::SeqCst),
            self.failed.load(Ordering::SeqCst),
            self.cancelled.load(Ordering::SeqCst),
        )
    }

    /// Total outcomes seen so far.
    pub fn total(&self) -> usize {
        let (c, f, x) = self.counts();
        c + f + x
    }

    /// Wait until at least `expected` outcomes have been recorded.
    pub async fn wait_for(&self, expected: usize) {
        loop {
            let notified = self.notify.notified();
            if self.total() >= expected {
                return;
            }
            notified.await;
        }
    }

    fn bump(&self, counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::SeqCst);
        self.notify.notify_waiters();
    }
}

impl CompletionHandler for Tally {
    fn task_completed(&self, file_id: &FileId, target: Option<&str>) {
        trace!(%file_id, target = ?target, "completed");
        self.bump(&self.completed);
    }

    fn task_failed(&self, file_id: &FileId, _target: Option<&str>, error: AdjusterError) {
        trace!(%file_id, error = %error, "failed");
        self.bump(&self.failed);
    }

    fn task_cancelled(&self, file_id: &FileId) {
        trace!(%file_id, "cancelled");
        self.bump(&self.cancelled);
    }
}
