//! Shared worker pool that runs adjuster waits off the caller's thread.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use qos_net::{NetError, PendingReply};
use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tokio::task::AbortHandle;

/// Long-lived executor shared by every adjuster.
///
/// Work is spawned on an injected runtime handle. A semaphore bounds how
/// many waits run at once; queued work holds no permit until it starts.
pub struct WorkerPool {
    handle: Handle,
    permits: Arc<Semaphore>,
    max_concurrent: usize,
}

impl WorkerPool {
    /// Create a pool spawning onto `handle`.
    pub fn new(handle: Handle, max_concurrent: usize) -> Arc<Self> {
        let max_concurrent = max_concurrent.max(1);
        Arc::new(Self {
            handle,
            permits: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
        })
    }

    /// Create a pool on the runtime the caller is running in.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub fn current(max_concurrent: usize) -> Arc<Self> {
        Self::new(Handle::current(), max_concurrent)
    }

    /// Schedule `work` and return immediately.
    ///
    /// The returned handle aborts the work at its next suspension point.
    pub fn spawn<F>(&self, work: F) -> AbortHandle
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let permits = self.permits.clone();
        self.handle
            .spawn(async move {
                let Ok(_permit) = permits.acquire_owned().await else {
                    return;
                };
                work.await;
            })
            .abort_handle()
    }

    /// Number of waits that could start right now.
    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }

    /// Configured concurrency limit.
    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("max_concurrent", &self.max_concurrent)
            .field("available", &self.permits.available_permits())
            .finish()
    }
}

/// Await a reply, bounded by `max_wait` when one is configured.
pub(crate) async fn wait_for_reply<T>(
    reply: PendingReply<T>,
    max_wait: Option<Duration>,
) -> Result<T, NetError> {
    match max_wait {
        Some(limit) => tokio::time::timeout(limit, reply)
            .await
            .unwrap_or(Err(NetError::Timeout(limit))),
        None => reply.await,
    }
}
