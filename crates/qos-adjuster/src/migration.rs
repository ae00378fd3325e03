//! Pool-to-pool migration sub-task and the relay that completes it.
//!
//! A [`MigrationTask`] selects a target from its pool list, registers a
//! completion slot with the [`CopyRelay`] and asks the target pool to pull
//! the replica. The pool later answers with a [`CopyFinished`] message;
//! whoever receives it hands it to [`CopyRelay::copy_finished`], which
//! resolves the sub-task's pending reply. Slots are keyed by
//! `(FileId, SessionId)`, so a late reply for a cancelled copy finds no
//! slot and is dropped.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use qos_net::{
    CancelCopy, CopyFinished, CopyRequest, MigrationClient, NetError, PendingReply, ReplySender,
    TransferParameters, reply_channel,
};
use qos_types::{FileAttributes, FileId, PoolInfo, SessionId};
use tracing::{debug, trace, warn};

// ---------------------------------------------------------------------------
// Pool selection
// ---------------------------------------------------------------------------

/// Chooses the copy target from a candidate list.
pub trait PoolSelectionStrategy: Send + Sync {
    /// Pick one pool, or `None` if no candidate is acceptable.
    fn select<'a>(&self, pools: &'a [PoolInfo]) -> Option<&'a PoolInfo>;
}

/// Degenerate strategy for lists of exactly one pre-selected pool.
///
/// Selection already happened upstream, so this returns the first
/// candidate without looking at cost or readability.
#[derive(Debug, Default, Clone, Copy)]
pub struct SinglePoolSelection;

impl PoolSelectionStrategy for SinglePoolSelection {
    fn select<'a>(&self, pools: &'a [PoolInfo]) -> Option<&'a PoolInfo> {
        pools.first()
    }
}

/// Parameters for creating exactly one extra replica of a file.
pub fn single_copy_parameters() -> TransferParameters {
    TransferParameters {
        eager: false,
        meta_only: false,
        compute_checksum_on_update: false,
        force_source_mode: false,
        maintain_atime: true,
        replicas: 1,
    }
}

// ---------------------------------------------------------------------------
// CopyRelay
// ---------------------------------------------------------------------------

/// Routes inbound [`CopyFinished`] messages to the sub-task waiting on them.
#[derive(Default)]
pub struct CopyRelay {
    waiting: Mutex<HashMap<(FileId, SessionId), ReplySender<CopyFinished>>>,
}

impl CopyRelay {
    /// Create an empty relay.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Deliver a finished-copy notice. Returns `false` if nobody was waiting.
    pub fn copy_finished(&self, message: CopyFinished) -> bool {
        let key = (message.file_id.clone(), message.session);
        let sender = self
            .waiting
            .lock()
            .expect("copy relay lock poisoned")
            .remove(&key);

        match sender {
            Some(sender) => sender.reply(message),
            None => {
                // Cancellation and the pool's reply can cross in flight.
                trace!(file_id = %key.0, session = %key.1, "no copy waiting for this notice");
                false
            }
        }
    }

    /// Number of copies currently waiting for a notice.
    pub fn len(&self) -> usize {
        self.waiting.lock().expect("copy relay lock poisoned").len()
    }

    /// Whether no copy is waiting.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn register(&self, file_id: FileId, session: SessionId) -> PendingReply<CopyFinished> {
        let (tx, rx) = reply_channel();
        let previous = self
            .waiting
            .lock()
            .expect("copy relay lock poisoned")
            .insert((file_id, session), tx);
        debug_assert!(previous.is_none(), "copy slot registered twice");
        rx
    }

    fn forget(&self, file_id: &FileId, session: SessionId) {
        self.waiting
            .lock()
            .expect("copy relay lock poisoned")
            .remove(&(file_id.clone(), session));
    }
}

impl std::fmt::Debug for CopyRelay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CopyRelay")
            .field("waiting", &self.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// MigrationTask
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
enum MigrationState {
    Idle,
    Running { target: String },
    Cancelled,
}

/// One pool-to-pool copy of a single file.
pub struct MigrationTask {
    file_id: FileId,
    access_time: u64,
    source: String,
    pools: Vec<PoolInfo>,
    strategy: Box<dyn PoolSelectionStrategy>,
    parameters: TransferParameters,
    session: SessionId,
    client: Arc<dyn MigrationClient>,
    relay: Arc<CopyRelay>,
    state: Mutex<MigrationState>,
}

impl MigrationTask {
    /// Configure a copy of `attributes.file_id` from `source` to one of `pools`.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        attributes: &FileAttributes,
        source: String,
        pools: Vec<PoolInfo>,
        strategy: Box<dyn PoolSelectionStrategy>,
        parameters: TransferParameters,
        session: SessionId,
        client: Arc<dyn MigrationClient>,
        relay: Arc<CopyRelay>,
    ) -> Self {
        Self {
            file_id: attributes.file_id.clone(),
            access_time: attributes.access_time,
            source,
            pools,
            strategy,
            parameters,
            session,
            client,
            relay,
            state: Mutex::new(MigrationState::Idle),
        }
    }

    /// Select the target and send the copy request.
    ///
    /// Returns the chosen target and a reply that resolves when the
    /// relay receives the matching [`CopyFinished`].
    pub fn start(&self) -> Result<(String, PendingReply<CopyFinished>), NetError> {
        let target = self
            .strategy
            .select(&self.pools)
            .map(|p| p.name.clone())
            .ok_or_else(|| NetError::Rejected("no target pool selected".to_string()))?;

        let mut state = self.state.lock().expect("migration lock poisoned");
        if *state != MigrationState::Idle {
            return Err(NetError::Rejected(format!(
                "migration of {} already started or cancelled",
                self.file_id
            )));
        }

        let pending = self.relay.register(self.file_id.clone(), self.session);
        let request = CopyRequest {
            file_id: self.file_id.clone(),
            source: self.source.clone(),
            target: target.clone(),
            parameters: self.parameters.clone(),
            access_time: self.access_time,
            session: self.session,
        };

        if let Err(e) = self.client.start_copy(request) {
            self.relay.forget(&self.file_id, self.session);
            return Err(e);
        }

        debug!(file_id = %self.file_id, source = %self.source, %target, "migration started");
        *state = MigrationState::Running {
            target: target.clone(),
        };
        Ok((target, pending))
    }

    /// Abandon the copy. Best-effort: the pool may finish anyway.
    pub fn cancel(&self, explanation: &str) {
        let previous = {
            let mut state = self.state.lock().expect("migration lock poisoned");
            std::mem::replace(&mut *state, MigrationState::Cancelled)
        };

        let MigrationState::Running { target } = previous else {
            return;
        };

        self.relay.forget(&self.file_id, self.session);
        let request = CancelCopy {
            file_id: self.file_id.clone(),
            target: target.clone(),
            explanation: explanation.to_string(),
            session: self.session,
        };
        if let Err(e) = self.client.cancel_copy(request) {
            warn!(
                file_id = %self.file_id,
                %target,
                error = %e,
                "failed to cancel migration on pool"
            );
        }
    }

    /// The file being copied.
    pub fn file_id(&self) -> &FileId {
        &self.file_id
    }

    /// Whether [`cancel`](Self::cancel) has been called.
    pub fn is_cancelled(&self) -> bool {
        *self.state.lock().expect("migration lock poisoned") == MigrationState::Cancelled
    }
}

impl std::fmt::Debug for MigrationTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MigrationTask")
            .field("file_id", &self.file_id)
            .field("source", &self.source)
            .field("pools", &self.pools)
            .field("session", &self.session)
            .finish()
    }
}
