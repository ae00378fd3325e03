//! Remote endpoint contracts consumed by the adjustment engine.
//!
//! The engine never talks to the network directly. It goes through three
//! client traits, one per remote service:
//!
//! - [`PoolClient`]: replica state bit changes on a single pool.
//! - [`PinClient`]: pin / unpin requests to the pin manager.
//! - [`MigrationClient`]: pool-to-pool copy requests and their cancellation.
//!
//! Request/reply calls return a [`PendingReply`] at send time, or `None`
//! when the request could not be dispatched at all. Production deployments
//! plug in their messaging layer; tests plug in fakes.

mod error;
mod message;
mod reply;

pub use error::NetError;
pub use message::{
    CancelCopy, CopyFinished, CopyRequest, PinReply, PinRequest, ProtocolDescriptor, RemoteError,
    RemoteErrorCode, ReplicaStateReply, ReplicaStateRequest, StateChange, TransferParameters,
    UnpinRequest,
};
pub use reply::{PendingReply, ReplySender, reply_channel};

/// Client for the pool state-change endpoint.
pub trait PoolClient: Send + Sync {
    /// Send a state change to the pool named in the request.
    ///
    /// Returns `None` if no request could be dispatched.
    fn change_replica_state(
        &self,
        request: ReplicaStateRequest,
    ) -> Option<PendingReply<ReplicaStateReply>>;
}

/// Client for the pin manager.
pub trait PinClient: Send + Sync {
    /// Request a pin. Returns `None` if no request could be dispatched.
    fn pin(&self, request: PinRequest) -> Option<PendingReply<PinReply>>;

    /// Release a pin. Fire-and-forget: only dispatch failures are reported.
    fn unpin(&self, request: UnpinRequest) -> Result<(), NetError>;
}

/// Client for the pool-to-pool transfer endpoint.
///
/// Completion is not returned here: the target pool later sends a
/// [`CopyFinished`] message, which the receiving side relays to whoever
/// is waiting on the copy.
pub trait MigrationClient: Send + Sync {
    /// Ask the target pool to pull a replica from the source pool.
    fn start_copy(&self, request: CopyRequest) -> Result<(), NetError>;

    /// Ask the target pool to abort a running copy.
    fn cancel_copy(&self, request: CancelCopy) -> Result<(), NetError>;
}
