//! One-shot reply handles for asynchronous requests.
//!
//! A client that accepts a request hands back a [`PendingReply`]; the
//! component that eventually answers holds the matching [`ReplySender`].
//! Dropping the pending side is how a caller cancels its interest, and the
//! sender can observe that through [`ReplySender::is_cancelled`].

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use crate::error::NetError;

/// Create a connected sender / pending reply pair.
pub fn reply_channel<T>() -> (ReplySender<T>, PendingReply<T>) {
    let (tx, rx) = oneshot::channel();
    (ReplySender { tx }, PendingReply { rx })
}

/// Answering half of a request.
#[derive(Debug)]
pub struct ReplySender<T> {
    tx: oneshot::Sender<Result<T, NetError>>,
}

impl<T> ReplySender<T> {
    /// Deliver a successful reply. Returns `false` if the requester has
    /// already given up.
    pub fn reply(self, value: T) -> bool {
        self.tx.send(Ok(value)).is_ok()
    }

    /// Deliver a transport-level failure.
    pub fn fail(self, error: NetError) -> bool {
        self.tx.send(Err(error)).is_ok()
    }

    /// Whether the requester dropped its [`PendingReply`].
    pub fn is_cancelled(&self) -> bool {
        self.tx.is_closed()
    }

    /// Wait until the requester drops its [`PendingReply`].
    pub async fn cancelled(&mut self) {
        self.tx.closed().await;
    }
}

/// Awaitable reply to an asynchronous request.
///
/// Resolves to [`NetError::ReplyDropped`] if the answering side goes away
/// without replying.
#[derive(Debug)]
pub struct PendingReply<T> {
    rx: oneshot::Receiver<Result<T, NetError>>,
}

impl<T> PendingReply<T> {
    /// A reply that is already available.
    pub fn ready(result: Result<T, NetError>) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(result);
        Self { rx }
    }
}

impl<T> Future for PendingReply<T> {
    type Output = Result<T, NetError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        Pin::new(&mut this.rx).poll(cx).map(|received| match received {
            Ok(result) => result,
            Err(_) => Err(NetError::ReplyDropped),
        })
    }
}
