//! Error types for remote endpoint communication.

use std::time::Duration;

/// Errors that can occur while talking to a pool, the pin manager or a
/// migration endpoint.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NetError {
    /// The remote endpoint could not be reached.
    #[error("endpoint unreachable: {0}")]
    Unreachable(String),

    /// The request was accepted but the endpoint went away before replying.
    #[error("reply dropped before completion")]
    ReplyDropped,

    /// No reply arrived within the allowed wait.
    #[error("no reply after {0:?}")]
    Timeout(Duration),

    /// The endpoint refused the request outright.
    #[error("request rejected: {0}")]
    Rejected(String),

    /// A reply arrived but lacked a field the request needs.
    #[error("malformed reply: {0}")]
    MalformedReply(String),
}
