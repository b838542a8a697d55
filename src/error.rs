//! Daemon error kinds.
//!
//! Everything that can fail an [`Action`](crate::pool::Action) funnels into
//! this enum; the HTTP layer turns it into a 500 with the display text as the
//! body. Credential decode problems are special: the permission checker
//! surfaces them as `Err` so callers can log them, but they always degrade to
//! a deny, never to a failed request.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Admission rejected: the pool is at its configured connection limit.
    #[error("too many active connections")]
    TooManyConnections,

    /// Session construction failed: key parsing, mailbox dial, or an
    /// auth-data message of the wrong shape.
    #[error("handshake failed: {0}")]
    Handshake(String),

    /// The credential identifier is empty, has an unsupported version tag,
    /// or does not decode.
    #[error("bad credential: {0}")]
    Credential(String),

    /// The requested method is not present in the session's registry.
    #[error("unknown method: {0}")]
    UnknownMethod(String),

    /// The remote node (or the link to it) reported a failure.
    #[error("upstream error: {0}")]
    Upstream(String),

    /// The action payload could not be decoded.
    #[error("invalid payload: {0}")]
    Payload(String),

    /// The session was closed before the action could be delivered.
    #[error("connection closed")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, Error>;
