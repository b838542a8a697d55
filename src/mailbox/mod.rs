//! Mailbox transport seam.
//!
//! A mailbox is a brokered end-to-end-encrypted rendezvous: both sides dial a
//! broker at `host:port`, meet on a stream derived from a shared pairing
//! phrase, and run a key agreement before any payload flows. Everything the
//! rest of the daemon needs from it sits behind [`Transport`] and [`Link`] so
//! the pool can be driven against an in-memory fake in tests.

pub mod crypto;
pub mod ws;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use x25519_dalek::{PublicKey, StaticSecret};

use crate::error::Result;

/// Everything needed to reach one remote node through its mailbox.
pub struct ConnectOpts {
    /// Broker address, `host:port`.
    pub addr: String,
    /// Human-transcribable secret seeding the rendezvous stream.
    pub pairing_phrase: String,
    /// Our static key for the key agreement.
    pub local_key: StaticSecret,
    /// Expected remote static key. `None` on a first connect; the key is
    /// learned during the handshake and pinned by the caller afterwards.
    pub remote_key: Option<PublicKey>,
}

/// Outcome of a successful handshake.
pub struct Handshake {
    pub link: Arc<dyn Link>,
    /// The static key the peer presented (equal to `ConnectOpts::remote_key`
    /// when one was pinned).
    pub remote_key: PublicKey,
    /// The single auth-data message the peer sent, e.g. `Macaroon: <hex>`.
    pub auth_data: String,
    pub status: ConnStatus,
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn connect(&self, opts: ConnectOpts) -> Result<Handshake>;
}

/// One live, encrypted link to a remote node. Calls are unary and strictly
/// serialized: the second `call` waits until the first completes.
#[async_trait]
pub trait Link: Send + Sync {
    async fn call(&self, method: &str, payload: &str) -> Result<String>;

    fn status(&self) -> ConnStatus;

    /// Close the link. Idempotent; a `call` racing a close gets
    /// [`Error::ConnectionClosed`](crate::error::Error::ConnectionClosed).
    async fn close(&self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnStatus {
    Connected,
    NotConnected,
    SessionNotFound,
}

impl fmt::Display for ConnStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnStatus::Connected => "connected",
            ConnStatus::NotConnected => "not connected",
            ConnStatus::SessionNotFound => "session not found",
        };
        f.write_str(s)
    }
}
