//! Test doubles for the mailbox seam, shared by the pool and HTTP tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rand_core::OsRng;
use x25519_dalek::{PublicKey, StaticSecret};

use crate::creds::{encode_credential, Grant};
use crate::error::{Error, Result};
use crate::mailbox::{ConnStatus, ConnectOpts, Handshake, Link, Transport};

/// In-memory transport: every connect succeeds instantly and yields a
/// [`FakeLink`], unless a failure was queued.
pub struct FakeTransport {
    auth_data: Mutex<String>,
    fail_next: AtomicBool,
    connects: AtomicUsize,
    links: Mutex<Vec<Arc<FakeLink>>>,
    call_delay: Mutex<Option<Duration>>,
}

impl FakeTransport {
    /// Transport whose sessions carry a broadly useful credential: read and
    /// write on invoices and offchain, read on info and onchain.
    pub fn new() -> Arc<Self> {
        let cred = encode_credential(vec![
            grant("invoices", &["read", "write"]),
            grant("offchain", &["read", "write"]),
            grant("info", &["read"]),
            grant("onchain", &["read"]),
        ]);
        Arc::new(Self {
            auth_data: Mutex::new(format!("Macaroon: {}", hex::encode(cred.id()))),
            fail_next: AtomicBool::new(false),
            connects: AtomicUsize::new(0),
            links: Mutex::new(Vec::new()),
            call_delay: Mutex::new(None),
        })
    }

    /// Replace the credential presented by future handshakes.
    pub fn set_credential(&self, grants: Vec<Grant>) {
        let cred = encode_credential(grants);
        *self.auth_data.lock().unwrap() = format!("Macaroon: {}", hex::encode(cred.id()));
    }

    /// Replace the raw auth-data message (for malformed-credential cases).
    pub fn set_auth_data(&self, data: impl Into<String>) {
        *self.auth_data.lock().unwrap() = data.into();
    }

    /// Make the next handshake fail.
    pub fn fail_next_handshake(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    /// Delay every call on links created after this point.
    pub fn set_call_delay(&self, delay: Duration) {
        *self.call_delay.lock().unwrap() = Some(delay);
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn last_link(&self) -> Arc<FakeLink> {
        self.links
            .lock()
            .unwrap()
            .last()
            .expect("no link was created")
            .clone()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn connect(&self, _opts: ConnectOpts) -> Result<Handshake> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(Error::Handshake("mailbox dial failed: refused".into()));
        }
        self.connects.fetch_add(1, Ordering::SeqCst);

        let link = Arc::new(FakeLink {
            calls: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
            delay: *self.call_delay.lock().unwrap(),
        });
        self.links.lock().unwrap().push(link.clone());

        Ok(Handshake {
            link: link.clone(),
            remote_key: PublicKey::from(&StaticSecret::random_from_rng(OsRng)),
            auth_data: self.auth_data.lock().unwrap().clone(),
            status: ConnStatus::Connected,
        })
    }
}

/// Records calls and answers every one with a fixed JSON blob.
pub struct FakeLink {
    calls: Mutex<Vec<(String, String)>>,
    closed: AtomicBool,
    delay: Option<Duration>,
}

impl FakeLink {
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Link for FakeLink {
    async fn call(&self, method: &str, payload: &str) -> Result<String> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.closed() {
            return Err(Error::ConnectionClosed);
        }
        self.calls
            .lock()
            .unwrap()
            .push((method.to_string(), payload.to_string()));
        Ok(r#"{"ok":true}"#.to_string())
    }

    fn status(&self) -> ConnStatus {
        if self.closed() {
            ConnStatus::NotConnected
        } else {
            ConnStatus::Connected
        }
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

fn grant(entity: &str, actions: &[&str]) -> Grant {
    Grant {
        entity: entity.into(),
        actions: actions.iter().map(|s| s.to_string()).collect(),
    }
}
