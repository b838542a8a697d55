//! Connection pool: a keyed cache of warm mailbox sessions.
//!
//! Sessions are expensive (a full pairing handshake), so the pool keeps
//! them alive keyed by (mailbox, pairing phrase) and multiplexes callers
//! onto them. Admission is strictly count-based; idle sessions are reaped by
//! a per-session timer task.

mod connection;

pub use connection::{
    Action, ActionOutcome, Connection, ConnectionInfo, ConnectionKey, CHECK_PERMS_METHOD,
};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::Error;
use crate::mailbox::Transport;
use crate::rpc::RpcCodec;
use crate::stats::{ConnectionStats, Stats};

pub struct ConnectionPool {
    connections: Mutex<HashMap<ConnectionKey, Arc<Connection>>>,
    limit: usize,
    idle_timeout: Duration,
    unsafe_log: bool,
    transport: Arc<dyn Transport>,
    codec: Arc<dyn RpcCodec>,
}

impl ConnectionPool {
    pub fn new(
        limit: usize,
        idle_timeout: Duration,
        unsafe_log: bool,
        transport: Arc<dyn Transport>,
        codec: Arc<dyn RpcCodec>,
    ) -> Arc<Self> {
        Arc::new(Self {
            connections: Mutex::new(HashMap::new()),
            limit,
            idle_timeout,
            unsafe_log,
            transport,
            codec,
        })
    }

    /// Run one action against the session for `info`, creating the session
    /// if needed. Fire-and-forget: the outcome travels through the action's
    /// own completion handle.
    ///
    /// At the admission limit the action fails with `TooManyConnections`;
    /// the caller decides whether to come back, the pool does not retry.
    pub async fn execute(self: &Arc<Self>, info: ConnectionInfo, action: Action) {
        let key = ConnectionKey::from_info(&info);
        let mut action = action;

        loop {
            let conn = {
                let mut connections = self.connections.lock().await;
                if let Some(conn) = connections.get(&key).cloned() {
                    info!("reusing existing connection");
                    if self.unsafe_log {
                        debug!(connection = ?info, "reuse");
                    }
                    conn
                } else {
                    if connections.len() >= self.limit {
                        action.fail(Error::TooManyConnections);
                        return;
                    }
                    info!("creating new connection");
                    if self.unsafe_log {
                        debug!(connection = ?info, "create");
                    }
                    // The handshake runs while the pool is locked so
                    // admission accounting stays consistent with pool
                    // contents.
                    match Connection::open(
                        info.clone(),
                        self.transport.as_ref(),
                        self.codec.as_ref(),
                        self.unsafe_log,
                    )
                    .await
                    {
                        Ok(conn) => {
                            connections.insert(key.clone(), conn.clone());
                            self.spawn_eviction(key.clone(), conn.clone());
                            conn
                        }
                        Err(e) => {
                            action.fail(e);
                            return;
                        }
                    }
                }
            };

            // Enqueue outside the lock: a full queue must backpressure this
            // caller, not every caller.
            match conn.submit(action).await {
                Ok(()) => return,
                Err(rejected) => {
                    // The session closed between lookup and enqueue. Drop
                    // the stale entry and go again.
                    debug!("connection closed before enqueue, retrying");
                    let mut connections = self.connections.lock().await;
                    if let Some(current) = connections.get(&key) {
                        if Arc::ptr_eq(current, &conn) {
                            connections.remove(&key);
                        }
                    }
                    action = rejected;
                }
            }
        }
    }

    pub async fn len(&self) -> usize {
        self.connections.lock().await.len()
    }

    /// Consistent point-in-time view of the pool.
    pub async fn snapshot(&self) -> Stats {
        let connections = self.connections.lock().await;
        Stats {
            num_connections: connections.len(),
            connections: connections
                .values()
                .map(|conn| ConnectionStats {
                    num_pending_actions: conn.pending(),
                    status: conn.status().to_string(),
                })
                .collect(),
        }
    }

    /// Shutdown: close every session. Accepted actions still drain before
    /// each link goes down.
    pub async fn close_all(&self) {
        let mut connections = self.connections.lock().await;
        for (_, conn) in connections.drain() {
            conn.close();
        }
    }

    /// Idle reaper for one session: every `idle_timeout` the timer checks the
    /// queue; empty means close and remove, otherwise it rearms for another
    /// full interval. The task also ends quietly if the entry was already
    /// replaced or removed.
    fn spawn_eviction(self: &Arc<Self>, key: ConnectionKey, conn: Arc<Connection>) {
        let pool = Arc::clone(self);
        let timeout = self.idle_timeout;
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(timeout).await;
                let mut connections = pool.connections.lock().await;
                match connections.get(&key) {
                    Some(current) if Arc::ptr_eq(current, &conn) => {}
                    _ => break,
                }
                if conn.pending() == 0 {
                    connections.remove(&key);
                    drop(connections);
                    info!(remote_key = %conn.info().remote_key, "closing idle connection");
                    if pool.unsafe_log {
                        debug!(connection = ?conn.info(), "evict");
                    }
                    conn.close();
                    break;
                }
            }
        });
    }
}
