pub mod config;
pub mod creds;
pub mod error;
pub mod keys;
pub mod mailbox;
pub mod perms;
pub mod pool;
pub mod rest;
pub mod rpc;
pub mod stats;

#[cfg(test)]
pub(crate) mod testutil;

use std::sync::Arc;
use std::time::Instant;

use config::DaemonConfig;
use mailbox::Transport;
use pool::ConnectionPool;
use rpc::RpcCodec;
use stats::StatsHandle;

/// Shared application state passed to every HTTP handler and background
/// task.
pub struct AppContext {
    pub config: Arc<DaemonConfig>,
    pub pool: Arc<ConnectionPool>,
    /// Most recent stats snapshot; `None` until the first ticker run.
    pub stats: Arc<StatsHandle>,
    pub started_at: Instant,
}

impl AppContext {
    pub fn new(
        config: Arc<DaemonConfig>,
        transport: Arc<dyn Transport>,
        codec: Arc<dyn RpcCodec>,
    ) -> Arc<Self> {
        let pool = ConnectionPool::new(
            config.limit_active_connections,
            config.timeout,
            config.unsafe_log,
            transport,
            codec,
        );
        Arc::new(Self {
            config,
            pool,
            stats: Arc::new(StatsHandle::new()),
            started_at: Instant::now(),
        })
    }
}
