//! Periodic pool statistics.
//!
//! A ticker rebuilds a [`Stats`] snapshot under the pool mutex and publishes
//! it through an [`arc_swap`] pointer; the health endpoint reads the most
//! recent snapshot without taking any lock. Published snapshots are
//! immutable; each refresh stores a new value, never edits the old one.

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};
use tracing::debug;

use crate::pool::ConnectionPool;

#[derive(Debug, Clone, Default, Serialize)]
pub struct ConnectionStats {
    #[serde(rename = "NumPendingActions")]
    pub num_pending_actions: usize,
    #[serde(rename = "Status")]
    pub status: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Stats {
    #[serde(rename = "NumConnections")]
    pub num_connections: usize,
    #[serde(rename = "Connections")]
    pub connections: Vec<ConnectionStats>,
}

/// Most-recent-snapshot holder. `None` until the first tick; the health
/// endpoint reports "starting" in that window.
#[derive(Default)]
pub struct StatsHandle {
    last: ArcSwapOption<Stats>,
}

impl StatsHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, stats: Stats) {
        self.last.store(Some(Arc::new(stats)));
    }

    pub fn latest(&self) -> Option<Arc<Stats>> {
        self.last.load_full()
    }
}

/// Start the refresh ticker. The first snapshot lands one full interval
/// after startup.
pub fn spawn(
    pool: Arc<ConnectionPool>,
    handle: Arc<StatsHandle>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + interval, interval);
        loop {
            ticker.tick().await;
            let stats = pool.snapshot().await;
            debug!(num_connections = stats.num_connections, "refreshed stats");
            for (i, conn) in stats.connections.iter().enumerate() {
                debug!(
                    connection = i,
                    pending_actions = conn.num_pending_actions,
                    status = %conn.status,
                    "connection stats"
                );
            }
            handle.publish(stats);
        }
    })
}
