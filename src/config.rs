//! Daemon configuration.
//!
//! Every knob is an `LNCD_*` environment variable (or the matching CLI
//! flag); there is no config file. Values are parsed by clap in `main` and
//! merged into this struct.

use std::time::Duration;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_LIMIT_ACTIVE_CONNECTIONS: usize = 210;
pub const DEFAULT_STATS_INTERVAL: Duration = Duration::from_secs(60);
pub const DEFAULT_RECEIVER_HOST: &str = "0.0.0.0";
pub const DEFAULT_RECEIVER_PORT: &str = "7167";

#[derive(Debug, Clone)]
pub struct DaemonConfig {
    /// Idle-eviction timeout: a session with an empty queue for this long is
    /// closed and removed from the pool.
    pub timeout: Duration,
    /// Admission cap on live sessions.
    pub limit_active_connections: usize,
    /// How often the stats snapshot is refreshed.
    pub stats_interval: Duration,
    /// Verbose logging.
    pub debug: bool,
    /// Listener bind host.
    pub receiver_host: String,
    /// Listener bind port.
    pub receiver_port: String,
    /// Emit secrets (keys, pairing phrases, payloads) to the logs.
    /// Never enable in production.
    pub unsafe_log: bool,
}

impl DaemonConfig {
    /// Filter string for the tracing subscriber.
    pub fn log_filter(&self) -> &'static str {
        if self.debug {
            "debug"
        } else {
            "info"
        }
    }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            limit_active_connections: DEFAULT_LIMIT_ACTIVE_CONNECTIONS,
            stats_interval: DEFAULT_STATS_INTERVAL,
            debug: false,
            receiver_host: DEFAULT_RECEIVER_HOST.to_string(),
            receiver_port: DEFAULT_RECEIVER_PORT.to_string(),
            unsafe_log: false,
        }
    }
}
