use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};

use lncd::{
    config::DaemonConfig, mailbox::ws::WebsocketTransport, rest, rpc::LightningCodec, stats,
    AppContext,
};

#[derive(Parser)]
#[command(
    name = "lncd",
    about = "lncd — HTTP/JSON bridge daemon for Lightning Node Connect sessions",
    version
)]
struct Args {
    /// Idle session eviction timeout (e.g. "5m", "90s").
    #[arg(long, env = "LNCD_TIMEOUT", default_value = "5m", value_parser = humantime::parse_duration)]
    timeout: Duration,

    /// Maximum live sessions in the pool.
    #[arg(long, env = "LNCD_LIMIT_ACTIVE_CONNECTIONS", default_value_t = 210)]
    limit_active_connections: usize,

    /// Stats snapshot refresh interval.
    #[arg(long, env = "LNCD_STATS_INTERVAL", default_value = "1m", value_parser = humantime::parse_duration)]
    stats_interval: Duration,

    /// Verbose logging.
    #[arg(
        long,
        env = "LNCD_DEBUG",
        default_value_t = false,
        value_parser = clap::builder::BoolishValueParser::new(),
        action = clap::ArgAction::Set
    )]
    debug: bool,

    /// Listener bind host.
    #[arg(long, env = "LNCD_RECEIVER_HOST", default_value = "0.0.0.0")]
    receiver_host: String,

    /// Listener bind port.
    #[arg(long, env = "LNCD_RECEIVER_PORT", default_value = "7167")]
    receiver_port: String,

    /// Emit secrets to the logs. Never enable in production.
    #[arg(
        long,
        env = "LNCD_DEV_UNSAFE_LOG",
        default_value_t = false,
        value_parser = clap::builder::BoolishValueParser::new(),
        action = clap::ArgAction::Set
    )]
    dev_unsafe_log: bool,

    /// Write logs to this file path (rotated daily). Optional.
    #[arg(long, env = "LNCD_LOG_FILE")]
    log_file: Option<std::path::PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = Arc::new(DaemonConfig {
        timeout: args.timeout,
        limit_active_connections: args.limit_active_connections,
        stats_interval: args.stats_interval,
        debug: args.debug,
        receiver_host: args.receiver_host,
        receiver_port: args.receiver_port,
        unsafe_log: args.dev_unsafe_log,
    });

    let _guard = setup_logging(config.log_filter(), args.log_file.as_deref());

    info!("starting daemon");
    info!("LNCD_TIMEOUT: {:?}", config.timeout);
    info!(
        "LNCD_LIMIT_ACTIVE_CONNECTIONS: {}",
        config.limit_active_connections
    );
    info!("LNCD_STATS_INTERVAL: {:?}", config.stats_interval);
    info!("LNCD_DEBUG: {}", config.debug);
    info!("LNCD_RECEIVER_HOST: {}", config.receiver_host);
    info!("LNCD_RECEIVER_PORT: {}", config.receiver_port);
    if config.unsafe_log {
        warn!("!!! UNSAFE LOGGING ENABLED !!!");
    }

    let ctx = AppContext::new(
        config.clone(),
        Arc::new(WebsocketTransport::new()),
        Arc::new(LightningCodec::new()),
    );

    let _stats_task = stats::spawn(ctx.pool.clone(), ctx.stats.clone(), config.stats_interval);

    rest::serve(ctx.clone(), shutdown_signal()).await?;

    info!("shutting down daemon");
    ctx.pool.close_all().await;
    info!("shutdown complete");
    Ok(())
}

/// Resolve on ctrl-c or SIGTERM; axum drains in-flight requests afterwards.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let mut term = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = term.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

/// Initialize the tracing subscriber.
/// If `log_file` is set, logs go to both stdout and a daily-rolling file.
/// Returns a `WorkerGuard` that must stay alive for the process lifetime.
///
/// If the log directory cannot be created, falls back to stdout-only logging
/// with a warning; never panics.
fn setup_logging(
    log_level: &str,
    log_file: Option<&std::path::Path>,
) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    if let Some(path) = log_file {
        let dir = path.parent().unwrap_or_else(|| std::path::Path::new("."));
        let filename = path
            .file_name()
            .unwrap_or_else(|| std::ffi::OsStr::new("lncd.log"));

        // tracing-appender needs the directory to exist before opening.
        if let Err(e) = std::fs::create_dir_all(dir) {
            eprintln!(
                "warn: could not create log directory '{}': {e}, falling back to stdout",
                dir.display()
            );
            tracing_subscriber::fmt()
                .with_env_filter(log_level)
                .compact()
                .init();
            return None;
        }

        let appender = tracing_appender::rolling::daily(dir, filename);
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);

        tracing_subscriber::registry()
            .with(tracing_subscriber::EnvFilter::new(log_level))
            .with(tracing_subscriber::fmt::layer().compact())
            .with(tracing_subscriber::fmt::layer().with_writer(non_blocking))
            .init();

        Some(guard)
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(log_level)
            .compact()
            .init();
        None
    }
}
