// rest/routes/health.rs — health endpoint over the latest stats snapshot.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::stats::Stats;
use crate::AppContext;

#[derive(Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    #[serde(rename = "Stats")]
    pub stats: Stats,
    pub message: String,
}

/// `OK` with the most recent snapshot, or 503 `starting` until the stats
/// ticker has run once. The read is lock-free: snapshots are immutable
/// once published.
pub async fn healthz(State(ctx): State<Arc<AppContext>>) -> Response {
    match ctx.stats.latest() {
        Some(stats) => Json(HealthStatus {
            status: "OK",
            stats: (*stats).clone(),
            message: String::new(),
        })
        .into_response(),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthStatus {
                status: "FAIL",
                stats: Stats::default(),
                message: "starting".into(),
            }),
        )
            .into_response(),
    }
}
