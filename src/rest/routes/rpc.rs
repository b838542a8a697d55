// rest/routes/rpc.rs — the JSON-RPC bridge endpoint.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::pool::{Action, ConnectionInfo};
use crate::AppContext;

#[derive(Deserialize)]
pub struct RpcRequest {
    #[serde(rename = "Connection", default)]
    pub connection: ConnectionInfo,
    #[serde(rename = "Method")]
    pub method: String,
    #[serde(rename = "Payload", default)]
    pub payload: String,
}

#[derive(Serialize)]
pub struct RpcResponse {
    #[serde(rename = "Connection")]
    pub connection: ConnectionInfo,
    #[serde(rename = "Result")]
    pub result: String,
}

/// Decode the envelope, run the action through the pool, wait for its
/// completion, and write the response. The completion handle fires exactly
/// once, so this handler resolves exactly once.
pub async fn rpc(State(ctx): State<Arc<AppContext>>, body: String) -> Response {
    let request: RpcRequest = match serde_json::from_str(&body) {
        Ok(request) => request,
        Err(_) => return (StatusCode::BAD_REQUEST, "Invalid JSON").into_response(),
    };

    info!(method = %request.method, "incoming RPC request");
    if ctx.config.unsafe_log {
        debug!(payload = %request.payload, "full request");
    }

    let (action, outcome) = Action::new(request.method, request.payload);
    ctx.pool.execute(request.connection, action).await;

    match outcome.await {
        Ok(Ok((connection, result))) => {
            debug!("RPC response ready");
            Json(RpcResponse { connection, result }).into_response()
        }
        Ok(Err(e)) => {
            error!(err = %e, "RPC error");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
        // The completion sender can only vanish if the session task died.
        Err(_) => {
            error!("action completed without an outcome");
            (StatusCode::INTERNAL_SERVER_ERROR, "session task died").into_response()
        }
    }
}
