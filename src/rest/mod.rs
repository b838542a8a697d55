// rest/mod.rs — the daemon's HTTP surface.
//
// Endpoints:
//   POST /rpc      — JSON-RPC bridge into the connection pool
//   GET  /healthz  — latest stats snapshot, 503 until the first one exists
//   GET  /         — static HTML test form (manual testing only)

pub mod routes;

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::{
    routing::{get, post},
    Router,
};
use tracing::info;

use crate::AppContext;

pub fn build_router(ctx: Arc<AppContext>) -> Router {
    Router::new()
        .route("/rpc", post(routes::rpc::rpc))
        .route("/healthz", get(routes::health::healthz))
        .route("/", get(routes::form::form))
        .with_state(ctx)
}

/// Bind the listener and serve until `shutdown` resolves.
pub async fn serve(
    ctx: Arc<AppContext>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let bind = format!(
        "{}:{}",
        ctx.config.receiver_host, ctx.config.receiver_port
    );
    let addr: SocketAddr = bind.parse()?;

    let router = build_router(ctx);

    info!("server started at http://{addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DaemonConfig;
    use crate::stats::Stats;
    use crate::testutil::FakeTransport;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn make_ctx() -> (Arc<AppContext>, Arc<FakeTransport>) {
        let transport = FakeTransport::new();
        let ctx = AppContext::new(
            Arc::new(DaemonConfig::default()),
            transport.clone(),
            Arc::new(crate::rpc::LightningCodec::new()),
        );
        (ctx, transport)
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn rpc_request(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/rpc")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn rpc_round_trip_populates_keys() {
        let (ctx, _) = make_ctx();
        let body = json!({
            "Connection": {
                "Mailbox": "mailbox.example.org:443",
                "PairingPhrase": "alpha bravo charlie",
                "LocalKey": "",
                "RemoteKey": ""
            },
            "Method": "lnrpc.Lightning.AddInvoice",
            "Payload": "{\"memo\":\"test\",\"value\":1000}"
        });

        let response = build_router(ctx)
            .oneshot(rpc_request(&body.to_string()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()["content-type"],
            "application/json"
        );

        let reply = body_json(response).await;
        let conn = &reply["Connection"];
        assert_eq!(conn["Mailbox"], "mailbox.example.org:443");
        assert_eq!(conn["LocalKey"].as_str().unwrap().len(), 64);
        assert_eq!(conn["RemoteKey"].as_str().unwrap().len(), 64);
        assert!(reply["Result"].is_string());
    }

    #[tokio::test]
    async fn non_post_rpc_is_405() {
        let (ctx, _) = make_ctx();
        let response = build_router(ctx)
            .oneshot(
                Request::builder()
                    .method("GET")
                    .uri("/rpc")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn malformed_body_is_400() {
        let (ctx, _) = make_ctx();
        let response = build_router(ctx)
            .oneshot(rpc_request("this is not json"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn failed_action_is_500_with_error_text() {
        let (ctx, transport) = make_ctx();
        transport.fail_next_handshake();
        let body = json!({
            "Connection": {
                "Mailbox": "mailbox.example.org:443",
                "PairingPhrase": "alpha bravo charlie"
            },
            "Method": "lnrpc.Lightning.GetInfo",
            "Payload": "{}"
        });

        let response = build_router(ctx)
            .oneshot(rpc_request(&body.to_string()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert!(String::from_utf8_lossy(&bytes).contains("handshake failed"));
    }

    #[tokio::test]
    async fn health_reports_starting_then_ok() {
        let (ctx, _) = make_ctx();

        let response = build_router(ctx.clone())
            .oneshot(
                Request::builder().uri("/healthz").body(Body::empty()).unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let reply = body_json(response).await;
        assert_eq!(reply["status"], "FAIL");
        assert_eq!(reply["message"], "starting");

        ctx.stats.publish(Stats::default());
        let response = build_router(ctx)
            .oneshot(
                Request::builder().uri("/healthz").body(Body::empty()).unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let reply = body_json(response).await;
        assert_eq!(reply["status"], "OK");
        assert_eq!(reply["Stats"]["NumConnections"], 0);
    }

    #[tokio::test]
    async fn root_serves_the_test_form() {
        let (ctx, _) = make_ctx();
        let response = build_router(ctx)
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers()["content-type"]
            .to_str()
            .unwrap()
            .starts_with("text/html"));
    }
}
