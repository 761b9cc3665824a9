//! kwp-api - HTTP control and push-stream layer for the K-Line bridge
//!
//! This crate serves the control endpoints and the SSE push stream on top
//! of any [`SessionControl`](kwp_core::SessionControl) implementation and a
//! [`BroadcastHub`](kwp_core::BroadcastHub).
//!
//! # Usage
//!
//! ```ignore
//! use kwp_api::{create_router, AppState};
//!
//! let state = AppState::new(Arc::new(manager), hub);
//! let router = create_router(state, Some(Path::new("web")));
//! ```
//!
//! # Endpoints
//!
//! | Method | Path              | Body                                   |
//! |--------|-------------------|----------------------------------------|
//! | POST   | `/api/start?port` | `{"ok":true}` or `{"error":"missing port"}` |
//! | POST   | `/api/stop`       | `{"ok":true}`                          |
//! | GET    | `/api/ports`      | `[{"port":..,"description":..}]`       |
//! | GET    | `/api/status`     | session state, port, ECU, viewers      |
//! | GET    | `/api/stream`     | SSE, one `{"type","text"}` per event   |
//! | GET    | `/health`         | `OK`                                   |

pub mod error;
pub mod handlers;
pub mod state;

pub use error::ApiError;
pub use state::AppState;

use std::path::Path;

use axum::routing::{any, get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

/// Create the bridge router
///
/// With `static_dir`, every path outside `/api` and `/health` is served from
/// that directory (`/` maps to `index.html`).
pub fn create_router(state: AppState, static_dir: Option<&Path>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let router = Router::new()
        // Health check
        .route("/health", get(|| async { "OK" }))
        // Control routes
        .route("/api/start", post(handlers::control::start_session))
        .route("/api/stop", post(handlers::control::stop_session))
        .route("/api/ports", get(handlers::ports::list_ports))
        .route("/api/status", get(handlers::status::get_status))
        // Push stream
        .route("/api/stream", get(handlers::stream::stream_events))
        .route("/api/{*path}", any(handlers::not_found));

    let router = match static_dir {
        Some(dir) => router.fallback_service(ServeDir::new(dir)),
        None => router.fallback(handlers::not_found),
    };

    router
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use futures::StreamExt;
    use kwp_core::{
        BridgeResult, BroadcastHub, PortInfo, SessionControl, SessionState, SessionStatus,
        StreamEvent,
    };
    use parking_lot::Mutex;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;

    /// Records control calls instead of talking to an ECU
    #[derive(Default)]
    struct RecordingSession {
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl SessionControl for RecordingSession {
        async fn start(&self, port: &str) -> BridgeResult<()> {
            self.calls.lock().push(format!("start {}", port));
            Ok(())
        }

        async fn stop(&self) -> BridgeResult<()> {
            self.calls.lock().push("stop".to_string());
            Ok(())
        }

        fn status(&self) -> SessionStatus {
            SessionStatus {
                state: SessionState::Streaming,
                port: Some("/dev/ttyUSB0".to_string()),
                ecu: Some("SIMK43 8mbit".to_string()),
                started_at: None,
            }
        }

        async fn list_ports(&self) -> BridgeResult<Vec<PortInfo>> {
            Ok(vec![PortInfo::new("/dev/ttyUSB0", "USB-Serial")])
        }
    }

    fn setup() -> (Arc<RecordingSession>, BroadcastHub, Router) {
        let session = Arc::new(RecordingSession::default());
        let hub = BroadcastHub::new(StreamEvent::line("HELLO {}"), 16);
        let router = create_router(AppState::new(session.clone(), hub.clone()), None);
        (session, hub, router)
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post(uri: &str) -> Request<Body> {
        Request::post(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_start_requires_port() {
        let (session, _hub, router) = setup();

        for uri in ["/api/start", "/api/start?port="] {
            let response = router.clone().oneshot(post(uri)).await.unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
            assert_eq!(json_body(response).await, json!({"error": "missing port"}));
        }
        assert!(session.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn test_start_and_stop() {
        let (session, _hub, router) = setup();

        let response = router
            .clone()
            .oneshot(post("/api/start?port=%2Fdev%2FttyUSB1"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await, json!({"ok": true}));

        let response = router.oneshot(post("/api/stop")).await.unwrap();
        assert_eq!(json_body(response).await, json!({"ok": true}));

        assert_eq!(
            *session.calls.lock(),
            vec!["start /dev/ttyUSB1".to_string(), "stop".to_string()]
        );
    }

    #[tokio::test]
    async fn test_list_ports() {
        let (_session, _hub, router) = setup();
        let response = router
            .oneshot(Request::get("/api/ports").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(
            json_body(response).await,
            json!([{"port": "/dev/ttyUSB0", "description": "USB-Serial"}])
        );
    }

    #[tokio::test]
    async fn test_status() {
        let (_session, hub, router) = setup();
        let _viewer = hub.subscribe();

        let response = router
            .oneshot(Request::get("/api/status").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(
            json_body(response).await,
            json!({
                "state": "streaming",
                "port": "/dev/ttyUSB0",
                "ecu": "SIMK43 8mbit",
                "subscribers": 1
            })
        );
    }

    #[tokio::test]
    async fn test_health_and_unknown_routes() {
        let (_session, _hub, router) = setup();

        let response = router
            .clone()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = router
            .oneshot(Request::get("/api/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(json_body(response).await, json!({"error": "not found"}));
    }

    #[tokio::test]
    async fn test_stream_starts_with_schema() {
        let (_session, hub, router) = setup();

        let response = router
            .oneshot(Request::get("/api/stream").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["content-type"], "text/event-stream");
        assert_eq!(hub.subscriber_count(), 1);

        hub.log("Logging..");
        let mut body = response.into_body().into_data_stream();
        let mut text = String::new();
        while !text.contains("Logging..") {
            let chunk = body.next().await.unwrap().unwrap();
            text.push_str(std::str::from_utf8(&chunk).unwrap());
        }

        assert_eq!(
            text,
            "data: {\"type\":\"line\",\"text\":\"HELLO {}\"}\n\n\
             data: {\"type\":\"log\",\"text\":\"Logging..\"}\n\n"
        );

        drop(body);
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_static_fallback() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.html"), "<html>bridge</html>").unwrap();

        let session = Arc::new(RecordingSession::default());
        let hub = BroadcastHub::new(StreamEvent::line("HELLO {}"), 16);
        let router = create_router(AppState::new(session, hub), Some(dir.path()));

        let response = router
            .clone()
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"<html>bridge</html>");

        let response = router
            .oneshot(Request::get("/missing.js").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
