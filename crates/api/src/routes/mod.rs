//! API routes

pub mod health;
pub mod presence;

use axum::{http::Method, routing::get, Router};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{signaling::ws_handler, state::AppState};

/// Create all routes
pub fn create_router(state: AppState) -> Router {
    // Health check routes (at root level for infrastructure monitoring)
    let health_routes = Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness));

    // Read-only diagnostics for presence and call rooms - under /api/v1
    let api_v1_routes = Router::new()
        .route("/presence/online", get(presence::list_online))
        .route("/presence/:user_id", get(presence::user_presence))
        .route("/signaling/stats", get(presence::signaling_stats))
        .route("/signaling/rooms/:room_id", get(presence::room_snapshot));

    // WebSocket route (identity taken from the userId query parameter)
    let websocket_routes = Router::new().route("/ws", get(ws_handler));

    let cors = CorsLayer::new()
        .allow_origin(state.config.client_origin.clone())
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
        .allow_credentials(true);

    Router::new()
        .merge(health_routes)
        .merge(websocket_routes)
        .nest("/api/v1", api_v1_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, LogFormat};
    use axum::body::{to_bytes, Body};
    use axum::http::{HeaderValue, Request, StatusCode};
    use carelink_shared::UserId;
    use tokio::sync::mpsc;
    use tower::ServiceExt;

    fn test_state() -> AppState {
        let config = Config {
            bind_address: "127.0.0.1:0".to_string(),
            client_origin: HeaderValue::from_static("http://localhost:5173"),
            database_url: None,
            database_max_connections: 1,
            run_migrations: false,
            room_evict_on_disconnect: true,
            log_format: LogFormat::Pretty,
        };
        AppState::new(config, None)
    }

    async fn get_json(router: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = router
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    #[tokio::test]
    async fn test_health_without_database() {
        let (status, body) = get_json(create_router(test_state()), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["database"], "disabled");

        let (status, _) = get_json(create_router(test_state()), "/health/ready").await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_presence_routes() {
        let state = test_state();
        let user_id = UserId::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        state.signaling.connect(Some(user_id), tx).await;

        let (status, body) =
            get_json(create_router(state.clone()), "/api/v1/presence/online").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["users"], serde_json::json!([user_id.to_string()]));

        let uri = format!("/api/v1/presence/{user_id}");
        let (status, body) = get_json(create_router(state.clone()), &uri).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["isOnline"], true);

        let (status, body) =
            get_json(create_router(state.clone()), "/api/v1/presence/not-a-uuid").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "BAD_REQUEST");

        let (status, body) = get_json(create_router(state), "/api/v1/signaling/stats").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["activeConnections"], 1);
        assert_eq!(body["onlineUsers"], 1);
    }

    #[tokio::test]
    async fn test_unknown_room_is_not_found() {
        let (status, _) =
            get_json(create_router(test_state()), "/api/v1/signaling/rooms/nope").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
