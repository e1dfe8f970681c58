use axum::Router;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::state::SharedState;

/// Swagger UI and the OpenAPI document.
pub mod docs;
/// Health check endpoint.
pub mod health;
/// Read-only room endpoints.
pub mod rooms;
/// Game WebSocket endpoint.
pub mod websocket;

/// Compose all route trees and attach cross-cutting middleware layers.
pub fn router(state: SharedState) -> Router<()> {
    health::router()
        .merge(rooms::router())
        .merge(websocket::router())
        .merge(docs::router())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use axum::{
        body::{Body, to_bytes},
        http::{Request, StatusCode},
    };
    use tower::ServiceExt;

    use super::*;
    use crate::{config::AppConfig, state::AppState};

    async fn get(path: &str) -> (StatusCode, serde_json::Value) {
        let app = router(AppState::new(AppConfig::default()));
        let response = app
            .oneshot(Request::get(path).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, body)
    }

    #[tokio::test]
    async fn healthcheck_reports_degraded_without_storage() {
        let (status, body) = get("/healthcheck").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "degraded");
    }

    #[tokio::test]
    async fn unknown_room_is_a_404_with_message() {
        let (status, body) = get(&format!("/rooms/{}", uuid::Uuid::new_v4())).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["message"].as_str().unwrap().contains("not found"));
    }

    #[tokio::test]
    async fn room_listing_starts_empty() {
        let (status, body) = get("/rooms").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["rooms"], serde_json::json!([]));
    }
}
