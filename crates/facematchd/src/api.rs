//! Axum HTTP routes.

use crate::dto::{DetectRequest, DetectResponse, HealthResponse, RecognizeRequest, RecognizeResponse};
use crate::service::FaceService;
use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use facematch_chat::{ChatEngine, ChatError, ChatReply, ChatRequest};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Application state shared across handlers.
pub struct AppState {
    pub faces: FaceService,
    pub chat: ChatEngine,
}

pub fn create_router(state: Arc<AppState>, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/detect", post(detect_handler))
        .route("/recognize", post(recognize_handler))
        .route("/chat", post(chat_handler))
        .route("/health", get(health_handler))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn status_for(error: &Option<String>) -> StatusCode {
    if error.is_some() {
        StatusCode::INTERNAL_SERVER_ERROR
    } else {
        StatusCode::OK
    }
}

// Bodies are parsed by hand so malformed JSON still gets the route's JSON shape.

async fn detect_handler(State(state): State<Arc<AppState>>, body: Bytes) -> (StatusCode, Json<DetectResponse>) {
    let request: DetectRequest = match serde_json::from_slice(&body) {
        Ok(r) => r,
        Err(e) => {
            tracing::warn!(error = %e, "malformed detect request");
            return (StatusCode::BAD_REQUEST, Json(DetectResponse::failure(format!("invalid request: {e}"), 0)));
        }
    };
    let response = state.faces.detect(&request).await;
    (status_for(&response.error), Json(response))
}

async fn recognize_handler(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> (StatusCode, Json<RecognizeResponse>) {
    let request: RecognizeRequest = match serde_json::from_slice(&body) {
        Ok(r) => r,
        Err(e) => {
            tracing::warn!(error = %e, "malformed recognize request");
            return (
                StatusCode::BAD_REQUEST,
                Json(RecognizeResponse::failure(format!("invalid request: {e}"), Vec::new(), 0)),
            );
        }
    };
    let response = state.faces.recognize(&request).await;
    (status_for(&response.error), Json(response))
}

async fn chat_handler(State(state): State<Arc<AppState>>, body: Bytes) -> (StatusCode, Json<ChatReply>) {
    let request: ChatRequest = match serde_json::from_slice(&body) {
        Ok(r) => r,
        Err(e) => {
            tracing::warn!(error = %e, "malformed chat request");
            return (StatusCode::BAD_REQUEST, Json(ChatReply::failure(format!("invalid request: {e}"))));
        }
    };

    match state.chat.answer(&request).await {
        Ok(reply) => (StatusCode::OK, Json(reply)),
        Err(e @ ChatError::EmptyMessage) => (StatusCode::BAD_REQUEST, Json(ChatReply::failure(e))),
        Err(e) => {
            tracing::error!(error = %e, "chat failed");
            (StatusCode::INTERNAL_SERVER_ERROR, Json(ChatReply::failure(e)))
        }
    }
}

async fn health_handler(State(state): State<Arc<AppState>>) -> (StatusCode, Json<HealthResponse>) {
    if state.faces.engine_running() {
        (StatusCode::OK, Json(HealthResponse::healthy()))
    } else {
        tracing::error!("engine thread is gone");
        (StatusCode::SERVICE_UNAVAILABLE, Json(HealthResponse::unhealthy()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::tests::{wait_for_exit, FixedExtractor, PanickingExtractor};
    use crate::service::tests::{png_payload, service_with};
    use async_trait::async_trait;
    use facematch_chat::{ChatSettings, Document, Responder};
    use serde_json::json;

    struct EchoResponder;

    #[async_trait]
    impl Responder for EchoResponder {
        async fn respond(&self, question: &str, _context: &[&Document]) -> Result<String, ChatError> {
            Ok(format!("echo: {question}"))
        }
    }

    fn state(extractor: impl facematch_core::DescriptorExtractor + Send + 'static) -> Arc<AppState> {
        Arc::new(AppState {
            faces: service_with(extractor),
            chat: ChatEngine::new(Arc::new(EchoResponder), ChatSettings::default()),
        })
    }

    fn body(value: serde_json::Value) -> Bytes {
        Bytes::from(value.to_string())
    }

    #[tokio::test]
    async fn test_detect_ok() {
        let (status, Json(response)) = detect_handler(
            State(state(FixedExtractor::one_face(vec![0.5, 0.5]))),
            body(json!({"imageData": png_payload()})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(response.count, 1);
        assert_eq!(response.faces[0].encoding, vec![0.5, 0.5]);
        assert!((response.faces[0].confidence - 0.93).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_detect_extractor_failure_is_500_with_body() {
        let (status, Json(response)) = detect_handler(
            State(state(FixedExtractor::failing())),
            body(json!({"imageData": png_payload()})),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(response.error.is_some());
        assert_eq!(response.count, 0);
    }

    #[tokio::test]
    async fn test_malformed_json_is_400_with_body() {
        let (status, Json(response)) = recognize_handler(
            State(state(FixedExtractor::one_face(vec![0.0]))),
            Bytes::from_static(b"{not json"),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(response.error.unwrap().starts_with("invalid request"));
    }

    #[tokio::test]
    async fn test_zero_faces_is_200_without_error() {
        let extractor = FixedExtractor {
            faces: Vec::new(),
            fail: false,
        };
        let (status, Json(response)) = recognize_handler(
            State(state(extractor)),
            body(json!({"image_data": png_payload(), "known_faces": []})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(response.count, 0);
        assert!(response.detections.is_empty());
        assert!(response.error.is_none());
    }

    #[tokio::test]
    async fn test_chat_routes() {
        let app = state(FixedExtractor::one_face(vec![0.0]));

        let (status, Json(reply)) = chat_handler(State(app.clone()), body(json!({"message": ""}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(reply.error.as_deref(), Some("No message provided"));

        let (status, Json(reply)) = chat_handler(
            State(app),
            body(json!({
                "message": "Who came in today?",
                "context": {"recentEvents": [
                    {"personName": "Alice", "confidence": 95, "detectedAt": "2025-03-10T09:00:00Z", "isRecognized": true}
                ]}
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(reply.answer.as_deref(), Some("echo: Who came in today?"));
    }

    #[tokio::test]
    async fn test_health() {
        let (status, Json(health)) = health_handler(State(state(FixedExtractor::one_face(vec![0.0])))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(health.status, "healthy");
        assert_eq!(health.service, "face_recognition");
        assert_eq!(health.version, env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn test_health_reports_dead_engine() {
        let app = state(PanickingExtractor);
        let (status, Json(response)) =
            detect_handler(State(app.clone()), body(json!({"imageData": png_payload()}))).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.error.as_deref(), Some("engine thread exited"));

        wait_for_exit(|| app.faces.engine_running()).await;
        let (status, Json(health)) = health_handler(State(app)).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(health.status, "unhealthy");
    }
}
