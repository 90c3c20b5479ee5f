//! Route definitions and the health handler.

use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use crate::state::AppState;

/// Body of the health response.
#[derive(Serialize)]
struct HealthBody {
    status: &'static str,
    accepting: bool,
    active_sessions: usize,
}

/// Create the service router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .with_state(state)
}

/// Health check: process liveness plus admission headroom.
async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthBody {
        status: "ok",
        accepting: state.orchestrator.is_accepting().await,
        active_sessions: state.orchestrator.active_count().await,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::path::Path;
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use vidferry_core::ports::{
        DeliveryRequest, EngineError, EngineResult, FetchRequest, FetchedArtifact, MediaEngine,
        NoopSessionEmitter, SourceMeta, TransferChannel, TransferResult,
    };
    use vidferry_core::{OrchestratorConfig, SourceUrl};
    use vidferry_pipeline::Orchestrator;

    struct StubEngine;

    #[async_trait]
    impl MediaEngine for StubEngine {
        async fn probe(&self, _url: &SourceUrl) -> EngineResult<SourceMeta> {
            Err(EngineError::unavailable("stub engine"))
        }

        async fn fetch(&self, _request: FetchRequest<'_>) -> EngineResult<FetchedArtifact> {
            Err(EngineError::Cancelled)
        }
    }

    struct StubChannel;

    #[async_trait]
    impl TransferChannel for StubChannel {
        async fn deliver(&self, _request: DeliveryRequest<'_>) -> TransferResult<()> {
            Ok(())
        }
    }

    fn test_state(root: &Path) -> AppState {
        let orchestrator = Orchestrator::new(
            OrchestratorConfig::new(root),
            Arc::new(StubEngine),
            Arc::new(StubChannel),
            Arc::new(NoopSessionEmitter::new()),
        );
        AppState {
            orchestrator: Arc::new(orchestrator),
        }
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, body)
    }

    #[tokio::test]
    async fn test_health_reports_idle_service() {
        let dir = tempfile::tempdir().unwrap();
        let app = create_router(test_state(dir.path()));

        let (status, body) = get_json(app, "/health").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["accepting"], true);
        assert_eq!(body["active_sessions"], 0);
    }

    #[tokio::test]
    async fn test_health_stops_accepting_after_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        state.orchestrator.shutdown().await;

        let (status, body) = get_json(create_router(state), "/health").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["accepting"], false);
    }

    #[tokio::test]
    async fn test_unknown_route_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let app = create_router(test_state(dir.path()));

        let (status, _) = get_json(app, "/nope").await;

        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
