use super::*;
use crate::key::MediaKind;
use crate::orchestrator::test_helpers::{
    PAYLOAD, ScriptedExtractor, create_test_orchestrator, wait_for_settled,
};
use crate::types::JobState;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::Response;
use std::time::Duration;
use tower::ServiceExt;

mod media;

const VIDEO_ID: &str = "dQw4w9WgXcQ";

/// Orchestrator plus router over a scripted extractor
struct TestApp {
    orchestrator: Arc<JobOrchestrator>,
    extractor: Arc<ScriptedExtractor>,
    router: Router,
    _temp_dir: tempfile::TempDir,
}

impl TestApp {
    async fn new(extractor: ScriptedExtractor, tweak: impl FnOnce(&mut Config)) -> Self {
        let extractor = Arc::new(extractor);
        let (orchestrator, temp_dir) = create_test_orchestrator(extractor.clone(), tweak).await;
        let orchestrator = Arc::new(orchestrator);
        let config = Arc::new(orchestrator.config().clone());
        let router = create_router(orchestrator.clone(), config);
        Self {
            orchestrator,
            extractor,
            router,
            _temp_dir: temp_dir,
        }
    }

    async fn succeeding() -> Self {
        Self::new(ScriptedExtractor::succeeding(), |_| {}).await
    }

    async fn get(&self, uri: &str) -> Response {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        self.router.clone().oneshot(request).await.unwrap()
    }

    /// Request extraction and wait until it settles
    async fn completed(&self, kind: MediaKind) {
        let key = self
            .orchestrator
            .request_download(VIDEO_ID, kind)
            .await
            .unwrap();
        assert_eq!(
            wait_for_settled(&self.orchestrator, &key).await.state,
            JobState::Completed
        );
    }
}

async fn body_json(response: Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn test_api_server_spawns() {
    let app = TestApp::succeeding().await;

    let mut config = app.orchestrator.config().clone();
    config.server.api.bind_address = "127.0.0.1:0".parse().unwrap(); // Port 0 = OS assigns a free port
    let config = Arc::new(config);

    let api_handle = tokio::spawn({
        let orchestrator = app.orchestrator.clone();
        async move { start_api_server(orchestrator, config).await }
    });

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!api_handle.is_finished(), "server should still be running");
    api_handle.abort();
}

#[tokio::test]
async fn test_cors_enabled() {
    let app = TestApp::new(ScriptedExtractor::succeeding(), |config| {
        config.server.api.cors_enabled = true;
        config.server.api.cors_origins = vec!["*".to_string()];
    })
    .await;

    let request = Request::builder()
        .uri("/health")
        .header("Origin", "http://localhost:3000")
        .body(Body::empty())
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        response
            .headers()
            .contains_key("access-control-allow-origin"),
        "CORS header should be present"
    );
}

#[tokio::test]
async fn test_cors_disabled() {
    let app = TestApp::new(ScriptedExtractor::succeeding(), |config| {
        config.server.api.cors_enabled = false;
    })
    .await;

    let request = Request::builder()
        .uri("/health")
        .header("Origin", "http://localhost:3000")
        .body(Body::empty())
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();

    assert!(
        !response
            .headers()
            .contains_key("access-control-allow-origin")
    );
}

#[tokio::test]
async fn test_swagger_ui_toggle() {
    let enabled = TestApp::new(ScriptedExtractor::succeeding(), |config| {
        config.server.api.swagger_ui = true;
    })
    .await;
    let status = enabled.get("/swagger-ui/").await.status();
    assert!(status.is_success() || status.is_redirection(), "got {status}");

    let disabled = TestApp::new(ScriptedExtractor::succeeding(), |config| {
        config.server.api.swagger_ui = false;
    })
    .await;
    assert_eq!(
        disabled.get("/swagger-ui/").await.status(),
        StatusCode::NOT_FOUND
    );
}

#[tokio::test]
async fn test_unknown_route_is_404() {
    let app = TestApp::succeeding().await;
    assert_eq!(app.get("/nope").await.status(), StatusCode::NOT_FOUND);
}
