use super::*;

fn keyed(config: &mut Config) {
    config.server.api.api_key = Some("shadwo".to_string());
}

#[tokio::test]
async fn test_song_request_is_accepted() {
    let (extractor, gate) = ScriptedExtractor::succeeding().gated();
    let app = TestApp::new(extractor, |_| {}).await;

    let response = app.get("/song/dQw4w9WgXcQ").await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let json = body_json(response).await;
    assert_eq!(json["video_id"], VIDEO_ID);
    assert_eq!(json["kind"], "audio");
    assert_eq!(json["attempt"], 1);
    assert_eq!(json["status_url"], "/status/dQw4w9WgXcQ?kind=audio");
    assert!(json.get("download").is_none());
    assert!(matches!(json["status"].as_str(), Some("pending" | "running")));

    gate.add_permits(1);
}

#[tokio::test]
async fn test_completed_request_returns_download_link() {
    let app = TestApp::succeeding().await;
    app.completed(MediaKind::Video).await;

    let response = app.get("/video/dQw4w9WgXcQ").await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["status"], "completed");
    assert_eq!(json["kind"], "video");
    assert_eq!(json["download"], "/download/dQw4w9WgXcQ.video.webm");
    assert_eq!(json["format"], "webm");
    assert_eq!(json["size_bytes"], PAYLOAD.len() as u64);
    assert_eq!(app.extractor.calls(), 1);
}

#[tokio::test]
async fn test_repeated_requests_share_one_job() {
    let (extractor, gate) = ScriptedExtractor::succeeding().gated();
    let app = TestApp::new(extractor, |_| {}).await;

    for _ in 0..3 {
        assert_eq!(
            app.get("/song/dQw4w9WgXcQ").await.status(),
            StatusCode::ACCEPTED
        );
    }
    gate.add_permits(1);
    app.completed(MediaKind::Audio).await;

    assert_eq!(app.extractor.calls(), 1);
    assert_eq!(app.orchestrator.list_jobs().await.len(), 1);
}

#[tokio::test]
async fn test_invalid_video_id_is_rejected() {
    let app = TestApp::succeeding().await;

    let response = app.get("/song/not-an-id").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["error"]["code"], "invalid_video_id");

    assert!(app.orchestrator.list_jobs().await.is_empty());
}

#[tokio::test]
async fn test_api_key_required_when_configured() {
    let app = TestApp::new(ScriptedExtractor::succeeding(), keyed).await;

    assert_eq!(
        app.get("/song/dQw4w9WgXcQ").await.status(),
        StatusCode::UNAUTHORIZED
    );
    assert_eq!(
        app.get("/video/dQw4w9WgXcQ?api=wrong").await.status(),
        StatusCode::UNAUTHORIZED
    );
    assert!(app.orchestrator.list_jobs().await.is_empty());

    assert_eq!(
        app.get("/song/dQw4w9WgXcQ?api=shadwo").await.status(),
        StatusCode::ACCEPTED
    );
}

#[tokio::test]
async fn test_api_key_does_not_gate_status_or_download() {
    let app = TestApp::new(ScriptedExtractor::succeeding(), keyed).await;
    app.completed(MediaKind::Audio).await;

    assert_eq!(
        app.get("/status/dQw4w9WgXcQ").await.status(),
        StatusCode::OK
    );
    assert_eq!(
        app.get("/download/dQw4w9WgXcQ.audio.webm").await.status(),
        StatusCode::OK
    );
    assert_eq!(app.get("/health").await.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_requests_rejected_after_shutdown() {
    let app = TestApp::succeeding().await;
    app.orchestrator.shutdown().await.unwrap();

    let response = app.get("/song/dQw4w9WgXcQ").await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body_json(response).await["error"]["code"], "shutting_down");
}
