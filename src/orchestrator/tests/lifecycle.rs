use super::*;

#[tokio::test]
async fn shutdown_rejects_new_requests() {
    let extractor = Arc::new(ScriptedExtractor::succeeding());
    let (orchestrator, _temp) = create_test_orchestrator(extractor, |_| {}).await;

    orchestrator.shutdown().await.unwrap();

    assert!(!orchestrator.is_accepting());
    assert!(matches!(
        orchestrator
            .request_download(VIDEO_ID, MediaKind::Audio)
            .await,
        Err(Error::ShuttingDown)
    ));
}

#[tokio::test]
async fn shutdown_cancels_running_attempts() {
    let (extractor, _gate) = ScriptedExtractor::succeeding().gated();
    let (orchestrator, _temp) = create_test_orchestrator(Arc::new(extractor), |_| {}).await;
    let mut events = orchestrator.subscribe();

    let key = orchestrator
        .request_download(VIDEO_ID, MediaKind::Audio)
        .await
        .unwrap();
    wait_for_state(&orchestrator, &key, JobState::Running).await;

    tokio::time::timeout(Duration::from_secs(5), orchestrator.shutdown())
        .await
        .expect("shutdown should not wait for the gate")
        .unwrap();

    let status = orchestrator.get_status(&key).await.unwrap();
    assert_eq!(status.state, JobState::Failed);
    assert!(!orchestrator.store().exists(&key));

    let mut saw_shutdown = false;
    while let Ok(event) = events.try_recv() {
        saw_shutdown |= matches!(event, Event::Shutdown);
    }
    assert!(saw_shutdown);
}

#[tokio::test]
async fn shutdown_fails_queued_jobs_waiting_for_a_slot() {
    let (extractor, _gate) = ScriptedExtractor::succeeding().gated();
    let (orchestrator, _temp) = create_test_orchestrator(Arc::new(extractor), |config| {
        config.download.max_concurrent_jobs = 1;
    })
    .await;

    let running = orchestrator
        .request_download(VIDEO_ID, MediaKind::Audio)
        .await
        .unwrap();
    let queued = orchestrator
        .request_download(VIDEO_ID, MediaKind::Video)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    orchestrator.shutdown().await.unwrap();

    for key in [running, queued] {
        assert_eq!(
            orchestrator.get_status(&key).await.unwrap().state,
            JobState::Failed
        );
    }
}

#[tokio::test]
async fn retention_task_stops_on_shutdown() {
    let extractor = Arc::new(ScriptedExtractor::succeeding());
    let (orchestrator, _temp) = create_test_orchestrator(extractor, |config| {
        config.retention.sweep_interval = Duration::from_millis(10);
    })
    .await;

    let task = orchestrator.spawn_retention_task();
    tokio::time::sleep(Duration::from_millis(30)).await;
    orchestrator.shutdown().await.unwrap();

    tokio::time::timeout(Duration::from_secs(1), task)
        .await
        .expect("retention task should exit")
        .unwrap();
}
