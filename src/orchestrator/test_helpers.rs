//! Shared test helpers for creating JobOrchestrator instances in tests.

use crate::config::Config;
use crate::extractor::{ExtractError, Extractor};
use crate::key::MediaKind;
use crate::orchestrator::JobOrchestrator;
use crate::store::ArtifactWriter;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tempfile::tempdir;

/// Bytes every successful scripted fetch writes
pub(crate) const PAYLOAD: &[u8] = b"not really a webm, but close enough";

/// Extractor that replays a script of outcomes and counts calls
///
/// Once the script runs out every call succeeds. With a gate, each call
/// blocks until the test releases a permit.
pub(crate) struct ScriptedExtractor {
    script: std::sync::Mutex<VecDeque<Result<(), ExtractError>>>,
    calls: AtomicU32,
    gate: Option<Arc<tokio::sync::Semaphore>>,
    delay: Option<Duration>,
    panics: AtomicU32,
}

impl ScriptedExtractor {
    pub(crate) fn succeeding() -> Self {
        Self::with_script(Vec::new())
    }

    pub(crate) fn with_script(script: Vec<Result<(), ExtractError>>) -> Self {
        Self {
            script: std::sync::Mutex::new(script.into()),
            calls: AtomicU32::new(0),
            gate: None,
            delay: None,
            panics: AtomicU32::new(0),
        }
    }

    /// Block every call until a permit is added to the returned semaphore
    pub(crate) fn gated(mut self) -> (Self, Arc<tokio::sync::Semaphore>) {
        let gate = Arc::new(tokio::sync::Semaphore::new(0));
        self.gate = Some(gate.clone());
        (self, gate)
    }

    /// Sleep for `delay` inside every call
    pub(crate) fn slow(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Panic inside the first `count` calls
    pub(crate) fn panicking(self, count: u32) -> Self {
        self.panics.store(count, Ordering::SeqCst);
        self
    }

    pub(crate) fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Extractor for ScriptedExtractor {
    async fn fetch(
        &self,
        _video_id: &str,
        _kind: MediaKind,
        output: &ArtifactWriter,
    ) -> Result<(), ExtractError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if self
            .panics
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            panic!("scripted extractor panic");
        }

        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let next = self.script.lock().unwrap().pop_front().unwrap_or(Ok(()));
        next?;

        tokio::fs::write(output.file_path("webm"), PAYLOAD)
            .await
            .unwrap();
        Ok(())
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// Config rooted in `dir` with fast retries
pub(crate) fn test_config(dir: &std::path::Path) -> Config {
    let mut config = Config::default();
    config.download.download_dir = dir.join("downloads");
    config.retry.initial_delay = Duration::from_millis(5);
    config.retry.max_delay = Duration::from_millis(20);
    config.retry.jitter = false;
    config
}

/// Helper to create a test JobOrchestrator over `extractor`.
/// Returns the orchestrator and the tempdir (which must be kept alive).
pub(crate) async fn create_test_orchestrator(
    extractor: Arc<ScriptedExtractor>,
    tweak: impl FnOnce(&mut Config),
) -> (JobOrchestrator, tempfile::TempDir) {
    let temp_dir = tempdir().unwrap();
    let mut config = test_config(temp_dir.path());
    tweak(&mut config);

    let orchestrator = JobOrchestrator::new(config, extractor).await.unwrap();
    (orchestrator, temp_dir)
}

/// Poll until the job for `key` reaches a terminal state, or panic after 5s
pub(crate) async fn wait_for_settled(
    orchestrator: &JobOrchestrator,
    key: &crate::key::JobKey,
) -> crate::types::JobStatus {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let status = orchestrator.get_status(key).await.unwrap();
            if !status.state.is_active() {
                return status;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("job did not settle within 5s")
}

/// Poll until `key` is in `state`, or panic after 5s
pub(crate) async fn wait_for_state(
    orchestrator: &JobOrchestrator,
    key: &crate::key::JobKey,
    state: crate::types::JobState,
) {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if orchestrator.get_status(key).await.unwrap().state == state {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("job never reached {state}"));
}
