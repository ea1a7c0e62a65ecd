//! Fake extractors and orchestrator builders

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tempfile::TempDir;
use tube_dl::store::ArtifactWriter;
use tube_dl::{Config, ExtractError, Extractor, JobOrchestrator, MediaKind};

/// Bytes the fake extractor writes for every successful fetch
pub const MEDIA_BYTES: &[u8] = b"\x1aE\xdf\xa3 pretend this is a webm";

/// A well-formed video id
pub const VIDEO_ID: &str = "dQw4w9WgXcQ";

/// Extractor that fails the first `failures` calls with `error`, then succeeds
pub struct FlakyExtractor {
    failures: u32,
    error: ExtractError,
    calls: AtomicU32,
}

impl FlakyExtractor {
    pub fn reliable() -> Self {
        Self::failing(0, ExtractError::UpstreamUnavailable(String::new()))
    }

    pub fn failing(failures: u32, error: ExtractError) -> Self {
        Self {
            failures,
            error,
            calls: AtomicU32::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Extractor for FlakyExtractor {
    async fn fetch(
        &self,
        _video_id: &str,
        kind: MediaKind,
        output: &ArtifactWriter,
    ) -> Result<(), ExtractError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        // Slow enough that concurrent requests overlap
        tokio::time::sleep(Duration::from_millis(20)).await;
        if call < self.failures {
            return Err(self.error.clone());
        }

        let ext = match kind {
            MediaKind::Audio => "m4a",
            MediaKind::Video => "mp4",
        };
        tokio::fs::write(output.file_path(ext), MEDIA_BYTES)
            .await
            .map_err(|e| ExtractError::UpstreamUnavailable(e.to_string()))
    }

    fn name(&self) -> &'static str {
        "flaky"
    }
}

/// Config rooted in `dir` with millisecond retry delays
pub fn test_config(dir: &Path) -> Config {
    let mut config = Config::default();
    config.download.download_dir = dir.join("downloads");
    config.retry.initial_delay = Duration::from_millis(5);
    config.retry.max_delay = Duration::from_millis(20);
    config.retry.jitter = false;
    config
}

/// Orchestrator over `extractor` in a fresh temp dir (keep the TempDir alive)
pub async fn create_orchestrator(
    extractor: Arc<dyn Extractor>,
    tweak: impl FnOnce(&mut Config),
) -> (JobOrchestrator, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let mut config = test_config(temp_dir.path());
    tweak(&mut config);
    let orchestrator = JobOrchestrator::new(config, extractor).await.unwrap();
    (orchestrator, temp_dir)
}

/// Write an executable `yt-dlp` stand-in that runs `body` as a shell script
///
/// The script sees the real yt-dlp arguments in `$@`.
#[cfg(unix)]
pub fn write_stub_ytdlp(dir: &Path, body: &str) -> std::path::PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join("yt-dlp");
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}
