//! Extractor backed by the external yt-dlp binary

use super::parser::classify_failure;
use super::{ExtractError, Extractor};
use crate::config::ExtractorConfig;
use crate::error::{Error, Result};
use crate::key::MediaKind;
use crate::store::ArtifactWriter;
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

/// Default format selector for audio jobs
pub const DEFAULT_AUDIO_FORMAT: &str = "bestaudio";

/// Default format selector for video jobs
pub const DEFAULT_VIDEO_FORMAT: &str = "best[height<=720]";

/// Runs `yt-dlp` once per fetch
///
/// The child is spawned with `kill_on_drop`, so dropping the fetch future
/// (timeout, eviction, shutdown) terminates the download.
///
/// # Examples
///
/// ```no_run
/// use tube_dl::extractor::YtDlpExtractor;
/// use std::path::PathBuf;
///
/// // Explicit path
/// let extractor = YtDlpExtractor::new(PathBuf::from("/usr/local/bin/yt-dlp"));
///
/// // Or auto-discover from PATH
/// let extractor = YtDlpExtractor::from_path().expect("yt-dlp not found in PATH");
/// ```
#[derive(Debug, Clone)]
pub struct YtDlpExtractor {
    binary_path: PathBuf,
    audio_format: String,
    video_format: String,
}

impl YtDlpExtractor {
    /// Create an extractor with an explicit binary path and default formats
    pub fn new(binary_path: PathBuf) -> Self {
        Self {
            binary_path,
            audio_format: DEFAULT_AUDIO_FORMAT.to_string(),
            video_format: DEFAULT_VIDEO_FORMAT.to_string(),
        }
    }

    /// Attempt to find yt-dlp in PATH
    pub fn from_path() -> Option<Self> {
        which::which("yt-dlp").ok().map(Self::new)
    }

    /// Build from config: explicit path first, then PATH search if allowed
    pub fn from_config(config: &ExtractorConfig) -> Result<Self> {
        let binary_path = match (&config.ytdlp_path, config.search_path) {
            (Some(path), _) => path.clone(),
            (None, true) => which::which("yt-dlp").map_err(|e| {
                Error::NotSupported(format!("yt-dlp binary not found in PATH: {e}"))
            })?,
            (None, false) => {
                return Err(Error::NotSupported(
                    "yt-dlp path not configured and PATH search disabled".to_string(),
                ));
            }
        };

        Ok(Self::new(binary_path).with_formats(&config.audio_format, &config.video_format))
    }

    /// Override the format selectors
    pub fn with_formats(mut self, audio: &str, video: &str) -> Self {
        self.audio_format = audio.to_string();
        self.video_format = video.to_string();
        self
    }

    /// Path of the binary this extractor runs
    pub fn binary_path(&self) -> &Path {
        &self.binary_path
    }

    /// Format selector used for `kind`
    pub fn format_for(&self, kind: MediaKind) -> &str {
        match kind {
            MediaKind::Audio => &self.audio_format,
            MediaKind::Video => &self.video_format,
        }
    }

    /// Command-line arguments for one fetch into `dir`
    pub fn build_args(&self, video_id: &str, kind: MediaKind, dir: &Path) -> Vec<OsString> {
        let mut template = dir.as_os_str().to_os_string();
        template.push(std::path::MAIN_SEPARATOR_STR);
        template.push("media.%(ext)s");

        vec![
            "--quiet".into(),
            "--no-warnings".into(),
            "--no-playlist".into(),
            "--no-progress".into(),
            "-f".into(),
            self.format_for(kind).into(),
            "-o".into(),
            template,
            watch_url(video_id).into(),
        ]
    }
}

/// Canonical watch URL for a video id
pub fn watch_url(video_id: &str) -> String {
    format!("https://www.youtube.com/watch?v={video_id}")
}

#[async_trait]
impl Extractor for YtDlpExtractor {
    async fn fetch(
        &self,
        video_id: &str,
        kind: MediaKind,
        output: &ArtifactWriter,
    ) -> std::result::Result<(), ExtractError> {
        tracing::debug!(
            video_id,
            kind = %kind,
            format = self.format_for(kind),
            binary = %self.binary_path.display(),
            "Running yt-dlp"
        );

        let result = Command::new(&self.binary_path)
            .args(self.build_args(video_id, kind, output.dir()))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                ExtractError::UpstreamUnavailable(format!("Failed to execute yt-dlp: {e}"))
            })?;

        if result.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&result.stderr);
        let error = classify_failure(&stderr);
        tracing::debug!(
            video_id,
            kind = %kind,
            exit_code = ?result.status.code(),
            error = %error,
            "yt-dlp failed"
        );
        Err(error)
    }

    fn name(&self) -> &'static str {
        "yt-dlp"
    }
}
