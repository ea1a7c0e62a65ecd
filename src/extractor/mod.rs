//! Media extraction
//!
//! The orchestrator never talks to the platform itself. It hands an
//! [`ArtifactWriter`] to an [`Extractor`] and gets back either success (a file
//! in the staging directory) or a classified [`ExtractError`].
//!
//! - [`YtDlpExtractor`]: drives the external `yt-dlp` binary
//!
//! ```no_run
//! use tube_dl::extractor::{Extractor, YtDlpExtractor};
//!
//! let extractor = YtDlpExtractor::from_path().expect("yt-dlp not found in PATH");
//! assert_eq!(extractor.name(), "yt-dlp");
//! ```

mod parser;
mod ytdlp;

pub use parser::classify_failure;
pub use ytdlp::YtDlpExtractor;

use crate::key::MediaKind;
use crate::store::ArtifactWriter;
use crate::types::{FailureKind, JobFailure};
use async_trait::async_trait;
use thiserror::Error;

/// Classified extractor failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractError {
    /// The video does not exist, is private, or was removed
    #[error("video not found: {0}")]
    NotFound(String),

    /// The platform throttled us
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// The platform or network failed in a way that may clear up
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// The requested format cannot be produced for this video
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    /// The extractor gave up waiting
    #[error("timed out: {0}")]
    Timeout(String),
}

impl ExtractError {
    /// Failure class recorded on the job
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            ExtractError::NotFound(_) => FailureKind::NotFound,
            ExtractError::RateLimited(_) => FailureKind::RateLimited,
            ExtractError::UpstreamUnavailable(_) => FailureKind::UpstreamUnavailable,
            ExtractError::UnsupportedFormat(_) => FailureKind::UnsupportedFormat,
            ExtractError::Timeout(_) => FailureKind::Timeout,
        }
    }

    /// Detail message without the class prefix
    pub fn message(&self) -> &str {
        match self {
            ExtractError::NotFound(m)
            | ExtractError::RateLimited(m)
            | ExtractError::UpstreamUnavailable(m)
            | ExtractError::UnsupportedFormat(m)
            | ExtractError::Timeout(m) => m,
        }
    }
}

impl From<ExtractError> for JobFailure {
    fn from(error: ExtractError) -> Self {
        JobFailure::new(error.failure_kind(), error.message())
    }
}

/// Something that can fetch a video's audio or video track into a staging directory
///
/// Implementations write one output file into `output.dir()` (conventionally
/// [`ArtifactWriter::file_path`]) and must not commit it; the orchestrator
/// commits after `fetch` returns `Ok`. Fetches may take minutes. The future
/// may be dropped at any point (timeout, eviction, shutdown), so
/// implementations should release external resources on drop.
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Fetch `kind` of `video_id` into `output`
    async fn fetch(
        &self,
        video_id: &str,
        kind: MediaKind,
        output: &ArtifactWriter,
    ) -> Result<(), ExtractError>;

    /// Short name for logs
    fn name(&self) -> &'static str;
}
