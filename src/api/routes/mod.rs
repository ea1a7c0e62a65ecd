//! Route handlers for the REST API
//!
//! Handlers are organized by concern:
//! - [`media`] - `/song/{id}` and `/video/{id}` extraction requests
//! - [`status`] - Job status polling
//! - [`download`] - Artifact streaming
//! - [`system`] - Index, health, jobs, events, OpenAPI

use crate::key::MediaKind;
use crate::types::{JobFailure, JobState, JobStatus};
use serde::{Deserialize, Serialize};

mod download;
mod media;
mod status;
mod system;

pub use download::*;
pub use media::*;
pub use status::*;
pub use system::*;

// ============================================================================
// Query/Response Types (shared across handlers)
// ============================================================================

/// Query parameters for GET /status/:video_id
#[derive(Debug, Deserialize, Serialize, utoipa::IntoParams, utoipa::ToSchema)]
#[into_params(parameter_in = Query)]
pub struct StatusQuery {
    /// `audio` (or `song`) / `video`; omitted means the most recent job for the video
    pub kind: Option<String>,
}

/// Job view returned by the media and status endpoints
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct JobResponse {
    /// Job state
    pub status: JobState,
    /// Video id
    pub video_id: String,
    /// Media kind
    pub kind: MediaKind,
    /// Attempt number
    pub attempt: u32,
    /// Where to poll for progress
    pub status_url: String,
    /// Failure detail (failed jobs only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JobFailure>,
    /// Artifact size (completed jobs only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
    /// Artifact file name (completed jobs only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    /// Container format, the artifact's extension (completed jobs only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    /// Download link (completed jobs only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download: Option<String>,
}

impl From<JobStatus> for JobResponse {
    fn from(status: JobStatus) -> Self {
        let format = status
            .file_name
            .as_deref()
            .and_then(|name| name.rsplit_once('.'))
            .map(|(_, ext)| ext.to_string());
        let download = status
            .file_name
            .as_deref()
            .map(|name| format!("/download/{name}"));

        Self {
            status_url: format!("/status/{}?kind={}", status.video_id, status.kind),
            status: status.state,
            video_id: status.video_id,
            kind: status.kind,
            attempt: status.attempt,
            error: status.error,
            size_bytes: status.size_bytes,
            filename: status.file_name,
            format,
            download,
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn status(state: JobState, file_name: Option<&str>) -> JobStatus {
        JobStatus {
            video_id: "dQw4w9WgXcQ".to_string(),
            kind: MediaKind::Audio,
            state,
            attempt: 1,
            error: None,
            size_bytes: file_name.map(|_| 3),
            file_name: file_name.map(str::to_string),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            waiters: 0,
            attempts: Vec::new(),
        }
    }

    #[test]
    fn completed_job_has_download_link_and_format() {
        let response = JobResponse::from(status(
            JobState::Completed,
            Some("dQw4w9WgXcQ.audio.m4a"),
        ));
        assert_eq!(
            response.download.as_deref(),
            Some("/download/dQw4w9WgXcQ.audio.m4a")
        );
        assert_eq!(response.format.as_deref(), Some("m4a"));
        assert_eq!(response.status_url, "/status/dQw4w9WgXcQ?kind=audio");
    }

    #[test]
    fn pending_job_omits_artifact_fields() {
        let json = serde_json::to_value(JobResponse::from(status(JobState::Pending, None))).unwrap();
        assert_eq!(json["status"], "pending");
        assert!(json.get("download").is_none());
        assert!(json.get("filename").is_none());
        assert!(json.get("error").is_none());
    }
}
