//! Artifact download handler.

use crate::api::AppState;
use crate::error::Error;
use axum::{
    body::Body,
    extract::{Path, State},
    http::{StatusCode, header},
    response::Response,
};

/// GET /download/:filename - Stream a completed artifact
///
/// The body is streamed from disk; the job counts the stream as a waiter
/// until the client finishes or disconnects.
#[utoipa::path(
    get,
    path = "/download/{filename}",
    tag = "media",
    params(
        ("filename" = String, Path, description = "Artifact file name, `{video_id}.{kind}.{ext}`")
    ),
    responses(
        (status = 200, description = "Artifact bytes", content_type = "application/octet-stream"),
        (status = 404, description = "Unknown, expired or missing file", body = crate::error::ApiError),
        (status = 409, description = "Job not ready or failed", body = crate::error::ApiError)
    )
)]
pub async fn download_file(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Result<Response, Error> {
    let download = state
        .orchestrator
        .get_artifact_by_file_name(&filename)
        .await?;

    let size_bytes = download.size_bytes();
    let disposition = format!(
        "attachment; filename=\"{}\"",
        download.file_name().replace(['"', '\\'], "_")
    );
    tracing::debug!(filename = %filename, size_bytes, "Streaming artifact");

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .header(header::CONTENT_LENGTH, size_bytes)
        .header(header::CONTENT_DISPOSITION, disposition)
        .body(Body::from_stream(download))
        .map_err(|e| Error::Other(format!("failed to build download response: {e}")))
}
