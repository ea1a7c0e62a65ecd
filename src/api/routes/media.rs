//! Extraction request handlers.

use super::JobResponse;
use crate::api::AppState;
use crate::error::Error;
use crate::key::MediaKind;
use crate::types::JobState;
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};

/// GET /song/:video_id - Request the audio track of a video
#[utoipa::path(
    get,
    path = "/song/{video_id}",
    tag = "media",
    params(
        ("video_id" = String, Path, description = "11-character YouTube video id"),
        ("api" = Option<String>, Query, description = "API key (or X-Api-Key header)")
    ),
    responses(
        (status = 200, description = "Already extracted; includes the download link", body = JobResponse),
        (status = 202, description = "Extraction queued or in progress", body = JobResponse),
        (status = 400, description = "Invalid video id", body = crate::error::ApiError),
        (status = 401, description = "Missing or invalid API key", body = crate::error::ApiError),
        (status = 503, description = "Shutting down", body = crate::error::ApiError)
    ),
    security(("api_key" = []))
)]
pub async fn request_song(
    State(state): State<AppState>,
    Path(video_id): Path<String>,
) -> Result<Response, Error> {
    request_media(&state, &video_id, MediaKind::Audio).await
}

/// GET /video/:video_id - Request the video of a video
#[utoipa::path(
    get,
    path = "/video/{video_id}",
    tag = "media",
    params(
        ("video_id" = String, Path, description = "11-character YouTube video id"),
        ("api" = Option<String>, Query, description = "API key (or X-Api-Key header)")
    ),
    responses(
        (status = 200, description = "Already extracted; includes the download link", body = JobResponse),
        (status = 202, description = "Extraction queued or in progress", body = JobResponse),
        (status = 400, description = "Invalid video id", body = crate::error::ApiError),
        (status = 401, description = "Missing or invalid API key", body = crate::error::ApiError),
        (status = 503, description = "Shutting down", body = crate::error::ApiError)
    ),
    security(("api_key" = []))
)]
pub async fn request_video(
    State(state): State<AppState>,
    Path(video_id): Path<String>,
) -> Result<Response, Error> {
    request_media(&state, &video_id, MediaKind::Video).await
}

async fn request_media(state: &AppState, video_id: &str, kind: MediaKind) -> Result<Response, Error> {
    let key = state.orchestrator.request_download(video_id, kind).await?;
    let status = state.orchestrator.get_status(&key).await?;

    let code = if status.state == JobState::Completed {
        StatusCode::OK
    } else {
        StatusCode::ACCEPTED
    };
    Ok((code, Json(JobResponse::from(status))).into_response())
}
