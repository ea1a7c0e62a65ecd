//! Job status handler.

use super::{JobResponse, StatusQuery};
use crate::api::AppState;
use crate::error::Error;
use crate::key::MediaKind;
use axum::{
    Json,
    extract::{Path, Query, State},
};

/// GET /status/:video_id - Poll a job
#[utoipa::path(
    get,
    path = "/status/{video_id}",
    tag = "media",
    params(
        ("video_id" = String, Path, description = "11-character YouTube video id"),
        StatusQuery
    ),
    responses(
        (status = 200, description = "Current job state", body = JobResponse),
        (status = 400, description = "Invalid video id or kind", body = crate::error::ApiError),
        (status = 404, description = "No job for this video", body = crate::error::ApiError)
    )
)]
pub async fn get_status(
    State(state): State<AppState>,
    Path(video_id): Path<String>,
    Query(query): Query<StatusQuery>,
) -> Result<Json<JobResponse>, Error> {
    let kind = query
        .kind
        .as_deref()
        .map(str::parse::<MediaKind>)
        .transpose()?;

    let status = state.orchestrator.status_for_video(&video_id, kind).await?;
    Ok(Json(status.into()))
}
