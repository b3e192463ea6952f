use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::guards::{CurrentStaff, CurrentUser};
use crate::core::state::AppState;
use crate::schemas::video::VideoGenerateRequest;
use crate::services::video_jobs::{self, VideoJob};

const GENERATE_LIMIT_PER_HOUR: u64 = 20;

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/generate", post(generate_video))
        .route("/jobs/:job_id", get(get_job))
}

async fn generate_video(
    CurrentStaff(teacher): CurrentStaff,
    State(state): State<AppState>,
    Json(payload): Json<VideoGenerateRequest>,
) -> Result<(StatusCode, Json<VideoJob>), ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let allowed = state
        .redis()
        .rate_limit(&format!("rate-limit:video:{}", teacher.sub), GENERATE_LIMIT_PER_HOUR, 3600)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to check video rate limit"))?;
    if !allowed {
        return Err(ApiError::TooManyRequests("Too many video requests, try again later"));
    }

    let job = video_jobs::start_job(
        state.video_jobs(),
        state.video_provider(),
        &teacher.sub,
        payload.lesson_title.trim(),
        payload.prompt.trim(),
    )
    .await?;

    Ok((StatusCode::ACCEPTED, Json(job)))
}

/// Lesson videos are shared with the class, so any signed-in user may poll.
async fn get_job(
    Path(job_id): Path<String>,
    CurrentUser(_user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<VideoJob>, ApiError> {
    let job = video_jobs::refresh_job(state.video_jobs(), state.video_provider(), &job_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Video job not found".to_string()))?;

    Ok(Json(job))
}
