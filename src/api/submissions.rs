use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::guards::{require_self_or_staff, CurrentStaff, CurrentUser};
use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::db::models::Submission;
use crate::db::types::ActivityKind;
use crate::repositories;
use crate::schemas::submission::{ManualGradeRequest, SubmissionResponse};
use crate::services::grading::{GradingResponse, LetterGrade};
use crate::services::rewards::{self, AwardEvent};

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/:submission_id", get(get_submission))
        .route("/:submission_id/regrade", post(regrade_submission))
        .route("/:submission_id/grade", post(grade_manually))
}

async fn load_submission(state: &AppState, submission_id: &str) -> Result<Submission, ApiError> {
    repositories::submissions::find_by_id(state.db(), submission_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch submission"))?
        .ok_or_else(|| ApiError::NotFound("Submission not found".to_string()))
}

async fn get_submission(
    Path(submission_id): Path<String>,
    user: CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<SubmissionResponse>, ApiError> {
    let submission = load_submission(&state, &submission_id).await?;
    require_self_or_staff(&user, &submission.student_id)?;

    Ok(Json(SubmissionResponse::from(submission)))
}

async fn regrade_submission(
    Path(submission_id): Path<String>,
    CurrentStaff(teacher): CurrentStaff,
    State(state): State<AppState>,
) -> Result<Json<GradingResponse>, ApiError> {
    tracing::info!(submission_id = %submission_id, requested_by = %teacher.sub, "Regrade requested");
    let response = state.grading().grade_submission(&submission_id, true).await?;
    Ok(Json(response))
}

/// Teacher override. The result replaces any automatic grade and rewards
/// the student once per assignment, like automatic grading does.
async fn grade_manually(
    Path(submission_id): Path<String>,
    CurrentStaff(teacher): CurrentStaff,
    State(state): State<AppState>,
    Json(payload): Json<ManualGradeRequest>,
) -> Result<Json<SubmissionResponse>, ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let submission = load_submission(&state, &submission_id).await?;
    if payload.score > submission.max_points {
        return Err(ApiError::BadRequest(format!(
            "score must not exceed {} points",
            submission.max_points
        )));
    }

    let score = u32::try_from(payload.score).unwrap_or(0);
    let max_points = u32::try_from(submission.max_points).unwrap_or(0);
    let grade = match payload.grade.as_deref() {
        Some(raw) => LetterGrade::parse(raw)
            .ok_or_else(|| ApiError::BadRequest(format!("Unknown letter grade: {raw}")))?,
        None => LetterGrade::for_points(score, max_points),
    };

    let updated = repositories::submissions::record_manual_grade(
        state.db(),
        &submission_id,
        repositories::submissions::ManualGrade {
            grade: grade.as_str(),
            score: payload.score,
            feedback: payload.feedback.as_deref(),
            graded_by: &teacher.sub,
            now: primitive_now_utc(),
        },
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to store grade"))?
    .ok_or_else(|| ApiError::NotFound("Submission not found".to_string()))?;

    tracing::info!(
        submission_id = %submission_id,
        graded_by = %teacher.sub,
        grade = grade.as_str(),
        score = payload.score,
        "Submission graded manually"
    );

    let event = AwardEvent {
        kind: ActivityKind::Assignment,
        source_id: updated.assignment_id.clone(),
        amount: u64::from(score),
    };
    if let Err(err) =
        rewards::award_activity(state.progression(), &updated.student_id, &event).await
    {
        tracing::error!(
            submission_id = %submission_id,
            error = %err,
            "Failed to award assignment points"
        );
    }

    Ok(Json(SubmissionResponse::from(updated)))
}
