use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use time::{OffsetDateTime, PrimitiveDateTime, UtcOffset};
use uuid::Uuid;
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::guards::{require_student, CurrentStaff, CurrentUser};
use crate::core::state::AppState;
use crate::core::time::{is_past, primitive_now_utc};
use crate::db::types::SubmissionStatus;
use crate::repositories;
use crate::schemas::assignment::{AssignmentCreate, AssignmentResponse};
use crate::schemas::submission::{SubmissionCreate, SubmissionResponse, SubmitResponse};

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_assignment))
        .route("/:assignment_id", get(get_assignment))
        .route("/:assignment_id/submissions", post(submit_answer))
}

fn to_primitive_utc(value: OffsetDateTime) -> PrimitiveDateTime {
    let utc = value.to_offset(UtcOffset::UTC);
    PrimitiveDateTime::new(utc.date(), utc.time())
}

async fn create_assignment(
    CurrentStaff(teacher): CurrentStaff,
    State(state): State<AppState>,
    Json(payload): Json<AssignmentCreate>,
) -> Result<(StatusCode, Json<AssignmentResponse>), ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let key_points: Vec<String> = payload
        .key_points
        .iter()
        .map(|point| point.trim().to_string())
        .filter(|point| !point.is_empty())
        .collect();
    let id = Uuid::new_v4().to_string();

    let assignment = repositories::assignments::create(
        state.db(),
        repositories::assignments::CreateAssignment {
            id: &id,
            title: payload.title.trim(),
            subject: payload.subject.trim(),
            description: payload.description.as_deref(),
            expected_answer: payload.expected_answer.as_deref(),
            key_points: &key_points,
            max_points: payload.max_points,
            class_label: payload.class_label.as_deref(),
            due_at: payload.due_at.map(to_primitive_utc),
            created_by: &teacher.sub,
            now: primitive_now_utc(),
        },
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to create assignment"))?;

    tracing::info!(assignment_id = %assignment.id, created_by = %teacher.sub, "Assignment created");
    Ok((StatusCode::CREATED, Json(AssignmentResponse::from(assignment))))
}

async fn get_assignment(
    Path(assignment_id): Path<String>,
    CurrentUser(_user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<AssignmentResponse>, ApiError> {
    let assignment = repositories::assignments::find_by_id(state.db(), &assignment_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch assignment"))?
        .ok_or_else(|| ApiError::NotFound("Assignment not found".to_string()))?;

    Ok(Json(AssignmentResponse::from(assignment)))
}

/// Stores the answer and grades it in the same request. A grading failure
/// still returns 201: the submission exists and waits for manual review.
async fn submit_answer(
    Path(assignment_id): Path<String>,
    user: CurrentUser,
    State(state): State<AppState>,
    Json(payload): Json<SubmissionCreate>,
) -> Result<(StatusCode, Json<SubmitResponse>), ApiError> {
    require_student(&user)?;
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let assignment = repositories::assignments::find_by_id(state.db(), &assignment_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch assignment"))?
        .ok_or_else(|| ApiError::NotFound("Assignment not found".to_string()))?;

    let now = primitive_now_utc();
    let status = if is_past(assignment.due_at, now) {
        SubmissionStatus::Late
    } else {
        SubmissionStatus::Submitted
    };
    let id = Uuid::new_v4().to_string();

    let created = repositories::submissions::create(
        state.db(),
        repositories::submissions::CreateSubmission {
            id: &id,
            assignment_id: &assignment.id,
            student_id: user.id(),
            content: &payload.content,
            attachments: &payload.attachments,
            status,
            max_points: assignment.max_points,
            submitted_at: now,
        },
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to store submission"))?;

    if created.is_none() {
        return Err(ApiError::Conflict("You have already submitted this assignment".to_string()));
    }

    tracing::info!(
        submission_id = %id,
        assignment_id = %assignment.id,
        student_id = user.id(),
        late = status == SubmissionStatus::Late,
        "Submission received"
    );

    let grading = state.grading().grade_submission(&id, false).await?;

    let submission = repositories::submissions::find_by_id(state.db(), &id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch submission"))?
        .ok_or_else(|| ApiError::NotFound("Submission not found".to_string()))?;

    Ok((
        StatusCode::CREATED,
        Json(SubmitResponse { submission: SubmissionResponse::from(submission), grading }),
    ))
}
