use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::guards::{require_self_or_staff, CurrentUser};
use crate::core::state::AppState;
use crate::db::types::ActivityKind;
use crate::schemas::progression::{
    ActivityRequest, ProgressionResponse, RedemptionRequest, RedemptionResponse,
};
use crate::services::rewards::{self, AwardEvent, AwardSummary};

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/:student_id/progression", get(get_progression))
        .route("/:student_id/activities", post(record_activity))
        .route("/:student_id/redemptions", post(redeem_coins))
}

async fn get_progression(
    Path(student_id): Path<String>,
    user: CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<ProgressionResponse>, ApiError> {
    require_self_or_staff(&user, &student_id)?;

    let progression = state.progression().load(&student_id).await?;
    Ok(Json(ProgressionResponse::from(progression)))
}

/// Rewards a completed quiz, lesson video or game. Replaying the same
/// source id is answered with `alreadyAwarded` and pays nothing.
async fn record_activity(
    Path(student_id): Path<String>,
    user: CurrentUser,
    State(state): State<AppState>,
    Json(payload): Json<ActivityRequest>,
) -> Result<Json<AwardSummary>, ApiError> {
    require_self_or_staff(&user, &student_id)?;
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;
    if payload.kind == ActivityKind::Assignment {
        return Err(ApiError::BadRequest("Assignments are rewarded when graded".to_string()));
    }

    let event = AwardEvent {
        kind: payload.kind,
        source_id: payload.source_id.trim().to_string(),
        amount: payload.amount,
    };
    let summary = rewards::award_activity(state.progression(), &student_id, &event).await?;
    Ok(Json(summary))
}

async fn redeem_coins(
    Path(student_id): Path<String>,
    user: CurrentUser,
    State(state): State<AppState>,
    Json(payload): Json<RedemptionRequest>,
) -> Result<Json<RedemptionResponse>, ApiError> {
    require_self_or_staff(&user, &student_id)?;
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let (redemption, wallet) =
        rewards::redeem(state.progression(), &student_id, payload.reward.trim(), payload.cost)
            .await?;
    Ok(Json(RedemptionResponse { redemption, wallet }))
}
