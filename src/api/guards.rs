use async_trait::async_trait;
use axum::extract::{FromRequestParts, State};
use axum::http::{header, request::Parts};

use crate::api::errors::ApiError;
use crate::core::security::{self, Claims};
use crate::core::state::AppState;
use crate::db::types::UserRole;

/// Caller identity taken from a verified bearer token. Accounts live in
/// another service, so nothing is looked up here.
pub(crate) struct CurrentUser(pub(crate) Claims);

pub(crate) struct CurrentStaff(pub(crate) Claims);

impl CurrentUser {
    pub(crate) fn id(&self) -> &str {
        &self.0.sub
    }

    pub(crate) fn role(&self) -> UserRole {
        self.0.role
    }
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let State(app_state) = State::<AppState>::from_request_parts(parts, state)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to access application state"))?;

        let auth_header = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or(ApiError::Unauthorized("Invalid authentication credentials"))?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or(ApiError::Unauthorized("Invalid authentication credentials"))?;

        let claims = security::verify_token(token, app_state.settings())
            .map_err(|_| ApiError::Unauthorized("Invalid authentication credentials"))?;

        Ok(CurrentUser(claims))
    }
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentStaff {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let CurrentUser(claims) = CurrentUser::from_request_parts(parts, state).await?;

        if claims.role.is_staff() {
            Ok(CurrentStaff(claims))
        } else {
            Err(ApiError::Forbidden("Teacher access required"))
        }
    }
}

/// Students may only act on their own records; teachers and admins on any.
pub(crate) fn require_self_or_staff(user: &CurrentUser, student_id: &str) -> Result<(), ApiError> {
    if user.role().is_staff() || user.id() == student_id {
        return Ok(());
    }
    Err(ApiError::Forbidden("Not enough permissions for this student"))
}

pub(crate) fn require_student(user: &CurrentUser) -> Result<(), ApiError> {
    if user.role() == UserRole::Student {
        return Ok(());
    }
    Err(ApiError::Forbidden("Only students can submit answers"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(sub: &str, role: UserRole) -> CurrentUser {
        CurrentUser(Claims { sub: sub.to_string(), role, exp: 0 })
    }

    #[test]
    fn student_can_only_reach_own_records() {
        assert!(require_self_or_staff(&user("s1", UserRole::Student), "s1").is_ok());
        assert!(require_self_or_staff(&user("s1", UserRole::Student), "s2").is_err());
        assert!(require_self_or_staff(&user("t1", UserRole::Teacher), "s2").is_ok());
    }

    #[test]
    fn only_students_submit() {
        assert!(require_student(&user("s1", UserRole::Student)).is_ok());
        assert!(require_student(&user("a1", UserRole::Admin)).is_err());
    }
}
