use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;

use sportmap_shared::errors::{AppError, AppResult, ErrorCode};
use sportmap_shared::types::ApiResponse;

use crate::routes::required_email;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct VerifyCodeRequest {
    pub email: Option<String>,
    pub code: Option<String>,
}

pub async fn verify_code(
    State(state): State<Arc<AppState>>,
    Json(req): Json<VerifyCodeRequest>,
) -> AppResult<Json<ApiResponse<&'static str>>> {
    let email = required_email(req.email)?;

    let user = state
        .users
        .find_by_email(&email)?
        .ok_or_else(|| AppError::new(ErrorCode::UserNotFound, "user not found"))?;

    let submitted = req.code.as_deref().map(str::trim);
    if submitted.is_none() || user.verification_code.as_deref() != submitted {
        return Err(AppError::new(ErrorCode::VerificationCodeInvalid, "incorrect code"));
    }

    state.users.mark_verified(user.id)?;
    tracing::info!(user_id = user.id, "email verified");

    Ok(Json(ApiResponse::ok("account verified")))
}
