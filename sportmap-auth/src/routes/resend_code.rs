use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;

use sportmap_shared::errors::AppResult;
use sportmap_shared::types::ApiResponse;

use crate::routes::required_email;
use crate::services::auth_service;
use crate::AppState;

const RESEND_MESSAGE: &str = "if this account exists and is not verified, a new code has been sent";

#[derive(Debug, Deserialize)]
pub struct ResendCodeRequest {
    pub email: Option<String>,
}

/// Answers the same way whether or not the account exists.
pub async fn resend_code(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ResendCodeRequest>,
) -> AppResult<Json<ApiResponse<&'static str>>> {
    let email = required_email(req.email)?;

    let Some(user) = state.users.find_by_email(&email)?.filter(|u| !u.is_verified) else {
        return Ok(Json(ApiResponse::ok(RESEND_MESSAGE)));
    };

    let code = auth_service::generate_verification_code();
    state.users.set_verification_code(user.id, &code)?;

    if let Err(e) = state.mailer.send_verification_code(&user.email, &code).await {
        tracing::error!(error = %e, user_id = user.id, "failed to send verification email");
    }

    Ok(Json(ApiResponse::ok(RESEND_MESSAGE)))
}
