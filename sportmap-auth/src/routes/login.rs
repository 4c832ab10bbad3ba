use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;

use sportmap_shared::errors::{AppError, AppResult, ErrorCode};
use sportmap_shared::types::auth::AccessToken;
use sportmap_shared::types::ApiResponse;

use crate::routes::required_email;
use crate::services::{auth_service, token_service};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> AppResult<Json<ApiResponse<AccessToken>>> {
    let email = required_email(req.email)?;
    let password = req
        .password
        .ok_or_else(|| AppError::bad_request("password is required"))?;

    let user = state
        .users
        .find_by_email(&email)?
        .ok_or_else(|| AppError::new(ErrorCode::UserNotFound, "user not found"))?;

    if !auth_service::verify_password(&password, &user.password_hash)? {
        return Err(AppError::new(ErrorCode::InvalidCredentials, "incorrect password"));
    }
    if !user.is_verified {
        return Err(AppError::new(ErrorCode::EmailNotVerified, "account not verified"));
    }

    let token = token_service::create_access_token(
        user.id,
        &user.email,
        user.role(),
        state.config.access_token_ttl_secs,
    )?;

    tracing::info!(user_id = user.id, "user logged in");

    Ok(Json(ApiResponse::ok_with_message(token, "login successful")))
}
