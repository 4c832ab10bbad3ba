use axum::extract::{Query, State};
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

use sportmap_shared::errors::{AppError, AppResult, ErrorCode};
use sportmap_shared::types::ApiResponse;

use crate::models::User;
use crate::routes::required_email;
use crate::services::{auth_service, token_service};
use crate::AppState;

// --- Request a reset link ---

#[derive(Debug, Deserialize)]
pub struct ResetRequest {
    pub email: Option<String>,
}

pub async fn request_password_reset(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ResetRequest>,
) -> AppResult<Json<ApiResponse<&'static str>>> {
    let email = required_email(req.email)?;

    let user = state
        .users
        .find_by_email(&email)?
        .ok_or_else(|| AppError::new(ErrorCode::UserNotFound, "unknown email"))?;

    let token = token_service::create_reset_token();
    state
        .users
        .set_reset_token(user.id, &token_service::hash_token(&token), Utc::now())?;

    let link = state.config.reset_link(&token, &user.email)?;
    state
        .mailer
        .send_password_reset_link(&user.email, &link)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, user_id = user.id, "failed to send reset email");
            AppError::new(ErrorCode::EmailDeliveryFailed, format!("could not send email: {e}"))
        })?;

    tracing::info!(user_id = user.id, "password reset requested");

    Ok(Json(ApiResponse::ok("reset link sent by email")))
}

// --- Reset the password ---

#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    pub email: Option<String>,
    pub token: Option<String>,
    pub new_password: Option<String>,
}

pub async fn reset_password(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ResetPasswordRequest>,
) -> AppResult<Json<ApiResponse<&'static str>>> {
    let invalid = || AppError::new(ErrorCode::ResetTokenInvalid, "invalid reset link");

    let email = required_email(req.email)?;
    let token = req.token.filter(|t| !t.is_empty()).ok_or_else(invalid)?;
    let new_password = req
        .new_password
        .ok_or_else(|| AppError::bad_request("new_password is required"))?;

    let user = state
        .users
        .find_by_reset_hash(&token_service::hash_token(&token), Some(&email))?
        .ok_or_else(invalid)?;

    remaining_secs(&user, state.config.reset_token_ttl_secs)
        .ok_or_else(|| AppError::new(ErrorCode::ResetTokenExpired, "reset link expired"))?;

    auth_service::validate_password(&new_password)?;
    let password_hash = auth_service::hash_password(&new_password)?;
    state.users.set_password(user.id, &password_hash)?;

    tracing::info!(user_id = user.id, "password reset");

    Ok(Json(ApiResponse::ok("password reset successful")))
}

// --- Check a reset link before showing the form ---

#[derive(Debug, Deserialize)]
pub struct ValidateResetParams {
    pub token: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ResetTokenStatus {
    pub valid: bool,
    pub email: String,
    pub expires_in: i64,
}

pub async fn validate_reset_token(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ValidateResetParams>,
) -> AppResult<Json<ApiResponse<ResetTokenStatus>>> {
    let token = params
        .token
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::bad_request("token is required"))?;
    let email = params.email.filter(|e| !e.trim().is_empty());

    let user = state
        .users
        .find_by_reset_hash(&token_service::hash_token(&token), email.as_deref().map(str::trim))?
        .ok_or_else(|| {
            AppError::with_details(ErrorCode::NotFound, "invalid reset link", json!({ "not_found": true }))
        })?;

    let expires_in = remaining_secs(&user, state.config.reset_token_ttl_secs).ok_or_else(|| {
        AppError::with_details(ErrorCode::ResetTokenExpired, "reset link expired", json!({ "expired": true }))
    })?;

    Ok(Json(ApiResponse::ok(ResetTokenStatus {
        valid: true,
        email: user.email,
        expires_in,
    })))
}

fn remaining_secs(user: &User, ttl_secs: i64) -> Option<i64> {
    user.reset_token_created_at
        .and_then(|issued| token_service::reset_token_remaining(issued, ttl_secs, Utc::now()))
}
