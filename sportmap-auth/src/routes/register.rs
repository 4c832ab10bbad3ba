use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;

use sportmap_shared::errors::{AppError, AppResult, ErrorCode};
use sportmap_shared::types::ApiResponse;

use crate::models::NewUser;
use crate::services::auth_service;
use crate::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(email(message = "invalid email format"))]
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RegisteredUser {
    pub id: i32,
    pub email: String,
    pub email_sent: bool,
}

pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterRequest>,
) -> AppResult<Json<ApiResponse<RegisteredUser>>> {
    let (Some(email), Some(password)) = (req.email.as_deref(), req.password.as_deref()) else {
        return Err(AppError::bad_request("email and password are required"));
    };
    req.validate()
        .map_err(|e| AppError::new(ErrorCode::ValidationError, e.to_string()))?;
    auth_service::validate_password(password)?;

    let email = email.trim().to_lowercase();
    if state.users.find_by_email(&email)?.is_some() {
        return Err(AppError::new(ErrorCode::EmailAlreadyExists, "email already registered"));
    }

    let code = auth_service::generate_verification_code();
    let password_hash = auth_service::hash_password(password)?;
    let user = state
        .users
        .insert(NewUser::unverified(email, password_hash, code.clone()))?;

    let email_sent = match state.mailer.send_verification_code(&user.email, &code).await {
        Ok(()) => true,
        Err(e) => {
            tracing::error!(error = %e, user_id = user.id, "failed to send verification email");
            false
        }
    };

    tracing::info!(user_id = user.id, email = %user.email, "user registered");

    let message = if email_sent {
        "verification code sent by email"
    } else {
        "account created, email temporarily unavailable"
    };
    Ok(Json(ApiResponse::ok_with_message(
        RegisteredUser { id: user.id, email: user.email, email_sent },
        message,
    )))
}
