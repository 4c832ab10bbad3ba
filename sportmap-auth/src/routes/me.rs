use axum::extract::State;
use axum::Json;
use serde::Serialize;
use std::sync::Arc;

use sportmap_shared::errors::{AppError, AppResult, ErrorCode};
use sportmap_shared::types::auth::{AuthUser, UserRole};
use sportmap_shared::types::ApiResponse;

use crate::AppState;

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub id: i32,
    pub email: String,
    pub is_verified: bool,
    pub role: UserRole,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

pub async fn me(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
) -> AppResult<Json<ApiResponse<MeResponse>>> {
    let record = state
        .users
        .find_by_id(user.id)?
        .ok_or_else(|| AppError::new(ErrorCode::UserNotFound, "user not found"))?;

    Ok(Json(ApiResponse::ok(MeResponse {
        id: record.id,
        role: record.role(),
        email: record.email,
        is_verified: record.is_verified,
        created_at: record.created_at,
    })))
}
