use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use sha2::{Digest, Sha256};

use sportmap_shared::errors::AppError;
use sportmap_shared::middleware::{issue_jwt, jwt_secret};
use sportmap_shared::types::auth::{AccessToken, Claims, UserRole};

pub fn create_access_token(
    user_id: i32,
    email: &str,
    role: UserRole,
    ttl_secs: i64,
) -> Result<AccessToken, AppError> {
    let claims = Claims::new(user_id, email, role, ttl_secs);
    let token = issue_jwt(&claims, &jwt_secret())?;
    Ok(AccessToken::new(token, ttl_secs))
}

/// Random token for the emailed reset link. Only its hash is stored.
pub fn create_reset_token() -> String {
    let bytes: [u8; 32] = rand::thread_rng().gen();
    hex::encode(bytes)
}

pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Seconds left before a reset token issued at `issued_at` lapses; `None`
/// once it has.
pub fn reset_token_remaining(issued_at: DateTime<Utc>, ttl_secs: i64, now: DateTime<Utc>) -> Option<i64> {
    let remaining = (issued_at + Duration::seconds(ttl_secs) - now).num_seconds();
    (remaining >= 0).then_some(remaining)
}
