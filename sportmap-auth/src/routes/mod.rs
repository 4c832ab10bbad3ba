pub mod health;
pub mod login;
pub mod me;
pub mod password_reset;
pub mod register;
pub mod resend_code;
pub mod verify_code;

use sportmap_shared::errors::{AppError, AppResult};

/// Trimmed, lowercased email; missing or blank is a 400.
pub(crate) fn required_email(email: Option<String>) -> AppResult<String> {
    email
        .map(|e| e.trim().to_lowercase())
        .filter(|e| !e.is_empty())
        .ok_or_else(|| AppError::bad_request("email is required"))
}
