use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::Serialize;

use sportmap_shared::types::auth::UserRole;

use crate::schema::users;

#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Serialize)]
#[diesel(table_name = users)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct User {
    pub id: i32,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub is_verified: bool,
    #[serde(skip_serializing)]
    pub verification_code: Option<String>,
    #[serde(skip_serializing)]
    pub reset_token_hash: Option<String>,
    #[serde(skip_serializing)]
    pub reset_token_created_at: Option<DateTime<Utc>>,
    pub role: String,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Unknown role strings fall back to the least privileged role.
    pub fn role(&self) -> UserRole {
        self.role.parse().unwrap_or(UserRole::User)
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = users)]
pub struct NewUser {
    pub email: String,
    pub password_hash: String,
    pub is_verified: bool,
    pub verification_code: Option<String>,
    pub role: String,
}

impl NewUser {
    /// An unverified plain user awaiting `code`.
    pub fn unverified(email: String, password_hash: String, code: String) -> Self {
        Self {
            email,
            password_hash,
            is_verified: false,
            verification_code: Some(code),
            role: UserRole::User.as_str().to_string(),
        }
    }
}
