use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};

use sportmap_shared::clients::db::{DbConn, DbPool};
use sportmap_shared::errors::{AppError, AppResult, ErrorCode};

use crate::models::{NewUser, User};
use crate::schema::users;

/// Identity records. Emails are stored and looked up lowercased.
pub trait UserStore: Send + Sync {
    fn find_by_email(&self, email: &str) -> AppResult<Option<User>>;

    fn find_by_id(&self, id: i32) -> AppResult<Option<User>>;

    /// Holder of a reset token hash, optionally pinned to an email.
    fn find_by_reset_hash(&self, token_hash: &str, email: Option<&str>) -> AppResult<Option<User>>;

    /// Fails with `EmailAlreadyExists` when the email is taken.
    fn insert(&self, user: NewUser) -> AppResult<User>;

    fn set_verification_code(&self, id: i32, code: &str) -> AppResult<()>;

    /// Marks the account verified and clears the pending code.
    fn mark_verified(&self, id: i32) -> AppResult<()>;

    fn set_reset_token(&self, id: i32, token_hash: &str, issued_at: DateTime<Utc>) -> AppResult<()>;

    /// Replaces the password hash and drops any outstanding reset token.
    fn set_password(&self, id: i32, password_hash: &str) -> AppResult<()>;

    fn ping(&self) -> AppResult<()>;
}

fn email_taken() -> AppError {
    AppError::new(ErrorCode::EmailAlreadyExists, "email already registered")
}

// --- PostgreSQL ---

pub struct PgUserStore {
    pool: DbPool,
}

impl PgUserStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn conn(&self) -> AppResult<DbConn> {
        self.pool
            .get()
            .map_err(|e| AppError::internal(format!("db pool error: {e}")))
    }
}

impl UserStore for PgUserStore {
    fn find_by_email(&self, email: &str) -> AppResult<Option<User>> {
        let mut conn = self.conn()?;
        let user = users::table
            .filter(users::email.eq(email.to_lowercase()))
            .select(User::as_select())
            .first(&mut conn)
            .optional()?;
        Ok(user)
    }

    fn find_by_id(&self, id: i32) -> AppResult<Option<User>> {
        let mut conn = self.conn()?;
        let user = users::table
            .find(id)
            .select(User::as_select())
            .first(&mut conn)
            .optional()?;
        Ok(user)
    }

    fn find_by_reset_hash(&self, token_hash: &str, email: Option<&str>) -> AppResult<Option<User>> {
        let mut conn = self.conn()?;
        let mut query = users::table
            .filter(users::reset_token_hash.eq(token_hash))
            .select(User::as_select())
            .into_boxed();
        if let Some(email) = email {
            query = query.filter(users::email.eq(email.to_lowercase()));
        }
        let user = query.first(&mut conn).optional()?;
        Ok(user)
    }

    fn insert(&self, user: NewUser) -> AppResult<User> {
        let mut conn = self.conn()?;
        diesel::insert_into(users::table)
            .values(&user)
            .returning(User::as_returning())
            .get_result(&mut conn)
            .map_err(|e| match e {
                DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => email_taken(),
                other => other.into(),
            })
    }

    fn set_verification_code(&self, id: i32, code: &str) -> AppResult<()> {
        let mut conn = self.conn()?;
        diesel::update(users::table.find(id))
            .set(users::verification_code.eq(Some(code)))
            .execute(&mut conn)?;
        Ok(())
    }

    fn mark_verified(&self, id: i32) -> AppResult<()> {
        let mut conn = self.conn()?;
        diesel::update(users::table.find(id))
            .set((
                users::is_verified.eq(true),
                users::verification_code.eq(None::<String>),
            ))
            .execute(&mut conn)?;
        Ok(())
    }

    fn set_reset_token(&self, id: i32, token_hash: &str, issued_at: DateTime<Utc>) -> AppResult<()> {
        let mut conn = self.conn()?;
        diesel::update(users::table.find(id))
            .set((
                users::reset_token_hash.eq(Some(token_hash)),
                users::reset_token_created_at.eq(Some(issued_at)),
            ))
            .execute(&mut conn)?;
        Ok(())
    }

    fn set_password(&self, id: i32, password_hash: &str) -> AppResult<()> {
        let mut conn = self.conn()?;
        diesel::update(users::table.find(id))
            .set((
                users::password_hash.eq(password_hash),
                users::reset_token_hash.eq(None::<String>),
                users::reset_token_created_at.eq(None::<DateTime<Utc>>),
            ))
            .execute(&mut conn)?;
        Ok(())
    }

    fn ping(&self) -> AppResult<()> {
        let mut conn = self.conn()?;
        diesel::sql_query("SELECT 1").execute(&mut conn)?;
        Ok(())
    }
}

// --- In-memory ---

#[derive(Default)]
struct MemoryTable {
    users: Vec<User>,
    next_id: i32,
}

#[derive(Default)]
pub struct MemoryUserStore {
    table: Mutex<MemoryTable>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rewinds a pending reset token's issuance time.
    pub fn backdate_reset_token(&self, id: i32, issued_at: DateTime<Utc>) {
        self.update(id, |user| user.reset_token_created_at = Some(issued_at));
    }

    fn table(&self) -> MutexGuard<'_, MemoryTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn update(&self, id: i32, f: impl FnOnce(&mut User)) {
        if let Some(user) = self.table().users.iter_mut().find(|u| u.id == id) {
            f(user);
        }
    }
}

impl UserStore for MemoryUserStore {
    fn find_by_email(&self, email: &str) -> AppResult<Option<User>> {
        let email = email.to_lowercase();
        Ok(self.table().users.iter().find(|u| u.email == email).cloned())
    }

    fn find_by_id(&self, id: i32) -> AppResult<Option<User>> {
        Ok(self.table().users.iter().find(|u| u.id == id).cloned())
    }

    fn find_by_reset_hash(&self, token_hash: &str, email: Option<&str>) -> AppResult<Option<User>> {
        let email = email.map(str::to_lowercase);
        Ok(self
            .table()
            .users
            .iter()
            .filter(|u| u.reset_token_hash.as_deref() == Some(token_hash))
            .find(|u| email.as_ref().map_or(true, |e| &u.email == e))
            .cloned())
    }

    fn insert(&self, new: NewUser) -> AppResult<User> {
        let mut table = self.table();
        let email = new.email.to_lowercase();
        if table.users.iter().any(|u| u.email == email) {
            return Err(email_taken());
        }
        table.next_id += 1;
        let user = User {
            id: table.next_id,
            email,
            password_hash: new.password_hash,
            is_verified: new.is_verified,
            verification_code: new.verification_code,
            reset_token_hash: None,
            reset_token_created_at: None,
            role: new.role,
            created_at: Utc::now(),
        };
        table.users.push(user.clone());
        Ok(user)
    }

    fn set_verification_code(&self, id: i32, code: &str) -> AppResult<()> {
        self.update(id, |user| user.verification_code = Some(code.to_string()));
        Ok(())
    }

    fn mark_verified(&self, id: i32) -> AppResult<()> {
        self.update(id, |user| {
            user.is_verified = true;
            user.verification_code = None;
        });
        Ok(())
    }

    fn set_reset_token(&self, id: i32, token_hash: &str, issued_at: DateTime<Utc>) -> AppResult<()> {
        self.update(id, |user| {
            user.reset_token_hash = Some(token_hash.to_string());
            user.reset_token_created_at = Some(issued_at);
        });
        Ok(())
    }

    fn set_password(&self, id: i32, password_hash: &str) -> AppResult<()> {
        self.update(id, |user| {
            user.password_hash = password_hash.to_string();
            user.reset_token_hash = None;
            user.reset_token_created_at = None;
        });
        Ok(())
    }

    fn ping(&self) -> AppResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending(email: &str) -> NewUser {
        NewUser::unverified(email.into(), "hash".into(), "123456".into())
    }

    #[test]
    fn emails_are_unique_case_insensitively() {
        let store = MemoryUserStore::new();
        store.insert(pending("Jo@Example.com")).unwrap();

        let err = store.insert(pending("jo@example.com")).unwrap_err();
        assert_eq!(err.status_code(), axum::http::StatusCode::CONFLICT);
        assert!(store.find_by_email("JO@EXAMPLE.COM").unwrap().is_some());
    }

    #[test]
    fn verifying_clears_the_code() {
        let store = MemoryUserStore::new();
        let user = store.insert(pending("jo@example.com")).unwrap();
        store.mark_verified(user.id).unwrap();

        let user = store.find_by_id(user.id).unwrap().unwrap();
        assert!(user.is_verified);
        assert_eq!(user.verification_code, None);
    }

    #[test]
    fn new_password_consumes_the_reset_token() {
        let store = MemoryUserStore::new();
        let user = store.insert(pending("jo@example.com")).unwrap();
        store.set_reset_token(user.id, "abc", Utc::now()).unwrap();

        assert!(store.find_by_reset_hash("abc", Some("jo@example.com")).unwrap().is_some());
        assert!(store.find_by_reset_hash("abc", Some("other@example.com")).unwrap().is_none());
        assert!(store.find_by_reset_hash("abc", None).unwrap().is_some());

        store.set_password(user.id, "new-hash").unwrap();
        assert!(store.find_by_reset_hash("abc", None).unwrap().is_none());
    }
}
