use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};

use crate::errors::{AppError, ErrorCode};
use crate::types::auth::{authorize_admin, AuthUser, Authorization, Claims};

const DEV_JWT_SECRET: &str = "development-secret-change-in-production";

/// HS256 secret shared by every service.
pub fn jwt_secret() -> String {
    std::env::var("JWT_SECRET").unwrap_or_else(|_| DEV_JWT_SECRET.to_string())
}

pub fn issue_jwt(claims: &Claims, secret: &str) -> Result<String, AppError> {
    encode(
        &Header::new(Algorithm::HS256),
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::internal(format!("JWT encoding failed: {e}")))
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let token = extract_bearer_token(&parts.headers)?;
        let claims = validate_jwt(&token, &jwt_secret())?;

        if claims.is_expired() {
            return Err(AppError::new(ErrorCode::TokenExpired, "token has expired"));
        }

        Ok(AuthUser::from(claims))
    }
}

fn extract_bearer_token(headers: &HeaderMap) -> Result<String, AppError> {
    let auth_header = headers
        .get("Authorization")
        .ok_or_else(|| AppError::new(ErrorCode::Unauthorized, "missing authorization header"))?
        .to_str()
        .map_err(|_| AppError::new(ErrorCode::Unauthorized, "invalid authorization header"))?;

    match auth_header.strip_prefix("Bearer ") {
        Some(token) if !token.trim().is_empty() => Ok(token.trim().to_string()),
        _ => Err(AppError::new(ErrorCode::Unauthorized, "authorization header must use Bearer scheme")),
    }
}

pub fn validate_jwt(token: &str, secret: &str) -> Result<Claims, AppError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;

    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map_err(|e| match e.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
            AppError::new(ErrorCode::TokenExpired, "token has expired")
        }
        _ => AppError::new(ErrorCode::TokenInvalid, format!("invalid token: {e}")),
    })?;

    Ok(token_data.claims)
}

/// Require Admin role
pub struct AdminUser(pub AuthUser);

#[axum::async_trait]
impl<S> FromRequestParts<S> for AdminUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;
        match authorize_admin(user) {
            Authorization::Authorized(user) => Ok(Self(user)),
            Authorization::Unauthorized(reason) => {
                Err(AppError::new(ErrorCode::Forbidden, reason.message()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::auth::UserRole;
    use axum::http::{HeaderValue, Request};

    fn parts_with(header: Option<&str>) -> Parts {
        let mut req = Request::builder().uri("/").body(()).unwrap();
        if let Some(h) = header {
            req.headers_mut().insert("Authorization", HeaderValue::from_str(h).unwrap());
        }
        req.into_parts().0
    }

    fn token_for(role: UserRole, ttl: i64) -> String {
        issue_jwt(&Claims::new(3, "user@sportmap.fr", role, ttl), &jwt_secret()).unwrap()
    }

    #[tokio::test]
    async fn missing_header_is_unauthorized() {
        let mut parts = parts_with(None);
        let err = AuthUser::from_request_parts(&mut parts, &()).await.unwrap_err();
        assert_eq!(err.status_code(), axum::http::StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn wrong_scheme_is_unauthorized() {
        let mut parts = parts_with(Some("Basic abc"));
        let err = AuthUser::from_request_parts(&mut parts, &()).await.unwrap_err();
        assert_eq!(err.status_code(), axum::http::StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn valid_token_yields_user() {
        let header = format!("Bearer {}", token_for(UserRole::User, 600));
        let mut parts = parts_with(Some(&header));
        let user = AuthUser::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(user.id, 3);
        assert_eq!(user.email, "user@sportmap.fr");
    }

    #[tokio::test]
    async fn expired_token_is_rejected() {
        let header = format!("Bearer {}", token_for(UserRole::User, -600));
        let mut parts = parts_with(Some(&header));
        let err = AuthUser::from_request_parts(&mut parts, &()).await.unwrap_err();
        assert!(matches!(err, AppError::Known { code: ErrorCode::TokenExpired, .. }));
    }

    #[tokio::test]
    async fn admin_extractor_refuses_plain_users() {
        let header = format!("Bearer {}", token_for(UserRole::User, 600));
        let mut parts = parts_with(Some(&header));
        let err = AdminUser::from_request_parts(&mut parts, &()).await.err().unwrap();
        assert_eq!(err.status_code(), axum::http::StatusCode::FORBIDDEN);

        let header = format!("Bearer {}", token_for(UserRole::Admin, 600));
        let mut parts = parts_with(Some(&header));
        let admin = AdminUser::from_request_parts(&mut parts, &()).await.ok().unwrap();
        assert_eq!(admin.0.role, UserRole::Admin);
    }

    #[test]
    fn token_signed_with_other_secret_is_invalid() {
        let token = issue_jwt(&Claims::new(1, "a@b.fr", UserRole::User, 60), "other").unwrap();
        let err = validate_jwt(&token, "not-the-same").unwrap_err();
        assert!(matches!(err, AppError::Known { code: ErrorCode::TokenInvalid, .. }));
    }
}
