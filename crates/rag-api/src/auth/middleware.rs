use std::sync::Arc;

use axum::extract::{FromRef, FromRequestParts};
use axum::http::request::Parts;
use uuid::Uuid;

use crate::auth::jwt::JwtManager;
use crate::error::ApiError;

/// Extracted identity of an authenticated request, grounded on the
/// teacher's `Claims`-carrying middleware shape (their own
/// `auth/middleware.rs` was left a stub — this is the real extractor it
/// was never filled in with).
#[derive(Debug, Clone, Copy)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub role: &'static str,
}

impl<S> FromRequestParts<S> for AuthUser
where
    Arc<JwtManager>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or(ApiError::Unauthenticated)?;

        let token = header
            .strip_prefix("Bearer ")
            .ok_or(ApiError::Unauthenticated)?;

        let jwt = Arc::<JwtManager>::from_ref(state);
        let claims = jwt.validate_token(token)?;

        let role = match claims.role.as_str() {
            "admin" => "admin",
            _ => "user",
        };

        Ok(AuthUser {
            user_id: claims.user_id,
            role,
        })
    }
}
