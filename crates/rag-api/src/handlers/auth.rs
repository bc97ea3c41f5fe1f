use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::auth::password;
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub user_id: uuid::Uuid,
    pub email: String,
    pub token: String,
    pub expires_in: u64,
}

fn validate_email(email: &str) -> Result<(), ApiError> {
    if email.contains('@') && email.len() >= 3 {
        return Ok(());
    }
    Err(ApiError::BadRequest("invalid email".to_string()))
}

fn validate_password(password: &str) -> Result<(), ApiError> {
    if password.len() >= 8 {
        return Ok(());
    }
    Err(ApiError::BadRequest(
        "password must be at least 8 characters".to_string(),
    ))
}

pub async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    validate_email(&body.email)?;
    validate_password(&body.password)?;

    if state.repo.get_user_by_email(&body.email).await?.is_some() {
        return Err(ApiError::BadRequest("email already registered".to_string()));
    }

    let password_hash = password::hash(&body.password)?;
    let user = state.repo.create_user(&body.email, &password_hash).await?;

    let expires_in = state.settings.auth.jwt_expiration_secs;
    let token = state.jwt.generate_token(user.id, "user")?;

    Ok(Json(AuthResponse {
        user_id: user.id,
        email: user.email,
        token,
        expires_in,
    }))
}

pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let user = state
        .repo
        .get_user_by_email(&body.email)
        .await?
        .ok_or(ApiError::Unauthenticated)?;

    if !user.active || !password::verify(&body.password, &user.password_hash) {
        return Err(ApiError::Unauthenticated);
    }

    let expires_in = state.settings.auth.jwt_expiration_secs;
    let token = state.jwt.generate_token(user.id, "user")?;

    Ok(Json(AuthResponse {
        user_id: user.id,
        email: user.email,
        token,
        expires_in,
    }))
}
