use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use rag_core::models::Chat;

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateChatRequest {
    pub title: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    pub id: Uuid,
    pub title: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl From<Chat> for ChatResponse {
    fn from(c: Chat) -> Self {
        Self {
            id: c.id,
            title: c.title,
            created_at: c.created_at,
        }
    }
}

pub async fn create(
    auth: AuthUser,
    State(state): State<AppState>,
    Json(body): Json<CreateChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    if body.title.trim().is_empty() {
        return Err(ApiError::BadRequest("title must not be empty".to_string()));
    }
    let chat = state.repo.create_chat(auth.user_id, body.title.trim()).await?;
    Ok(Json(chat.into()))
}

pub async fn list(
    auth: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<ChatResponse>>, ApiError> {
    let chats = state.repo.list_chats(auth.user_id).await?;
    Ok(Json(chats.into_iter().map(ChatResponse::from).collect()))
}

pub async fn get(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(chat_id): Path<Uuid>,
) -> Result<Json<ChatResponse>, ApiError> {
    let chat = state.repo.get_chat(chat_id, auth.user_id).await?;
    Ok(Json(chat.into()))
}

pub async fn update(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(chat_id): Path<Uuid>,
    Json(body): Json<CreateChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    if body.title.trim().is_empty() {
        return Err(ApiError::BadRequest("title must not be empty".to_string()));
    }
    let chat = state
        .repo
        .update_chat_title(chat_id, auth.user_id, body.title.trim())
        .await?;
    Ok(Json(chat.into()))
}

pub async fn delete(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(chat_id): Path<Uuid>,
) -> Result<(), ApiError> {
    state.repo.get_chat(chat_id, auth.user_id).await?;
    state.vector_store.delete_by_chat(chat_id).await?;
    state.cache.invalidate(chat_id).await?;
    state.repo.delete_chat(chat_id, auth.user_id).await?;
    Ok(())
}
