use axum::extract::{Query as QueryParams, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use rag_core::models::QueryResponse;

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::executor::{self, ChatTurn};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatHistoryMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequest {
    pub chat_id: Uuid,
    pub question: String,
    #[serde(default)]
    pub marks: Option<i32>,
    #[serde(default)]
    pub format_instructions: Option<String>,
    #[serde(default)]
    pub document_ids: Option<Vec<Uuid>>,
    #[serde(default)]
    pub use_cross_chat: bool,
    #[serde(default)]
    pub chat_history: Vec<ChatHistoryMessage>,
}

pub async fn ask(
    auth: AuthUser,
    State(state): State<AppState>,
    Json(body): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, ApiError> {
    if body.question.trim().is_empty() {
        return Err(ApiError::BadRequest("question must not be empty".to_string()));
    }
    state.repo.get_chat(body.chat_id, auth.user_id).await?;

    let history: Vec<ChatTurn> = body
        .chat_history
        .into_iter()
        .map(|m| ChatTurn {
            role: m.role,
            content: m.content,
        })
        .collect();

    let response = executor::answer(
        &state,
        auth.user_id,
        body.chat_id,
        &body.question,
        body.marks,
        body.format_instructions.as_deref(),
        body.document_ids,
        body.use_cross_chat,
        &history,
    )
    .await?;

    Ok(Json(response))
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub chat_id: Uuid,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub id: Uuid,
    pub query_text: String,
    pub answer_text: String,
    pub sources_used: serde_json::Value,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

pub async fn history(
    auth: AuthUser,
    State(state): State<AppState>,
    QueryParams(q): QueryParams<HistoryQuery>,
) -> Result<Json<Vec<HistoryEntry>>, ApiError> {
    state.repo.get_chat(q.chat_id, auth.user_id).await?;
    let rows = state.repo.list_query_history(q.chat_id).await?;
    Ok(Json(
        rows.into_iter()
            .map(|r| HistoryEntry {
                id: r.id,
                query_text: r.query_text,
                answer_text: r.answer_text,
                sources_used: r.sources_used,
                created_at: r.created_at,
            })
            .collect(),
    ))
}
