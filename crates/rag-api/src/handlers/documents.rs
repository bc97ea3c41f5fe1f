use axum::extract::{Multipart, Path, Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use rag_core::models::{Document, FileType, MAX_FILE_SIZE_BYTES};

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentResponse {
    pub id: Uuid,
    pub file_name: String,
    pub file_type: String,
    pub file_size_bytes: i64,
    pub total_pages: Option<i32>,
    pub total_chunks: i32,
    pub processing_status: String,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub processing_completed_at: Option<DateTime<Utc>>,
}

impl From<Document> for DocumentResponse {
    fn from(d: Document) -> Self {
        Self {
            id: d.id,
            file_name: d.original_file_name,
            file_type: d.file_type,
            file_size_bytes: d.file_size_bytes,
            total_pages: d.total_pages,
            total_chunks: d.total_chunks,
            processing_status: d.status,
            error_message: d.error_message,
            created_at: d.created_at,
            processing_completed_at: d.processing_completed_at,
        }
    }
}

struct UploadedFile {
    name: String,
    bytes: Vec<u8>,
}

fn extension_of(name: &str) -> Option<&str> {
    name.rsplit('.').next()
}

async fn ingest_one(
    state: &AppState,
    user_id: Uuid,
    chat_id: Uuid,
    file: UploadedFile,
) -> Result<Document, ApiError> {
    if file.bytes.len() as u64 > MAX_FILE_SIZE_BYTES {
        return Err(ApiError::BadRequest(format!(
            "{} exceeds max file size of {} bytes",
            file.name, MAX_FILE_SIZE_BYTES
        )));
    }
    let ext = extension_of(&file.name)
        .and_then(FileType::from_extension)
        .ok_or_else(|| ApiError::BadRequest(format!("unsupported file type: {}", file.name)))?;

    let mime_type = mime_guess_for(ext);

    let document = state
        .repo
        .create_document(
            user_id,
            chat_id,
            &file.name,
            &file.name,
            ext.as_str(),
            file.bytes.len() as i64,
            mime_type,
        )
        .await?;

    state
        .storage
        .save(document.id, ext.as_str(), &file.bytes)
        .await
        .map_err(|e| ApiError::Engine(e.into()))?;

    state
        .repo
        .enqueue_job(document.id, 0, state.settings.engine.job.max_attempts)
        .await?;

    Ok(document)
}

fn mime_guess_for(ext: FileType) -> &'static str {
    match ext {
        FileType::Pdf => "application/pdf",
        FileType::Ppt => "application/vnd.ms-powerpoint",
        FileType::Pptx => "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        FileType::Png => "image/png",
        FileType::Jpg | FileType::Jpeg => "image/jpeg",
        FileType::Txt => "text/plain",
    }
}

async fn read_multipart(
    mut multipart: Multipart,
) -> Result<(Option<Uuid>, Vec<UploadedFile>), ApiError> {
    let mut chat_id = None;
    let mut files = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("invalid multipart body: {e}")))?
    {
        match field.name().unwrap_or("") {
            "chatId" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("invalid chatId: {e}")))?;
                chat_id = Some(
                    text.parse::<Uuid>()
                        .map_err(|_| ApiError::BadRequest("chatId must be a uuid".to_string()))?,
                );
            }
            "file" | "files" => {
                let name = field
                    .file_name()
                    .map(str::to_string)
                    .ok_or_else(|| ApiError::BadRequest("missing file name".to_string()))?;
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("failed to read file: {e}")))?
                    .to_vec();
                files.push(UploadedFile { name, bytes });
            }
            _ => {}
        }
    }

    Ok((chat_id, files))
}

pub async fn upload(
    auth: AuthUser,
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<DocumentResponse>, ApiError> {
    let (chat_id, mut files) = read_multipart(multipart).await?;
    let chat_id = chat_id.ok_or_else(|| ApiError::BadRequest("chatId is required".to_string()))?;
    state.repo.get_chat(chat_id, auth.user_id).await?;

    let file = files
        .pop()
        .ok_or_else(|| ApiError::BadRequest("file is required".to_string()))?;

    let document = ingest_one(&state, auth.user_id, chat_id, file).await?;
    Ok(Json(document.into()))
}

pub async fn upload_bulk(
    auth: AuthUser,
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<Vec<DocumentResponse>>, ApiError> {
    let (chat_id, files) = read_multipart(multipart).await?;
    let chat_id = chat_id.ok_or_else(|| ApiError::BadRequest("chatId is required".to_string()))?;
    state.repo.get_chat(chat_id, auth.user_id).await?;

    if files.is_empty() {
        return Err(ApiError::BadRequest("at least one file is required".to_string()));
    }

    let mut documents = Vec::with_capacity(files.len());
    for file in files {
        let document = ingest_one(&state, auth.user_id, chat_id, file).await?;
        documents.push(document.into());
    }
    Ok(Json(documents))
}

#[derive(Debug, Deserialize)]
pub struct ListDocumentsQuery {
    pub chat_id: Uuid,
    #[serde(default)]
    pub page: i64,
    #[serde(default = "default_page_size")]
    pub size: i64,
}

fn default_page_size() -> i64 {
    20
}

pub async fn list(
    auth: AuthUser,
    State(state): State<AppState>,
    Query(q): Query<ListDocumentsQuery>,
) -> Result<Json<Vec<DocumentResponse>>, ApiError> {
    state.repo.get_chat(q.chat_id, auth.user_id).await?;
    let docs = state.repo.list_documents(q.chat_id, q.page, q.size).await?;
    Ok(Json(docs.into_iter().map(DocumentResponse::from).collect()))
}

pub async fn status(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(document_id): Path<Uuid>,
) -> Result<Json<DocumentResponse>, ApiError> {
    if !state
        .repo
        .check_user_document_access(auth.user_id, document_id)
        .await?
    {
        return Err(ApiError::NotFound(format!("document {document_id}")));
    }
    let document = state.repo.get_document(document_id).await?;
    Ok(Json(document.into()))
}

#[derive(Debug, Deserialize)]
pub struct DeleteDocumentQuery {
    pub chat_id: Uuid,
}

pub async fn delete(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(document_id): Path<Uuid>,
    Query(q): Query<DeleteDocumentQuery>,
) -> Result<(), ApiError> {
    state.repo.get_chat(q.chat_id, auth.user_id).await?;
    if !state
        .repo
        .check_user_document_access(auth.user_id, document_id)
        .await?
    {
        return Err(ApiError::NotFound(format!("document {document_id}")));
    }
    let document = state.repo.get_document(document_id).await?;
    state.vector_store.delete_by_document(document_id).await?;
    state
        .storage
        .delete(document_id, &document.file_type)
        .await
        .map_err(|e| ApiError::Engine(e.into()))?;
    state.repo.delete_document(document_id).await?;
    // Chunks for this chat changed — retrieval-derived cache entries are stale.
    state.cache.invalidate(q.chat_id).await?;
    Ok(())
}
