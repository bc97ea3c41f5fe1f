use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Chat {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "UPPERCASE")]
pub enum DocumentStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Pending => "PENDING",
            DocumentStatus::Processing => "PROCESSING",
            DocumentStatus::Completed => "COMPLETED",
            DocumentStatus::Failed => "FAILED",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileType {
    Pdf,
    Ppt,
    Pptx,
    Png,
    Jpg,
    Jpeg,
    Txt,
}

impl FileType {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "pdf" => Some(FileType::Pdf),
            "ppt" => Some(FileType::Ppt),
            "pptx" => Some(FileType::Pptx),
            "png" => Some(FileType::Png),
            "jpg" => Some(FileType::Jpg),
            "jpeg" => Some(FileType::Jpeg),
            "txt" => Some(FileType::Txt),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FileType::Pdf => "pdf",
            FileType::Ppt => "ppt",
            FileType::Pptx => "pptx",
            FileType::Png => "png",
            FileType::Jpg => "jpg",
            FileType::Jpeg => "jpeg",
            FileType::Txt => "txt",
        }
    }
}

pub const MAX_FILE_SIZE_BYTES: u64 = 50 * 1024 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Document {
    pub id: Uuid,
    pub user_id: Uuid,
    pub chat_id: Uuid,
    pub file_name: String,
    pub original_file_name: String,
    pub file_type: String,
    pub file_size_bytes: i64,
    pub mime_type: String,
    pub total_pages: Option<i32>,
    pub total_chunks: i32,
    pub status: String,
    pub processing_started_at: Option<DateTime<Utc>>,
    pub processing_completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub id: Uuid,
    pub document_id: Uuid,
    pub user_id: Uuid,
    pub chat_id: Uuid,
    pub chunk_index: i32,
    pub content: String,
    pub content_hash: String,
    pub page_number: Option<i32>,
    pub slide_number: Option<i32>,
    pub section_title: Option<String>,
    pub embedding: Vec<f32>,
    pub token_count: i32,
    pub created_at: DateTime<Utc>,
}

/// Projection used by `knn` — deliberately excludes the `embedding` column
/// per spec.md §4.7/§9: reading the vector column for every retrieved row
/// is wasted wire cost and is never needed downstream of retrieval.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct RetrievedChunk {
    pub id: Uuid,
    pub document_id: Uuid,
    pub chunk_index: i32,
    pub content: String,
    pub page_number: Option<i32>,
    pub slide_number: Option<i32>,
    pub section_title: Option<String>,
    pub token_count: i32,
    pub file_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "QUEUED",
            JobStatus::Processing => "PROCESSING",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Failed => "FAILED",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ProcessingJob {
    pub id: Uuid,
    pub document_id: Uuid,
    pub status: String,
    pub priority: i32,
    pub attempts: i32,
    pub max_attempts: i32,
    pub last_error: Option<String>,
    pub locked_by: Option<String>,
    pub locked_until: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct QueryCacheRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub chat_id: Uuid,
    pub query_text: String,
    pub query_hash: String,
    pub response_text: String,
    pub sources_used: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub hit_count: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct QueryHistory {
    pub id: Uuid,
    pub user_id: Uuid,
    pub chat_id: Uuid,
    pub query_text: String,
    pub marks_requested: Option<i32>,
    pub answer_text: String,
    pub sources_used: serde_json::Value,
    pub retrieval_time_ms: i64,
    pub generation_time_ms: i64,
    pub total_time_ms: i64,
    pub chunks_retrieved: i32,
    pub llm_calls_used: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, sqlx::FromRow)]
pub struct ApiKeyUsage {
    pub key_identifier: String,
    pub minute_bucket: i64,
    pub request_count: i32,
    pub day_bucket: i64,
    pub daily_request_count: i32,
    pub consecutive_failures: i32,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_failure_at: Option<DateTime<Utc>>,
}

/// Retrieval scope for C7's `knn`: `(user, chat?, documentIds?, crossChat)`.
#[derive(Debug, Clone, Default)]
pub struct RetrievalScope {
    pub chat_id: Option<Uuid>,
    pub document_ids: Option<Vec<Uuid>>,
    pub allow_cross_chat: bool,
}

/// `(pageContents[], pageTitles[])` extractor output, 1-indexed pages.
#[derive(Debug, Clone, Default)]
pub struct ExtractionResult {
    pub page_contents: Vec<String>,
    pub page_titles: Vec<Option<String>>,
    pub total_pages: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ProcessingMode {
    Cached,
    SingleCall,
    MapReduce,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    pub document_id: Uuid,
    pub file_name: String,
    pub page_number: Option<i32>,
    pub slide_number: Option<i32>,
    pub excerpt: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryMetadata {
    pub retrieval_time_ms: i64,
    pub generation_time_ms: i64,
    pub total_time_ms: i64,
    pub chunks_used: usize,
    pub tokens_used: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    pub answer: String,
    pub sources: Vec<Source>,
    pub metadata: QueryMetadata,
    pub processing_mode: ProcessingMode,
    pub cache_hit: bool,
    pub llm_calls_used: i32,
}
