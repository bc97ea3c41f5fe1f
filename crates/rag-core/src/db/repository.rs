use crate::db::pool::DbPool;
use crate::error::{EngineError, EngineResult};
use crate::models::{
    Chat, Document, ProcessingJob, QueryCacheRow, QueryHistory, User,
};
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Shared CRUD surface used by both `rag-worker` (documents, jobs) and
/// `rag-api` (chats, history, cache), grounded on
/// `rag-api-server/src/database/repository.rs` and
/// `rag-embedding-worker/src/database/repository.rs`.
#[derive(Clone)]
pub struct Repository {
    db: DbPool,
}

impl Repository {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    // ---- Users -----------------------------------------------------

    pub async fn create_user(&self, email: &str, password_hash: &str) -> EngineResult<User> {
        let user = sqlx::query_as::<_, User>(
            "INSERT INTO users (id, email, password_hash, active, created_at)
             VALUES ($1, $2, $3, true, $4) RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(email)
        .bind(password_hash)
        .bind(Utc::now())
        .fetch_one(self.db.get())
        .await?;
        Ok(user)
    }

    pub async fn get_user_by_email(&self, email: &str) -> EngineResult<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(self.db.get())
            .await?;
        Ok(user)
    }

    // ---- Chats -------------------------------------------------------

    pub async fn create_chat(&self, user_id: Uuid, title: &str) -> EngineResult<Chat> {
        let chat = sqlx::query_as::<_, Chat>(
            "INSERT INTO chats (id, user_id, title, created_at) VALUES ($1,$2,$3,$4) RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(title)
        .bind(Utc::now())
        .fetch_one(self.db.get())
        .await?;
        Ok(chat)
    }

    pub async fn list_chats(&self, user_id: Uuid) -> EngineResult<Vec<Chat>> {
        let chats = sqlx::query_as::<_, Chat>(
            "SELECT * FROM chats WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(self.db.get())
        .await?;
        Ok(chats)
    }

    pub async fn get_chat(&self, chat_id: Uuid, user_id: Uuid) -> EngineResult<Chat> {
        sqlx::query_as::<_, Chat>("SELECT * FROM chats WHERE id = $1 AND user_id = $2")
            .bind(chat_id)
            .bind(user_id)
            .fetch_optional(self.db.get())
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("chat {chat_id}")))
    }

    pub async fn update_chat_title(
        &self,
        chat_id: Uuid,
        user_id: Uuid,
        title: &str,
    ) -> EngineResult<Chat> {
        sqlx::query_as::<_, Chat>(
            "UPDATE chats SET title = $3 WHERE id = $1 AND user_id = $2 RETURNING *",
        )
        .bind(chat_id)
        .bind(user_id)
        .bind(title)
        .fetch_optional(self.db.get())
        .await?
        .ok_or_else(|| EngineError::NotFound(format!("chat {chat_id}")))
    }

    pub async fn delete_chat(&self, chat_id: Uuid, user_id: Uuid) -> EngineResult<()> {
        sqlx::query("DELETE FROM chats WHERE id = $1 AND user_id = $2")
            .bind(chat_id)
            .bind(user_id)
            .execute(self.db.get())
            .await?;
        Ok(())
    }

    // ---- Documents -----------------------------------------------------

    pub async fn create_document(
        &self,
        user_id: Uuid,
        chat_id: Uuid,
        file_name: &str,
        original_file_name: &str,
        file_type: &str,
        file_size_bytes: i64,
        mime_type: &str,
    ) -> EngineResult<Document> {
        let now = Utc::now();
        let doc = sqlx::query_as::<_, Document>(
            "INSERT INTO documents
                (id, user_id, chat_id, file_name, original_file_name, file_type,
                 file_size_bytes, mime_type, total_pages, total_chunks, status,
                 processing_started_at, processing_completed_at, error_message,
                 created_at, updated_at)
             VALUES ($1,$2,$3,$4,$5,$6,$7,$8,NULL,0,'PENDING',NULL,NULL,NULL,$9,$9)
             RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(chat_id)
        .bind(file_name)
        .bind(original_file_name)
        .bind(file_type)
        .bind(file_size_bytes)
        .bind(mime_type)
        .bind(now)
        .fetch_one(self.db.get())
        .await?;
        Ok(doc)
    }

    pub async fn get_document(&self, document_id: Uuid) -> EngineResult<Document> {
        sqlx::query_as::<_, Document>("SELECT * FROM documents WHERE id = $1")
            .bind(document_id)
            .fetch_optional(self.db.get())
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("document {document_id}")))
    }

    pub async fn list_documents(
        &self,
        chat_id: Uuid,
        page: i64,
        size: i64,
    ) -> EngineResult<Vec<Document>> {
        let docs = sqlx::query_as::<_, Document>(
            "SELECT * FROM documents WHERE chat_id = $1
             ORDER BY created_at DESC LIMIT $2 OFFSET $3",
        )
        .bind(chat_id)
        .bind(size)
        .bind(page * size)
        .fetch_all(self.db.get())
        .await?;
        Ok(docs)
    }

    pub async fn check_user_document_access(
        &self,
        user_id: Uuid,
        document_id: Uuid,
    ) -> EngineResult<bool> {
        let exists: Option<(Uuid,)> = sqlx::query_as(
            "SELECT id FROM documents WHERE id = $1 AND user_id = $2",
        )
        .bind(document_id)
        .bind(user_id)
        .fetch_optional(self.db.get())
        .await?;
        Ok(exists.is_some())
    }

    /// Begins processing: deletes any pre-existing chunks (re-index
    /// support) and sets `status=PROCESSING, processingStartedAt=now` — a
    /// short transaction (spec.md §4.8 step 1).
    pub async fn begin_processing(&self, document_id: Uuid) -> EngineResult<()> {
        let mut tx = self.db.get().begin().await?;
        sqlx::query("DELETE FROM document_chunks WHERE document_id = $1")
            .bind(document_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "UPDATE documents SET status='PROCESSING', processing_started_at=$2, updated_at=$2
             WHERE id = $1",
        )
        .bind(document_id)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn complete_document(
        &self,
        document_id: Uuid,
        total_pages: i32,
        total_chunks: i32,
    ) -> EngineResult<()> {
        sqlx::query(
            "UPDATE documents
             SET status='COMPLETED', total_pages=$2, total_chunks=$3,
                 processing_completed_at=$4, updated_at=$4
             WHERE id = $1",
        )
        .bind(document_id)
        .bind(total_pages)
        .bind(total_chunks)
        .bind(Utc::now())
        .execute(self.db.get())
        .await?;
        Ok(())
    }

    pub async fn fail_document(&self, document_id: Uuid, error_message: &str) -> EngineResult<()> {
        let truncated: String = error_message.chars().take(2000).collect();
        sqlx::query(
            "UPDATE documents SET status='FAILED', error_message=$2, updated_at=$3 WHERE id = $1",
        )
        .bind(document_id)
        .bind(truncated)
        .bind(Utc::now())
        .execute(self.db.get())
        .await?;
        Ok(())
    }

    pub async fn delete_document(&self, document_id: Uuid) -> EngineResult<()> {
        sqlx::query("DELETE FROM documents WHERE id = $1")
            .bind(document_id)
            .execute(self.db.get())
            .await?;
        Ok(())
    }

    // ---- Processing jobs -------------------------------------------------

    pub async fn enqueue_job(&self, document_id: Uuid, priority: i32, max_attempts: i32) -> EngineResult<ProcessingJob> {
        let job = sqlx::query_as::<_, ProcessingJob>(
            "INSERT INTO processing_jobs
                (id, document_id, status, priority, attempts, max_attempts, last_error,
                 locked_by, locked_until, created_at, started_at, completed_at)
             VALUES ($1,$2,'QUEUED',$3,0,$4,NULL,NULL,NULL,$5,NULL,NULL)
             RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(document_id)
        .bind(priority)
        .bind(max_attempts)
        .bind(Utc::now())
        .fetch_one(self.db.get())
        .await?;
        Ok(job)
    }

    /// Pessimistic-locked lease of up to `batch_size` queued (or
    /// lease-expired) jobs, ordered by priority then age (spec.md §4.9
    /// step 1). Runs in its own transaction separate from per-job
    /// processing transactions.
    pub async fn lease_jobs(&self, batch_size: i64) -> EngineResult<Vec<ProcessingJob>> {
        let mut tx = self.db.get().begin().await?;
        let now = Utc::now();
        let jobs = sqlx::query_as::<_, ProcessingJob>(
            "SELECT * FROM processing_jobs
             WHERE status = 'QUEUED' OR (status = 'PROCESSING' AND locked_until < $1)
             ORDER BY priority ASC, created_at ASC
             LIMIT $2
             FOR UPDATE SKIP LOCKED",
        )
        .bind(now)
        .bind(batch_size)
        .fetch_all(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(jobs)
    }

    pub async fn start_job(
        &self,
        job_id: Uuid,
        worker_id: &str,
        lock_duration_secs: i64,
    ) -> EngineResult<()> {
        let now = Utc::now();
        sqlx::query(
            "UPDATE processing_jobs
             SET status='PROCESSING', locked_by=$2, locked_until=$3, started_at=$4,
                 attempts = attempts + 1
             WHERE id = $1",
        )
        .bind(job_id)
        .bind(worker_id)
        .bind(now + chrono::Duration::seconds(lock_duration_secs))
        .bind(now)
        .execute(self.db.get())
        .await?;
        Ok(())
    }

    pub async fn complete_job(&self, job_id: Uuid) -> EngineResult<()> {
        sqlx::query(
            "UPDATE processing_jobs
             SET status='COMPLETED', completed_at=$2, locked_by=NULL, locked_until=NULL
             WHERE id = $1",
        )
        .bind(job_id)
        .bind(Utc::now())
        .execute(self.db.get())
        .await?;
        Ok(())
    }

    /// Requeues on failure if `attempts < maxAttempts`, else a terminal
    /// `FAILED` (spec.md §4.9 step 3).
    pub async fn fail_job(&self, job: &ProcessingJob, error_message: &str) -> EngineResult<bool> {
        let truncated: String = error_message.chars().take(2000).collect();
        if job.attempts < job.max_attempts {
            sqlx::query(
                "UPDATE processing_jobs
                 SET status='QUEUED', last_error=$2, locked_by=NULL, locked_until=NULL
                 WHERE id = $1",
            )
            .bind(job.id)
            .bind(&truncated)
            .execute(self.db.get())
            .await?;
            Ok(false)
        } else {
            sqlx::query(
                "UPDATE processing_jobs
                 SET status='FAILED', last_error=$2, completed_at=$3
                 WHERE id = $1",
            )
            .bind(job.id)
            .bind(&truncated)
            .bind(Utc::now())
            .execute(self.db.get())
            .await?;
            Ok(true)
        }
    }

    // ---- Query history --------------------------------------------------

    #[allow(clippy::too_many_arguments)]
    pub async fn insert_query_history(
        &self,
        user_id: Uuid,
        chat_id: Uuid,
        query_text: &str,
        marks_requested: Option<i32>,
        answer_text: &str,
        sources_used: serde_json::Value,
        retrieval_time_ms: i64,
        generation_time_ms: i64,
        total_time_ms: i64,
        chunks_retrieved: i32,
        llm_calls_used: i32,
    ) -> EngineResult<QueryHistory> {
        let row = sqlx::query_as::<_, QueryHistory>(
            "INSERT INTO query_history
                (id, user_id, chat_id, query_text, marks_requested, answer_text, sources_used,
                 retrieval_time_ms, generation_time_ms, total_time_ms, chunks_retrieved,
                 llm_calls_used, created_at)
             VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13)
             RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(chat_id)
        .bind(query_text)
        .bind(marks_requested)
        .bind(answer_text)
        .bind(sources_used)
        .bind(retrieval_time_ms)
        .bind(generation_time_ms)
        .bind(total_time_ms)
        .bind(chunks_retrieved)
        .bind(llm_calls_used)
        .bind(Utc::now())
        .fetch_one(self.db.get())
        .await?;
        Ok(row)
    }

    pub async fn list_query_history(&self, chat_id: Uuid) -> EngineResult<Vec<QueryHistory>> {
        let rows = sqlx::query_as::<_, QueryHistory>(
            "SELECT * FROM query_history WHERE chat_id = $1 ORDER BY created_at DESC",
        )
        .bind(chat_id)
        .fetch_all(self.db.get())
        .await?;
        Ok(rows)
    }

    // ---- Query cache (raw row access; semantics live in cache.rs) -----

    pub async fn find_cache_by_hash(
        &self,
        chat_id: Uuid,
        query_hash: &str,
        now: DateTime<Utc>,
    ) -> EngineResult<Option<QueryCacheRow>> {
        let row = sqlx::query_as::<_, QueryCacheRow>(
            "SELECT * FROM query_cache WHERE chat_id = $1 AND query_hash = $2 AND expires_at > $3 LIMIT 1",
        )
        .bind(chat_id)
        .bind(query_hash)
        .bind(now)
        .fetch_optional(self.db.get())
        .await?;
        Ok(row)
    }

    pub async fn increment_cache_hit(&self, id: Uuid) -> EngineResult<()> {
        sqlx::query("UPDATE query_cache SET hit_count = hit_count + 1 WHERE id = $1")
            .bind(id)
            .execute(self.db.get())
            .await?;
        Ok(())
    }

    pub async fn delete_expired_cache(&self, now: DateTime<Utc>) -> EngineResult<()> {
        sqlx::query("DELETE FROM query_cache WHERE expires_at < $1")
            .bind(now)
            .execute(self.db.get())
            .await?;
        Ok(())
    }

    pub async fn invalidate_cache(&self, chat_id: Uuid) -> EngineResult<()> {
        sqlx::query("DELETE FROM query_cache WHERE chat_id = $1")
            .bind(chat_id)
            .execute(self.db.get())
            .await?;
        Ok(())
    }

    /// Nearest neighbours (up to `limit`) among this chat's non-expired
    /// cache rows, ordered by cosine distance. The semantic-vs-threshold
    /// decision, and the final pick among these candidates, is left to the
    /// caller (`cache.rs`), which re-ranks by its own cosine similarity
    /// rather than trusting `pgvector`'s distance alone — the stored
    /// embedding round-trips through text formatting on the way in.
    pub async fn nearest_cache_rows(
        &self,
        chat_id: Uuid,
        query_vec_str: &str,
        now: DateTime<Utc>,
        limit: i64,
    ) -> EngineResult<Vec<(QueryCacheRow, Vec<f32>)>> {
        use sqlx::Row;

        let rows = sqlx::query(
            "SELECT id, user_id, chat_id, query_text, query_hash, response_text, sources_used,
                    created_at, expires_at, hit_count, query_embedding
             FROM query_cache
             WHERE chat_id = $1 AND expires_at > $2
             ORDER BY query_embedding <=> $3::vector ASC
             LIMIT $4",
        )
        .bind(chat_id)
        .bind(now)
        .bind(query_vec_str)
        .bind(limit.max(1))
        .fetch_all(self.db.get())
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let cache_row = QueryCacheRow {
                id: row.try_get("id")?,
                user_id: row.try_get("user_id")?,
                chat_id: row.try_get("chat_id")?,
                query_text: row.try_get("query_text")?,
                query_hash: row.try_get("query_hash")?,
                response_text: row.try_get("response_text")?,
                sources_used: row.try_get("sources_used")?,
                created_at: row.try_get("created_at")?,
                expires_at: row.try_get("expires_at")?,
                hit_count: row.try_get("hit_count")?,
            };
            let embedding: pgvector::Vector = row.try_get("query_embedding")?;
            out.push((cache_row, embedding.to_vec()));
        }
        Ok(out)
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn upsert_cache_row(
        &self,
        chat_id: Uuid,
        user_id: Uuid,
        query_text: &str,
        query_hash: &str,
        query_vec_str: &str,
        response_text: &str,
        sources_used: serde_json::Value,
        expires_at: DateTime<Utc>,
    ) -> EngineResult<()> {
        let result = sqlx::query(
            "INSERT INTO query_cache
                (id, user_id, chat_id, query_text, query_hash, response_text, sources_used,
                 query_embedding, created_at, expires_at, hit_count)
             VALUES ($1,$2,$3,$4,$5,$6,$7,$8::vector,$9,$10,0)
             ON CONFLICT (chat_id, query_hash) DO NOTHING",
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(chat_id)
        .bind(query_text)
        .bind(query_hash)
        .bind(response_text)
        .bind(sources_used)
        .bind(query_vec_str)
        .bind(Utc::now())
        .bind(expires_at)
        .execute(self.db.get())
        .await;

        // Duplicate-key errors are swallowed per spec.md §4.10 — a
        // concurrent writer having already inserted the row wins.
        if let Err(e) = result {
            tracing::warn!("query_cache upsert swallowed: {e}");
        }
        Ok(())
    }
}
