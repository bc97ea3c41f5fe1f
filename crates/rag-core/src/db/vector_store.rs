use crate::db::pool::DbPool;
use crate::embedding::to_vector_string;
use crate::error::EngineResult;
use crate::models::{RetrievalScope, RetrievedChunk};
use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

/// A chunk ready to be persisted, embedding included.
#[derive(Debug, Clone)]
pub struct NewChunk {
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
}

/// Persistence contract against a relational store with a dense-vector
/// column supporting cosine distance (spec.md §4.7).
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn batch_insert(&self, chunks: &[NewChunk]) -> EngineResult<()>;

    async fn knn(
        &self,
        user_id: Uuid,
        query_vec: &[f32],
        scope: &RetrievalScope,
        limit: i64,
    ) -> EngineResult<Vec<RetrievedChunk>>;

    async fn delete_by_document(&self, document_id: Uuid) -> EngineResult<()>;
    async fn delete_by_chat(&self, chat_id: Uuid) -> EngineResult<()>;
}

pub struct PgVectorStore {
    db: DbPool,
}

impl PgVectorStore {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl VectorStore for PgVectorStore {
    /// One transaction; each row inserts the full chunk including its
    /// embedding.
    async fn batch_insert(&self, chunks: &[NewChunk]) -> EngineResult<()> {
        if chunks.is_empty() {
            return Ok(());
        }
        let mut tx = self.db.get().begin().await?;
        let now = Utc::now();
        for c in chunks {
            sqlx::query(
                "INSERT INTO document_chunks
                 (id, document_id, user_id, chat_id, chunk_index, content, content_hash,
                  page_number, slide_number, section_title, embedding, token_count, created_at)
                 VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11::vector,$12,$13)",
            )
            .bind(c.id)
            .bind(c.document_id)
            .bind(c.user_id)
            .bind(c.chat_id)
            .bind(c.chunk_index)
            .bind(&c.content)
            .bind(&c.content_hash)
            .bind(c.page_number)
            .bind(c.slide_number)
            .bind(&c.section_title)
            .bind(to_vector_string(&c.embedding))
            .bind(c.token_count)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Joins chunk→document filtering `document.status = COMPLETED`, scopes
    /// by chat unless `allowCrossChat`, optionally narrows to
    /// `documentIds`, orders by cosine distance ascending, and — per
    /// spec.md §9 — never loads the `embedding` column for these rows.
    async fn knn(
        &self,
        user_id: Uuid,
        query_vec: &[f32],
        scope: &RetrievalScope,
        limit: i64,
    ) -> EngineResult<Vec<RetrievedChunk>> {
        if !scope.allow_cross_chat && scope.chat_id.is_none() {
            return Ok(Vec::new());
        }

        let mut qb = sqlx::QueryBuilder::new(
            "SELECT c.id, c.document_id, c.chunk_index, c.content, c.page_number,
                    c.slide_number, c.section_title, c.token_count, d.file_name
             FROM document_chunks c
             JOIN documents d ON d.id = c.document_id
             WHERE d.status = 'COMPLETED' AND c.user_id = ",
        );
        qb.push_bind(user_id);

        if !scope.allow_cross_chat {
            if let Some(chat_id) = scope.chat_id {
                qb.push(" AND c.chat_id = ");
                qb.push_bind(chat_id);
            }
        }

        if let Some(doc_ids) = &scope.document_ids {
            if !doc_ids.is_empty() {
                qb.push(" AND c.document_id = ANY(");
                qb.push_bind(doc_ids.clone());
                qb.push(")");
            }
        }

        qb.push(" ORDER BY c.embedding <=> ");
        qb.push_bind(to_vector_string(query_vec));
        qb.push("::vector ASC LIMIT ");
        qb.push_bind(limit);

        let rows = qb.build_query_as::<RetrievedChunk>().fetch_all(self.db.get()).await?;
        Ok(rows)
    }

    async fn delete_by_document(&self, document_id: Uuid) -> EngineResult<()> {
        sqlx::query("DELETE FROM document_chunks WHERE document_id = $1")
            .bind(document_id)
            .execute(self.db.get())
            .await?;
        Ok(())
    }

    async fn delete_by_chat(&self, chat_id: Uuid) -> EngineResult<()> {
        sqlx::query("DELETE FROM document_chunks WHERE chat_id = $1")
            .bind(chat_id)
            .execute(self.db.get())
            .await?;
        Ok(())
    }
}
