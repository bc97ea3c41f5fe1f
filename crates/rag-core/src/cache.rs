use crate::db::repository::Repository;
use crate::embedding::{to_vector_string, EmbeddingService};
use crate::error::EngineResult;
use base64::Engine as _;
use chrono::{Duration as ChronoDuration, Utc};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use uuid::Uuid;

/// Two-level query cache (C10): exact-hash plus semantic-similarity,
/// grounded on `rag-api-server/src/utils/similarity.rs`'s
/// `cosine_similarity` combined with the repository's cache row queries.
pub struct QueryCache {
    repo: Repository,
    embedding: Arc<EmbeddingService>,
    semantic_threshold: f32,
    ttl_hours: i64,
    knn_limit: i64,
}

/// A resolved cache hit, already accounted (`hit_count` incremented).
#[derive(Debug, Clone)]
pub struct CacheHit {
    pub response_text: String,
    pub sources_used: serde_json::Value,
}

impl QueryCache {
    pub fn new(
        repo: Repository,
        embedding: Arc<EmbeddingService>,
        semantic_threshold: f32,
        ttl_hours: i64,
        knn_limit: i64,
    ) -> Self {
        Self {
            repo,
            embedding,
            semantic_threshold,
            ttl_hours,
            knn_limit,
        }
    }

    /// `lower(question) with non-alphanumeric→space, whitespace collapsed,
    /// trimmed`. Idempotent: `normalize(normalize(s)) == normalize(s)`.
    pub fn normalize(question: &str) -> String {
        let lowered = question.to_lowercase();
        let mut out = String::with_capacity(lowered.len());
        let mut last_was_space = false;
        for ch in lowered.chars() {
            if ch.is_alphanumeric() {
                out.push(ch);
                last_was_space = false;
            } else if !last_was_space {
                out.push(' ');
                last_was_space = true;
            }
        }
        out.trim().to_string()
    }

    /// `base64(sha256(normalized))`.
    pub fn hash(normalized: &str) -> String {
        let digest = Sha256::digest(normalized.as_bytes());
        base64::engine::general_purpose::STANDARD.encode(digest)
    }

    /// Exact-hash then semantic-similarity lookup, per spec.md §4.10.
    /// Deletes expired rows first (amortized cleanup).
    pub async fn find(&self, chat_id: Uuid, question: &str) -> EngineResult<Option<CacheHit>> {
        let now = Utc::now();
        self.repo.delete_expired_cache(now).await?;

        let normalized = Self::normalize(question);
        let hash = Self::hash(&normalized);

        if let Some(row) = self.repo.find_cache_by_hash(chat_id, &hash, now).await? {
            self.repo.increment_cache_hit(row.id).await?;
            return Ok(Some(CacheHit {
                response_text: row.response_text,
                sources_used: row.sources_used,
            }));
        }

        let query_vec = self.embedding.embed(&normalized).await?;
        let candidates = self
            .repo
            .nearest_cache_rows(chat_id, &to_vector_string(&query_vec), now, self.knn_limit)
            .await?;

        let best = candidates
            .into_iter()
            .map(|(row, candidate_vec)| {
                let similarity = cosine_similarity(&query_vec, &candidate_vec);
                (row, similarity)
            })
            .max_by(|(_, a), (_, b)| a.total_cmp(b));

        if let Some((row, similarity)) = best {
            if similarity >= self.semantic_threshold {
                self.repo.increment_cache_hit(row.id).await?;
                return Ok(Some(CacheHit {
                    response_text: row.response_text,
                    sources_used: row.sources_used,
                }));
            }
        }

        Ok(None)
    }

    /// Upserts with `expiresAt = now + ttl_hours`, `hitCount = 0`.
    /// Duplicate-key errors are swallowed by the repository layer.
    pub async fn store(
        &self,
        chat_id: Uuid,
        user_id: Uuid,
        question: &str,
        response_text: &str,
        sources_used: serde_json::Value,
    ) -> EngineResult<()> {
        let normalized = Self::normalize(question);
        let hash = Self::hash(&normalized);
        let query_vec = self.embedding.embed(&normalized).await?;
        let expires_at = Utc::now() + ChronoDuration::hours(self.ttl_hours);

        self.repo
            .upsert_cache_row(
                chat_id,
                user_id,
                question,
                &hash,
                &to_vector_string(&query_vec),
                response_text,
                sources_used,
                expires_at,
            )
            .await
    }

    /// Native delete by `chatId`, called when documents in that chat change.
    pub async fn invalidate(&self, chat_id: Uuid) -> EngineResult<()> {
        self.repo.invalidate_cache(chat_id).await
    }
}

/// Cosine similarity = `1 − cosine distance`.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_is_idempotent() {
        let s = "WHAT IS AES??";
        let n1 = QueryCache::normalize(s);
        let n2 = QueryCache::normalize(&n1);
        assert_eq!(n1, n2);
        assert_eq!(n1, "what is aes");
    }

    #[test]
    fn normalize_collapses_whitespace_and_punctuation() {
        assert_eq!(
            QueryCache::normalize("  Hello,   World!!  "),
            "hello world"
        );
    }

    #[test]
    fn hash_is_stable() {
        let a = QueryCache::hash("what is aes");
        let b = QueryCache::hash("what is aes");
        assert_eq!(a, b);
    }

    #[test]
    fn cosine_similarity_identical_vectors_is_one() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_similarity_orthogonal_is_zero() {
        let a = vec![1.0, 0.0];
        let b = vec![0.0, 1.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }
}
