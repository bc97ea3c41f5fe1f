use crate::error::{EngineError, EngineResult};
use crate::key_pool::{ApiKeyPool, KeyFailureKind};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Wraps the embedding HTTP API; consumes the API Key Pool (C2) for
/// per-call key choice (spec.md §4.5).
pub struct EmbeddingService {
    client: reqwest::Client,
    base_url: String,
    model: String,
    dimension: usize,
    batch_max: usize,
    min_interval_ms: u64,
    max_retries: u32,
    key_pool: Arc<ApiKeyPool>,
    last_request: Mutex<Option<std::time::Instant>>,
}

impl EmbeddingService {
    pub fn new(
        base_url: String,
        model: String,
        dimension: usize,
        batch_max: usize,
        min_interval_ms: u64,
        max_retries: u32,
        key_pool: Arc<ApiKeyPool>,
    ) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(120))
                .build()
                .expect("reqwest client build should not fail with static config"),
            base_url,
            model,
            dimension,
            batch_max,
            min_interval_ms,
            max_retries,
            key_pool,
            last_request: Mutex::new(None),
        }
    }

    async fn throttle(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(t) = *last {
            let elapsed = t.elapsed();
            let min = Duration::from_millis(self.min_interval_ms);
            if elapsed < min {
                tokio::time::sleep(min - elapsed).await;
            }
        }
        *last = Some(std::time::Instant::now());
    }

    /// Acquires a key via the pool's generic round robin, posts `text`,
    /// validates the returned dimension equals D, retries up to
    /// `max_retries` with exponential backoff on 429/5xx.
    pub async fn embed(&self, text: &str) -> EngineResult<Vec<f32>> {
        self.embed_inner(text, None).await
    }

    /// Same as `embed`, but acquires the document's deterministically
    /// assigned key (C2 `acquire_for`) instead of the generic round robin
    /// (spec.md §4.8 step 5).
    pub async fn embed_for(&self, text: &str, document_id: uuid::Uuid) -> EngineResult<Vec<f32>> {
        self.embed_inner(text, Some(document_id)).await
    }

    async fn embed_inner(
        &self,
        text: &str,
        document_id: Option<uuid::Uuid>,
    ) -> EngineResult<Vec<f32>> {
        let mut attempt = 0;
        loop {
            self.throttle().await;
            let acquired = match document_id {
                Some(doc_id) => self.key_pool.acquire_for(doc_id).await?,
                None => self.key_pool.acquire().await?,
            };

            let body = serde_json::json!({
                "model": self.model,
                "input": text,
            });

            let result = self
                .client
                .post(format!("{}/v1/embeddings", self.base_url))
                .bearer_auth(&acquired.key)
                .json(&body)
                .send()
                .await;

            let resp = match result {
                Ok(r) => r,
                Err(e) => {
                    self.key_pool.report_failure(&acquired, KeyFailureKind::Other);
                    if attempt >= self.max_retries {
                        return Err(EngineError::Http(e));
                    }
                    attempt += 1;
                    tokio::time::sleep(backoff(attempt)).await;
                    continue;
                }
            };

            let status = resp.status().as_u16();
            if !resp.status().is_success() {
                let kind = match status {
                    429 => KeyFailureKind::RateLimit,
                    401 | 403 => KeyFailureKind::Auth,
                    _ => KeyFailureKind::Other,
                };
                self.key_pool.report_failure(&acquired, kind);
                let retryable = status == 429 || (500..=599).contains(&status);
                if retryable && attempt < self.max_retries {
                    attempt += 1;
                    tokio::time::sleep(backoff(attempt)).await;
                    continue;
                }
                return Err(EngineError::UpstreamFailure(format!(
                    "embedding request failed with status {status}"
                )));
            }

            let value: serde_json::Value = resp.json().await?;
            let embedding: Vec<f32> = value["data"][0]["embedding"]
                .as_array()
                .ok_or_else(|| EngineError::Internal("missing data[0].embedding".to_string()))?
                .iter()
                .map(|v| v.as_f64().unwrap_or(0.0) as f32)
                .collect();

            if embedding.len() != self.dimension {
                self.key_pool.report_failure(&acquired, KeyFailureKind::Other);
                return Err(EngineError::EmbeddingDimensionMismatch {
                    expected: self.dimension,
                    actual: embedding.len(),
                });
            }

            self.key_pool.report_success(&acquired);
            return Ok(embedding);
        }
    }

    /// Splits `texts` into sub-batches of at most `batch_max`, embedding
    /// each sub-batch sequentially with a global inter-request minimum
    /// delay to respect ~100 RPM embedding endpoints.
    pub async fn embed_batch(&self, texts: &[String]) -> EngineResult<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(self.batch_max) {
            for text in chunk {
                out.push(self.embed(text).await?);
            }
        }
        Ok(out)
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }
}

fn backoff(attempt: u32) -> Duration {
    Duration::from_millis(200 * (1u64 << attempt.min(5)))
}

/// Canonical `"[f1,f2,…,fD]"` serialization required by the vector column.
pub fn to_vector_string(vec: &[f32]) -> String {
    let mut s = String::with_capacity(vec.len() * 8 + 2);
    s.push('[');
    for (i, v) in vec.iter().enumerate() {
        if i > 0 {
            s.push(',');
        }
        s.push_str(&v.to_string());
    }
    s.push(']');
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vector_string_format() {
        assert_eq!(to_vector_string(&[1.0, 2.5, -3.0]), "[1,2.5,-3]");
        assert_eq!(to_vector_string(&[]), "[]");
    }
}
