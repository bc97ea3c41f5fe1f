use crate::error::{EngineError, EngineResult};
use crate::token_bucket::TokenBucket;
use parking_lot::RwLock;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Classification `report_failure` callers pass in (spec.md §4.5's
/// `{RATE_LIMIT, AUTH, OTHER}` mapping).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyFailureKind {
    RateLimit,
    Auth,
    Other,
}

#[derive(Debug, Default)]
struct KeyHealth {
    consecutive_failures: u32,
    total_requests: u64,
    total_failures: u64,
    last_failure_time: Option<Instant>,
    disabled_until: Option<Instant>,
}

struct KeyEntry {
    key: String,
    bucket: TokenBucket,
    health: parking_lot::Mutex<KeyHealth>,
}

/// A handle to an acquired key; callers must invoke exactly one of
/// `report_success`/`report_failure` per acquisition (spec.md §4.2
/// invariant).
#[derive(Debug, Clone)]
pub struct AcquiredKey {
    pub index: usize,
    pub key: String,
}

pub struct ApiKeyPool {
    entries: RwLock<Vec<Arc<KeyEntry>>>,
    bucket_capacity: u32,
    bucket_refill_per_sec: f64,
    max_consecutive_failures: u32,
    disable_duration: Duration,
    max_wait_ms: u64,
}

impl ApiKeyPool {
    pub fn new(
        keys: Vec<String>,
        bucket_capacity: u32,
        bucket_refill_per_sec: f64,
        max_consecutive_failures: u32,
        disable_duration_secs: u64,
        max_wait_ms: u64,
    ) -> Self {
        let entries = keys
            .into_iter()
            .map(|key| {
                Arc::new(KeyEntry {
                    key,
                    bucket: TokenBucket::new(bucket_capacity, bucket_refill_per_sec),
                    health: parking_lot::Mutex::new(KeyHealth::default()),
                })
            })
            .collect();
        Self {
            entries: RwLock::new(entries),
            bucket_capacity,
            bucket_refill_per_sec,
            max_consecutive_failures,
            disable_duration: Duration::from_secs(disable_duration_secs),
            max_wait_ms,
        }
    }

    fn is_disabled(&self, entry: &KeyEntry) -> bool {
        let mut health = entry.health.lock();
        match health.disabled_until {
            Some(until) if Instant::now() < until => true,
            Some(_) => {
                // auto-recovers when now > disabledUntil
                health.disabled_until = None;
                health.consecutive_failures = 0;
                false
            }
            None => false,
        }
    }

    /// Chooses among non-disabled keys sorted by descending available
    /// tokens; tries each; if none succeeds, sleeps the minimum
    /// `wait_time_ms` across keys and loops until `max_wait_ms` elapses.
    pub async fn acquire(&self) -> EngineResult<AcquiredKey> {
        let deadline = Instant::now() + Duration::from_millis(self.max_wait_ms);
        loop {
            let entries = self.entries.read().clone();
            if entries.is_empty() {
                return Err(EngineError::NoAvailableKey);
            }
            let mut candidates: Vec<(usize, Arc<KeyEntry>)> = entries
                .into_iter()
                .enumerate()
                .filter(|(_, e)| !self.is_disabled(e))
                .collect();
            candidates.sort_by(|a, b| {
                b.1.bucket
                    .available_tokens()
                    .partial_cmp(&a.1.bucket.available_tokens())
                    .unwrap_or(std::cmp::Ordering::Equal)
            });

            for (idx, entry) in &candidates {
                if entry.bucket.try_acquire(1) {
                    return Ok(AcquiredKey {
                        index: *idx,
                        key: entry.key.clone(),
                    });
                }
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(EngineError::NoAvailableKey);
            }
            let min_wait = candidates
                .iter()
                .map(|(_, e)| e.bucket.wait_time_ms())
                .min()
                .unwrap_or(1000);
            let remaining = deadline - now;
            let wait = Duration::from_millis(min_wait.min(1000)).min(remaining);
            tokio::time::sleep(wait.max(Duration::from_millis(1))).await;
        }
    }

    /// Deterministic `keys[hash(docId) mod len(keys)]`; falls back to any
    /// healthy key if the assigned one is disabled.
    pub async fn acquire_for(&self, doc_id: Uuid) -> EngineResult<AcquiredKey> {
        let entries = self.entries.read().clone();
        if entries.is_empty() {
            return Err(EngineError::NoAvailableKey);
        }
        let mut hasher = DefaultHasher::new();
        doc_id.hash(&mut hasher);
        let idx = (hasher.finish() as usize) % entries.len();
        let entry = &entries[idx];
        if !self.is_disabled(entry) {
            entry.bucket.try_acquire(1);
            return Ok(AcquiredKey {
                index: idx,
                key: entry.key.clone(),
            });
        }
        self.acquire().await
    }

    pub fn report_success(&self, acquired: &AcquiredKey) {
        if let Some(entry) = self.entries.read().get(acquired.index) {
            let mut health = entry.health.lock();
            health.consecutive_failures = 0;
            health.total_requests += 1;
        }
    }

    pub fn report_failure(&self, acquired: &AcquiredKey, kind: KeyFailureKind) {
        let entries = self.entries.read();
        let Some(entry) = entries.get(acquired.index) else {
            return;
        };
        if kind == KeyFailureKind::RateLimit {
            entry.bucket.mark_depleted();
        }
        let mut health = entry.health.lock();
        health.consecutive_failures += 1;
        health.total_failures += 1;
        health.last_failure_time = Some(Instant::now());
        if health.consecutive_failures >= self.max_consecutive_failures {
            health.disabled_until = Some(Instant::now() + self.disable_duration);
        }
    }

    /// Merges new keys, never removing existing ones — allows hot reload
    /// from config without restart.
    pub fn update_keys(&self, keys: Vec<String>) {
        let mut entries = self.entries.write();
        let existing: std::collections::HashSet<String> =
            entries.iter().map(|e| e.key.clone()).collect();
        for key in keys {
            if !existing.contains(&key) {
                entries.push(Arc::new(KeyEntry {
                    key,
                    bucket: TokenBucket::new(self.bucket_capacity, self.bucket_refill_per_sec),
                    health: parking_lot::Mutex::new(KeyHealth::default()),
                }));
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(keys: &[&str]) -> ApiKeyPool {
        ApiKeyPool::new(
            keys.iter().map(|s| s.to_string()).collect(),
            15,
            15.0 / 60.0,
            3,
            300,
            5000,
        )
    }

    #[tokio::test]
    async fn acquire_returns_a_key() {
        let p = pool(&["a", "b"]);
        let k = p.acquire().await.unwrap();
        assert!(k.key == "a" || k.key == "b");
    }

    #[tokio::test]
    async fn acquire_for_is_deterministic() {
        let p = pool(&["a", "b", "c"]);
        let doc = Uuid::new_v4();
        let k1 = p.acquire_for(doc).await.unwrap();
        let k2 = p.acquire_for(doc).await.unwrap();
        assert_eq!(k1.index, k2.index);
    }

    #[tokio::test]
    async fn disables_after_max_consecutive_failures() {
        let p = pool(&["a"]);
        let k = p.acquire().await.unwrap();
        for _ in 0..3 {
            p.report_failure(&k, KeyFailureKind::Other);
        }
        let result = p.acquire().await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn report_success_resets_consecutive_failures() {
        let p = pool(&["a"]);
        let k = p.acquire().await.unwrap();
        p.report_failure(&k, KeyFailureKind::Other);
        p.report_success(&k);
        let entries = p.entries.read();
        let health = entries[0].health.lock();
        assert_eq!(health.consecutive_failures, 0);
    }

    #[test]
    fn update_keys_never_removes() {
        let p = pool(&["a"]);
        p.update_keys(vec!["a".to_string(), "b".to_string()]);
        assert_eq!(p.len(), 2);
    }
}
