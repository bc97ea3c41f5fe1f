use crate::error::EngineError;
use crate::provider::ProviderClient;
use parking_lot::Mutex;
use rand::seq::SliceRandom;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

struct ProviderState {
    name: String,
    api_key: String,
    client: Arc<dyn ProviderClient>,
    rpm: u32,
    requests_this_minute: AtomicU32,
    consecutive_failures: AtomicU32,
    last_failure_time: Mutex<Option<Instant>>,
}

/// Maintains per-provider state and a weighted round-robin slot array; one
/// slot per `(provider, i < rpm)` so each provider gets traffic share
/// proportional to its configured RPM (spec.md §4.4).
pub struct WeightedRouter {
    providers: Vec<ProviderState>,
    slots: Mutex<Vec<usize>>,
    cursor: AtomicU32,
    max_retries: u32,
    retry_delay_ms: u64,
    unavailable_threshold: u32,
    cooldown: Duration,
}

pub struct RouterProviderConfig {
    pub name: String,
    pub api_key: String,
    pub client: Arc<dyn ProviderClient>,
    pub rpm: u32,
}

impl WeightedRouter {
    pub fn new(
        providers: Vec<RouterProviderConfig>,
        max_retries: u32,
        retry_delay_ms: u64,
        unavailable_threshold: u32,
        cooldown_secs: u64,
    ) -> Self {
        let mut slots = Vec::new();
        for (idx, p) in providers.iter().enumerate() {
            for _ in 0..p.rpm.max(1) {
                slots.push(idx);
            }
        }
        slots.shuffle(&mut rand::thread_rng());

        let providers = providers
            .into_iter()
            .map(|p| ProviderState {
                name: p.name,
                api_key: p.api_key,
                client: p.client,
                rpm: p.rpm,
                requests_this_minute: AtomicU32::new(0),
                consecutive_failures: AtomicU32::new(0),
                last_failure_time: Mutex::new(None),
            })
            .collect();

        Self {
            providers,
            slots: Mutex::new(slots),
            cursor: AtomicU32::new(0),
            max_retries,
            retry_delay_ms,
            unavailable_threshold,
            cooldown: Duration::from_secs(cooldown_secs),
        }
    }

    fn is_unavailable(&self, state: &ProviderState) -> bool {
        if state.consecutive_failures.load(Ordering::Relaxed) < self.unavailable_threshold {
            return false;
        }
        match *state.last_failure_time.lock() {
            Some(t) => Instant::now().duration_since(t) < self.cooldown,
            None => false,
        }
    }

    fn is_exhausted(&self, state: &ProviderState) -> bool {
        state.requests_this_minute.load(Ordering::Relaxed) >= state.rpm
    }

    /// Walks the slot array starting from the global cursor, skipping
    /// excluded/unavailable/exhausted providers.
    fn select_slot(&self, excluded: &HashSet<usize>) -> Option<usize> {
        let slots = self.slots.lock();
        if slots.is_empty() {
            return None;
        }
        let len = slots.len();
        for step in 0..len {
            let pos = (self.cursor.fetch_add(1, Ordering::Relaxed) as usize + step) % len;
            let idx = slots[pos];
            let state = &self.providers[idx];
            if excluded.contains(&idx) || self.is_unavailable(state) || self.is_exhausted(state) {
                continue;
            }
            return Some(idx);
        }
        None
    }

    /// Resets every provider's per-minute counter; intended to run on a
    /// 60s interval background task.
    pub fn reset_minute_counters(&self) {
        for p in &self.providers {
            p.requests_this_minute.store(0, Ordering::Relaxed);
        }
    }

    pub async fn generate(
        &self,
        prompt: &str,
        model: Option<&str>,
    ) -> Result<String, EngineError> {
        let mut attempted: HashSet<usize> = HashSet::new();
        let mut permanently_excluded: HashSet<usize> = HashSet::new();
        let mut attempt: u32 = 0;
        let mut last_error = String::new();
        let mut last_rate_limited = false;

        while attempt < self.max_retries && attempted.len() < self.providers.len() {
            let excluded: HashSet<usize> = attempted.union(&permanently_excluded).copied().collect();
            let Some(idx) = self.select_slot(&excluded) else {
                let delay = Duration::from_millis(self.retry_delay_ms * (1u64 << attempt.min(10)))
                    .min(Duration::from_secs(30));
                tokio::time::sleep(delay).await;
                attempted.clear();
                attempt += 1;
                continue;
            };

            let state = &self.providers[idx];
            state.requests_this_minute.fetch_add(1, Ordering::Relaxed);

            match state.client.generate(prompt, &state.api_key, model).await {
                Ok(text) => {
                    state.consecutive_failures.store(0, Ordering::Relaxed);
                    return Ok(text);
                }
                Err(err) => {
                    last_rate_limited = err.rate_limited;
                    last_error = err.to_string();
                    state.consecutive_failures.fetch_add(1, Ordering::Relaxed);
                    *state.last_failure_time.lock() = Some(Instant::now());
                    attempted.insert(idx);

                    if err.rate_limited {
                        state.requests_this_minute.store(state.rpm, Ordering::Relaxed);
                    }
                    if matches!(err.status_code, Some(410) | Some(413)) {
                        permanently_excluded.insert(idx);
                    }
                    attempt += 1;
                    if err.rate_limited {
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        }

        Err(EngineError::RouterFailure {
            attempted_providers: attempted
                .union(&permanently_excluded)
                .map(|idx| self.providers[*idx].name.clone())
                .collect(),
            last_error,
            rate_limited: last_rate_limited,
        })
    }
}

/// Spawns the background per-minute counter reset task.
pub fn spawn_reset_task(router: Arc<WeightedRouter>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        loop {
            interval.tick().await;
            router.reset_minute_counters();
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ProviderError;
    use async_trait::async_trait;

    /// A stub provider that always returns the configured outcome,
    /// counting how many times it was called — the S5 router-failover
    /// scenario's verification hook.
    struct StubProvider {
        name: &'static str,
        outcome: StubOutcome,
        calls: std::sync::atomic::AtomicU32,
    }

    #[derive(Clone, Copy)]
    enum StubOutcome {
        RateLimited,
        ServerError,
        Ok,
    }

    #[async_trait]
    impl ProviderClient for StubProvider {
        fn name(&self) -> &'static str {
            self.name
        }

        fn default_model(&self) -> &'static str {
            "stub-model"
        }

        async fn generate(
            &self,
            _prompt: &str,
            _api_key: &str,
            _model: Option<&str>,
        ) -> Result<String, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.outcome {
                StubOutcome::Ok => Ok("OK".to_string()),
                StubOutcome::RateLimited => Err(ProviderError {
                    provider: self.name.to_string(),
                    status_code: Some(429),
                    retryable: true,
                    rate_limited: true,
                    cause: "rate limited".to_string(),
                }),
                StubOutcome::ServerError => Err(ProviderError {
                    provider: self.name.to_string(),
                    status_code: Some(500),
                    retryable: true,
                    rate_limited: false,
                    cause: "server error".to_string(),
                }),
            }
        }
    }

    fn stub(name: &'static str, outcome: StubOutcome) -> (Arc<StubProvider>, RouterProviderConfig) {
        let stub = Arc::new(StubProvider {
            name,
            outcome,
            calls: std::sync::atomic::AtomicU32::new(0),
        });
        let config = RouterProviderConfig {
            name: name.to_string(),
            api_key: "key".to_string(),
            client: stub.clone(),
            rpm: 10,
        };
        (stub, config)
    }

    /// S5 — three providers A (429), B (500), C (200 "OK"). The slot array
    /// is shuffled, so which of A/B/C is tried first (and how many times
    /// each failing provider is retried before failover) isn't
    /// deterministic — only the eventual outcome is: `generate` must
    /// return C's "OK" and must call C exactly once to get it.
    #[tokio::test]
    async fn s5_router_fails_over_to_healthy_provider() {
        let (_stub_a, cfg_a) = stub("A", StubOutcome::RateLimited);
        let (_stub_b, cfg_b) = stub("B", StubOutcome::ServerError);
        let (stub_c, cfg_c) = stub("C", StubOutcome::Ok);

        let router = WeightedRouter::new(vec![cfg_a, cfg_b, cfg_c], 10, 10, 5, 120);

        let result = router.generate("prompt", None).await.unwrap();
        assert_eq!(result, "OK");
        assert_eq!(stub_c.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn generate_returns_router_failure_when_all_providers_fail() {
        let (_stub_a, cfg_a) = stub("A", StubOutcome::ServerError);
        let (_stub_b, cfg_b) = stub("B", StubOutcome::ServerError);

        let router = WeightedRouter::new(vec![cfg_a, cfg_b], 2, 1, 5, 120);
        let err = router.generate("prompt", None).await.unwrap_err();
        assert!(matches!(err, EngineError::RouterFailure { .. }));
    }

    #[test]
    fn slot_array_has_one_slot_per_rpm_unit() {
        let (_stub_a, cfg_a) = stub("A", StubOutcome::Ok);
        let rpm = cfg_a.rpm;
        let router = WeightedRouter::new(vec![cfg_a], 3, 10, 5, 120);
        assert_eq!(router.slots.lock().len(), rpm as usize);
    }
}
