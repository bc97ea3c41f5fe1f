use parking_lot::Mutex;
use std::time::{Duration, Instant};

/// Scale factor for the fixed-point token count, avoiding float drift under
/// contention (spec.md §4.1).
const SCALE: i64 = 1000;

struct State {
    /// Available tokens, scaled by `SCALE`.
    available_milli: i64,
    last_refill: Instant,
}

/// Thread-safe rate limiter refilling at `R` tokens/sec up to capacity `C`.
pub struct TokenBucket {
    capacity_milli: i64,
    refill_per_sec_milli: f64,
    state: Mutex<State>,
}

impl TokenBucket {
    pub fn new(capacity: u32, refill_per_sec: f64) -> Self {
        let capacity_milli = capacity as i64 * SCALE;
        Self {
            capacity_milli,
            refill_per_sec_milli: refill_per_sec * SCALE as f64,
            state: Mutex::new(State {
                available_milli: capacity_milli,
                last_refill: Instant::now(),
            }),
        }
    }

    fn refill_locked(&self, state: &mut State) {
        let now = Instant::now();
        let elapsed = now.saturating_duration_since(state.last_refill);
        if elapsed.as_nanos() == 0 {
            return;
        }
        let added = (elapsed.as_secs_f64() * self.refill_per_sec_milli) as i64;
        if added > 0 {
            state.available_milli = (state.available_milli + added).min(self.capacity_milli);
            state.last_refill = now;
        }
    }

    /// Refills, then atomically decrements by `n` if `available >= n`.
    pub fn try_acquire(&self, n: u32) -> bool {
        let need = n as i64 * SCALE;
        let mut state = self.state.lock();
        self.refill_locked(&mut state);
        if state.available_milli >= need {
            state.available_milli -= need;
            true
        } else {
            false
        }
    }

    /// Loops `try_acquire`, sleeping until the next token boundary (capped
    /// at 1s per iteration to stay responsive) until `max_wait_ms` elapses.
    pub async fn acquire(&self, n: u32, max_wait_ms: u64) -> bool {
        let deadline = Instant::now() + Duration::from_millis(max_wait_ms);
        loop {
            if self.try_acquire(n) {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let remaining = deadline - now;
            let wait = Duration::from_millis(self.wait_time_ms()).min(remaining).min(Duration::from_secs(1));
            tokio::time::sleep(wait.max(Duration::from_millis(1))).await;
        }
    }

    /// `max(0, (1 - available) / R * 1000)` expressed in milliseconds.
    pub fn wait_time_ms(&self) -> u64 {
        let mut state = self.state.lock();
        self.refill_locked(&mut state);
        if state.available_milli >= SCALE {
            return 0;
        }
        if self.refill_per_sec_milli <= 0.0 {
            return u64::MAX;
        }
        let deficit_milli = (SCALE - state.available_milli) as f64;
        let seconds = deficit_milli / self.refill_per_sec_milli;
        (seconds * 1000.0).max(0.0) as u64
    }

    /// Used when a 429 is observed: drains the bucket immediately.
    pub fn mark_depleted(&self) {
        let mut state = self.state.lock();
        state.available_milli = 0;
        state.last_refill = Instant::now();
    }

    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.available_milli = self.capacity_milli;
        state.last_refill = Instant::now();
    }

    pub fn available_tokens(&self) -> f64 {
        let mut state = self.state.lock();
        self.refill_locked(&mut state);
        state.available_milli as f64 / SCALE as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_full_and_drains() {
        let b = TokenBucket::new(5, 1.0);
        for _ in 0..5 {
            assert!(b.try_acquire(1));
        }
        assert!(!b.try_acquire(1));
    }

    #[test]
    fn never_exceeds_capacity() {
        let b = TokenBucket::new(3, 100.0);
        std::thread::sleep(Duration::from_millis(50));
        assert!(b.available_tokens() <= 3.0);
    }

    #[test]
    fn mark_depleted_zeroes_available() {
        let b = TokenBucket::new(10, 1.0);
        b.mark_depleted();
        assert!(!b.try_acquire(1));
    }

    #[test]
    fn reset_restores_capacity() {
        let b = TokenBucket::new(4, 1.0);
        b.mark_depleted();
        b.reset();
        assert!(b.try_acquire(4));
    }

    #[tokio::test]
    async fn acquire_waits_for_refill() {
        let b = TokenBucket::new(1, 20.0);
        assert!(b.try_acquire(1));
        let ok = b.acquire(1, 500).await;
        assert!(ok);
    }

    #[tokio::test]
    async fn acquire_times_out() {
        let b = TokenBucket::new(1, 0.001);
        assert!(b.try_acquire(1));
        let ok = b.acquire(1, 20).await;
        assert!(!ok);
    }
}
