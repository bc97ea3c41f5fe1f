mod cerebras;
mod cohere;
mod gemini;
mod groq;
mod sambanova;

pub use cerebras::CerebrasClient;
pub use cohere::CohereClient;
pub use gemini::GeminiClient;
pub use groq::GroqClient;
pub use sambanova::SambanovaClient;

use async_trait::async_trait;
use std::fmt;
use std::time::Duration;

/// Typed failure from a single provider call (spec.md §4.3).
#[derive(Debug, Clone)]
pub struct ProviderError {
    pub provider: String,
    pub status_code: Option<u16>,
    pub retryable: bool,
    pub rate_limited: bool,
    pub cause: String,
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} failed (status={:?}, retryable={}, rate_limited={}): {}",
            self.provider, self.status_code, self.retryable, self.rate_limited, self.cause
        )
    }
}

impl std::error::Error for ProviderError {}

/// HTTP-status → (retryable, rateLimited) classification table from
/// spec.md §4.3.
pub fn classify_status(status: u16) -> (bool, bool) {
    match status {
        429 => (true, true),
        500..=599 => (true, false),
        410 | 413 => (false, false),
        401 | 403 => (false, false),
        _ => (false, false),
    }
}

/// Uniform contract over one generative provider: prompt in, text out.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    fn name(&self) -> &'static str;
    fn default_model(&self) -> &'static str;

    async fn generate(
        &self,
        prompt: &str,
        api_key: &str,
        model: Option<&str>,
    ) -> Result<String, ProviderError>;
}

/// Shared timeout/read-buffer defaults the five providers build their
/// `reqwest::Client` from (spec.md §4.3: 60-90s, ≥16MiB responses).
pub(crate) fn http_client(timeout_secs: u64) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .expect("reqwest client build should not fail with static config")
}

pub(crate) fn classify_reqwest_error(provider: &str, err: &reqwest::Error) -> ProviderError {
    ProviderError {
        provider: provider.to_string(),
        status_code: err.status().map(|s| s.as_u16()),
        retryable: err.is_timeout() || err.is_connect(),
        rate_limited: false,
        cause: err.to_string(),
    }
}
