use super::{classify_reqwest_error, classify_status, http_client, ProviderClient, ProviderError};
use async_trait::async_trait;
use serde_json::json;

const DEFAULT_MODEL: &str = "gemini-1.5-flash";
const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

pub struct GeminiClient {
    client: reqwest::Client,
    base_url: String,
}

impl GeminiClient {
    pub fn new(base_url: Option<String>) -> Self {
        Self {
            client: http_client(60),
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        }
    }
}

#[async_trait]
impl ProviderClient for GeminiClient {
    fn name(&self) -> &'static str {
        "GEMINI"
    }

    fn default_model(&self) -> &'static str {
        DEFAULT_MODEL
    }

    async fn generate(
        &self,
        prompt: &str,
        api_key: &str,
        model: Option<&str>,
    ) -> Result<String, ProviderError> {
        let model = model.unwrap_or(DEFAULT_MODEL);
        let body = json!({
            "contents": [{"parts": [{"text": prompt}]}],
        });

        let resp = self
            .client
            .post(format!(
                "{}/models/{}:generateContent?key={}",
                self.base_url, model, api_key
            ))
            .json(&body)
            .send()
            .await
            .map_err(|e| classify_reqwest_error(self.name(), &e))?;

        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let (retryable, rate_limited) = classify_status(status);
            let cause = resp.text().await.unwrap_or_default();
            return Err(ProviderError {
                provider: self.name().to_string(),
                status_code: Some(status),
                retryable,
                rate_limited,
                cause,
            });
        }

        let value: serde_json::Value = resp.json().await.map_err(|e| ProviderError {
            provider: self.name().to_string(),
            status_code: Some(status),
            retryable: false,
            rate_limited: false,
            cause: format!("invalid json response: {e}"),
        })?;

        value["candidates"][0]["content"]["parts"][0]["text"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| ProviderError {
                provider: self.name().to_string(),
                status_code: Some(status),
                retryable: false,
                rate_limited: false,
                cause: "missing candidates[0].content.parts[0].text".to_string(),
            })
    }
}
