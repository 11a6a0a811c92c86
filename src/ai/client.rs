// Hosted language-model client. One production implementation speaking the
// OpenAI chat-completions wire format; the trait is the seam the mapping
// resolver and the analytics query service mock in tests.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::warn;

use crate::util::env::{env_opt, env_parse, env_req};

#[derive(Debug, thiserror::Error)]
pub enum AiClientError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("model endpoint returned HTTP {0}")]
    Status(u16),

    #[error("malformed model response: {0}")]
    Malformed(String),
}

/// JSON-mode completion against a hosted model.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Ask the model for a single JSON object. Implementations must return
    /// the parsed object, not raw text.
    async fn complete_json(&self, system: &str, user: &str) -> Result<Value, AiClientError>;
}

/// Bounded retry-with-backoff for outbound model calls. Attempts, per-attempt
/// timeout and backoff base all come from configuration so the calling code
/// never hard-codes a waiting strategy.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_base: Duration,
}

impl RetryPolicy {
    pub fn from_env() -> Self {
        Self {
            max_attempts: env_parse("LLM_MAX_RETRIES", 2u32).max(1),
            backoff_base: Duration::from_millis(env_parse("LLM_BACKOFF_MS", 300u64)),
        }
    }

    /// Exponential backoff: base * 2^attempt.
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.backoff_base * 2u32.saturating_pow(attempt)
    }
}

pub struct OpenAiClient {
    http: Client,
    base_url: String,
    api_key: String,
    model: String,
    retry: RetryPolicy,
}

impl OpenAiClient {
    /// Reads `LLM_API_KEY` (or the legacy `OPENAI_API_KEY`), plus optional
    /// `LLM_BASE_URL`, `LLM_MODEL`, `LLM_TIMEOUT_SECS` and the retry knobs.
    pub fn from_env() -> anyhow::Result<Self> {
        let api_key = env_opt("LLM_API_KEY")
            .map(Ok)
            .unwrap_or_else(|| env_req("OPENAI_API_KEY"))?;
        let base_url = env_opt("LLM_BASE_URL")
            .unwrap_or_else(|| "https://api.openai.com/v1".to_string())
            .trim_end_matches('/')
            .to_string();
        let model = env_opt("LLM_MODEL").unwrap_or_else(|| "gpt-4o".to_string());
        let timeout_secs: u64 = env_parse("LLM_TIMEOUT_SECS", 30u64);

        let http = Client::builder()
            .user_agent(concat!("sku-intel/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;

        Ok(Self {
            http,
            base_url,
            api_key,
            model,
            retry: RetryPolicy::from_env(),
        })
    }

    fn extract_content(body: &Value) -> Result<Value, AiClientError> {
        let content = body
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|v| v.as_str())
            .ok_or_else(|| AiClientError::Malformed("missing choices[0].message.content".into()))?;
        serde_json::from_str(content)
            .map_err(|e| AiClientError::Malformed(format!("content is not a JSON object: {e}")))
    }
}

fn retryable_status(status: u16) -> bool {
    status == 429 || (500..600).contains(&status)
}

#[async_trait]
impl LanguageModel for OpenAiClient {
    async fn complete_json(&self, system: &str, user: &str) -> Result<Value, AiClientError> {
        let url = format!("{}/chat/completions", self.base_url);
        let payload = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user }
            ],
            "response_format": { "type": "json_object" },
            "temperature": 0.1,
        });

        let mut last_err: Option<AiClientError> = None;
        for attempt in 0..self.retry.max_attempts {
            if attempt > 0 {
                tokio::time::sleep(self.retry.backoff(attempt - 1)).await;
            }

            let sent = self
                .http
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(&payload)
                .send()
                .await;

            match sent {
                Ok(resp) if resp.status().is_success() => {
                    let body: Value = resp.json().await.map_err(AiClientError::Transport)?;
                    return Self::extract_content(&body);
                }
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if !retryable_status(status) {
                        return Err(AiClientError::Status(status));
                    }
                    warn!(status, attempt, "model endpoint busy; backing off");
                    last_err = Some(AiClientError::Status(status));
                }
                Err(e) => {
                    warn!(error = %e, attempt, "model request failed; backing off");
                    last_err = Some(AiClientError::Transport(e));
                }
            }
        }

        Err(last_err.unwrap_or_else(|| AiClientError::Malformed("no attempts made".into())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_per_attempt() {
        let policy = RetryPolicy {
            max_attempts: 3,
            backoff_base: Duration::from_millis(100),
        };
        assert_eq!(policy.backoff(0), Duration::from_millis(100));
        assert_eq!(policy.backoff(1), Duration::from_millis(200));
        assert_eq!(policy.backoff(2), Duration::from_millis(400));
    }

    #[test]
    fn only_throttling_and_server_errors_retry() {
        assert!(retryable_status(429));
        assert!(retryable_status(503));
        assert!(!retryable_status(400));
        assert!(!retryable_status(401));
    }

    #[test]
    fn extracts_json_object_from_chat_payload() {
        let body = serde_json::json!({
            "choices": [{ "message": { "content": "{\"confidence\": 0.9}" } }]
        });
        let parsed = OpenAiClient::extract_content(&body).unwrap();
        assert_eq!(parsed["confidence"], 0.9);
    }

    #[test]
    fn rejects_non_json_content() {
        let body = serde_json::json!({
            "choices": [{ "message": { "content": "sure, here you go" } }]
        });
        assert!(matches!(
            OpenAiClient::extract_content(&body),
            Err(AiClientError::Malformed(_))
        ));
    }
}
