pub mod generic_provider;
pub mod registry;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Failures talking to a decision-making provider, classified so the retry
/// policy can tell throttling apart from everything else.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("{provider} rate limited the request: {message}")]
    RateLimited { provider: String, message: String },

    #[error("{provider} server error ({status}): {message}")]
    Server {
        provider: String,
        status: u16,
        message: String,
    },

    #[error("{provider} rejected the request ({status}): {message}")]
    InvalidRequest {
        provider: String,
        status: u16,
        message: String,
    },

    #[error("network error talking to {provider}: {message}")]
    Network { provider: String, message: String },

    #[error("unreadable response from {provider}: {message}")]
    Parse { provider: String, message: String },

    #[error("{env_var} is not set for provider '{provider}'")]
    MissingCredential { provider: String, env_var: String },

    #[error("{provider} still rate limited after {attempts} attempts: {last}")]
    RetriesExhausted {
        provider: String,
        attempts: u32,
        last: String,
    },
}

impl LlmError {
    pub fn from_status(provider: &str, status: u16, body: String) -> Self {
        let provider = provider.to_string();
        match status {
            429 => LlmError::RateLimited {
                provider,
                message: body,
            },
            500..=599 => LlmError::Server {
                provider,
                status,
                message: body,
            },
            _ => LlmError::InvalidRequest {
                provider,
                status,
                message: body,
            },
        }
    }

    /// Only throttling is retried; other failures surface on the first attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LlmError::RateLimited { .. })
    }
}

#[async_trait]
pub trait LlmProvider: Send + Sync {
    fn provider_id(&self) -> &str;

    // Execute a prompt against a selected model using a structured conversation
    async fn generate(
        &self,
        model_id: &str,
        messages: &[ChatMessage],
        max_tokens: u32,
    ) -> Result<String, LlmError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_millis(3000),
        }
    }
}

/// A provider bound to one model and a retry policy. Every step and the
/// planner talk to the decision service through this.
pub struct LlmClient {
    provider: Arc<dyn LlmProvider>,
    model: String,
    retry: RetryPolicy,
    max_tokens: u32,
}

impl LlmClient {
    pub fn new(provider: Arc<dyn LlmProvider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            retry: RetryPolicy::default(),
            max_tokens: 1500,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn provider_id(&self) -> &str {
        self.provider.provider_id()
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub async fn complete(&self, system: &str, user: &str) -> Result<String, LlmError> {
        self.complete_with_limit(system, user, self.max_tokens).await
    }

    pub async fn complete_with_limit(
        &self,
        system: &str,
        user: &str,
        max_tokens: u32,
    ) -> Result<String, LlmError> {
        let messages = [ChatMessage::system(system), ChatMessage::user(user)];
        let attempts = self.retry.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match self
                .provider
                .generate(&self.model, &messages, max_tokens)
                .await
            {
                Ok(text) => return Ok(text),
                Err(e) if e.is_retryable() && attempt < attempts => {
                    warn!(
                        "{} throttled (attempt {}/{}), retrying in {:?}",
                        self.provider_id(),
                        attempt,
                        attempts,
                        self.retry.delay
                    );
                    tokio::time::sleep(self.retry.delay).await;
                    attempt += 1;
                }
                Err(e) if e.is_retryable() => {
                    return Err(LlmError::RetriesExhausted {
                        provider: self.provider_id().to_string(),
                        attempts,
                        last: e.to_string(),
                    });
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl std::fmt::Debug for LlmClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmClient")
            .field("provider", &self.provider_id())
            .field("model", &self.model)
            .field("retry", &self.retry)
            .finish()
    }
}

/// Strip a fenced code block (```json / ```sql / bare ```) from model output.
/// Returns the fenced content when a complete fence is present, otherwise the
/// trimmed input unchanged.
pub fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(start) = trimmed.find("```") else {
        return trimmed;
    };
    let mut body = &trimmed[start + 3..];
    for tag in ["json", "sql"] {
        if body
            .get(..tag.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(tag))
        {
            body = &body[tag.len()..];
            break;
        }
    }
    match body.find("```") {
        Some(end) => {
            let inner = body[..end].trim();
            if inner.is_empty() { trimmed } else { inner }
        }
        None => trimmed,
    }
}

pub fn log_provider_ready(client: &LlmClient) {
    info!(
        "Decision service ready: {} ({})",
        client.provider_id(),
        client.model()
    );
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    #[test]
    fn status_classification() {
        assert!(LlmError::from_status("p", 429, String::new()).is_retryable());
        assert!(matches!(
            LlmError::from_status("p", 503, String::new()),
            LlmError::Server { status: 503, .. }
        ));
        assert!(matches!(
            LlmError::from_status("p", 401, String::new()),
            LlmError::InvalidRequest { status: 401, .. }
        ));
        assert!(!LlmError::from_status("p", 500, String::new()).is_retryable());
    }

    #[test]
    fn fences_are_stripped() {
        assert_eq!(strip_code_fences("```json\n{\"a\": 1}\n```"), "{\"a\": 1}");
        assert_eq!(strip_code_fences("```SQL\nSELECT 1\n```"), "SELECT 1");
        assert_eq!(
            strip_code_fences("Here you go:\n```\nSELECT 2\n```\nenjoy"),
            "SELECT 2"
        );
        assert_eq!(strip_code_fences("  SELECT 3  "), "SELECT 3");
        assert_eq!(strip_code_fences("```json\n{\"open\": true"), "```json\n{\"open\": true");
    }

    #[tokio::test]
    async fn rate_limit_is_retried_then_succeeds() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Err(rate_limited()),
            Ok("done".to_string()),
        ]));
        let llm = client(provider.clone());
        assert_eq!(llm.complete("sys", "user").await.unwrap(), "done");
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test]
    async fn rate_limit_exhaustion_is_bounded() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Err(rate_limited()),
            Err(rate_limited()),
            Err(rate_limited()),
            Ok("too late".to_string()),
        ]));
        let llm = client(provider.clone());
        let err = llm.complete("sys", "user").await.unwrap_err();
        assert!(matches!(err, LlmError::RetriesExhausted { attempts: 3, .. }));
        assert_eq!(provider.calls(), 3);
    }

    #[tokio::test]
    async fn non_throttling_errors_are_not_retried() {
        let provider = Arc::new(ScriptedProvider::new(vec![Err(LlmError::from_status(
            "scripted",
            500,
            "boom".to_string(),
        ))]));
        let llm = client(provider.clone());
        assert!(matches!(
            llm.complete("sys", "user").await,
            Err(LlmError::Server { .. })
        ));
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn messages_carry_system_then_user() {
        let provider = Arc::new(ScriptedProvider::replying("ok"));
        let llm = client(provider.clone());
        llm.complete("instructions", "question").await.unwrap();
        let seen = provider.seen.lock().unwrap();
        assert_eq!(seen[0][0].role, "system");
        assert_eq!(seen[0][0].content, "instructions");
        assert_eq!(seen[0][1].role, "user");
        assert_eq!(seen[0][1].content, "question");
    }
}
