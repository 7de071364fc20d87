//! LLM transport: the model-call seam, a Gemini client, and bounded retry.

use crate::error::{Error, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Default environment variable holding the API key.
pub const DEFAULT_API_KEY_ENV: &str = "GEMINI_API_KEY";

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const MAX_OUTPUT_TOKENS: u32 = 8192;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// Failure classes reported by a transport.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// Rate limit or quota exhaustion; worth retrying later
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// Missing, invalid or unauthorized API key
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Unknown or unavailable model
    #[error("model error: {0}")]
    Model(String),

    /// The model answered without any text
    #[error("empty response from model")]
    EmptyResponse,

    /// Any other request failure
    #[error("request failed: {0}")]
    Http(String),
}

impl TransportError {
    /// Returns true for the rate-limit class, the only one that is retried.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::RateLimited(_))
    }
}

impl From<TransportError> for Error {
    fn from(e: TransportError) -> Self {
        Self::Transport {
            transient: e.is_transient(),
            message: e.to_string(),
        }
    }
}

/// Sends an ordered message list to a model and returns its raw text.
#[async_trait]
pub trait ModelTransport: Send + Sync {
    /// Invokes `model` once.
    async fn invoke(
        &self,
        model: &str,
        temperature: f64,
        messages: &[String],
    ) -> std::result::Result<String, TransportError>;

    /// Verifies that `model` is reachable with the configured credentials
    /// without generating anything.
    async fn check(&self, model: &str) -> std::result::Result<(), TransportError> {
        let _ = model;
        Ok(())
    }
}

/// Retry bound and backoff for transient transport failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,

    /// Base delay; attempt `n` waits `base_delay * 2^n` before retrying
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Delay after the failed attempt `attempt` (1-based).
    #[must_use]
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
    }
}

/// Calls the transport, retrying rate-limit failures with exponential backoff.
///
/// # Errors
///
/// Returns [`Error::Transport`] for non-transient failures immediately and for
/// transient failures once `policy.max_attempts` is exhausted.
pub async fn invoke_with_retry(
    transport: &dyn ModelTransport,
    policy: RetryPolicy,
    model: &str,
    temperature: f64,
    messages: &[String],
) -> Result<String> {
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match transport.invoke(model, temperature, messages).await {
            Ok(text) => return Ok(text),
            Err(e) if e.is_transient() && attempt < max_attempts => {
                let delay = policy.delay_after(attempt);
                warn!(
                    attempt,
                    max_attempts,
                    backoff_ms = delay.as_millis() as u64,
                    "Transient transport error, retrying: {}",
                    e
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                if e.is_transient() {
                    warn!("Giving up after {} attempts: {}", attempt, e);
                }
                return Err(e.into());
            }
        }
    }
}

/// Gemini `generateContent` client.
pub struct GeminiClient {
    api_key: String,
    base_url: String,
    client: reqwest::Client,
}

impl GeminiClient {
    /// Creates a client for the public Gemini endpoint.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the key is empty or the HTTP client
    /// cannot be built.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(Error::config("API key is empty"));
        }

        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| Error::config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            api_key,
            base_url: GEMINI_BASE_URL.to_string(),
            client,
        })
    }

    /// Points the client at another endpoint root.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn model_url(&self, model: &str) -> String {
        format!("{}/v1beta/models/{}", self.base_url, model)
    }

    fn endpoint(&self, model: &str) -> String {
        format!("{}:generateContent", self.model_url(model))
    }
}

#[async_trait]
impl ModelTransport for GeminiClient {
    async fn invoke(
        &self,
        model: &str,
        temperature: f64,
        messages: &[String],
    ) -> std::result::Result<String, TransportError> {
        debug!(model, messages = messages.len(), "Sending generateContent request");

        let response = self
            .client
            .post(self.endpoint(model))
            .header("x-goog-api-key", &self.api_key)
            .json(&request_body(temperature, messages))
            .send()
            .await
            .map_err(|e| TransportError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_failure(status.as_u16(), &body, model));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| TransportError::Http(format!("invalid response body: {e}")))?;

        response_text(&body).ok_or(TransportError::EmptyResponse)
    }

    async fn check(&self, model: &str) -> std::result::Result<(), TransportError> {
        let response = self
            .client
            .get(self.model_url(model))
            .header("x-goog-api-key", &self.api_key)
            .send()
            .await
            .map_err(|e| TransportError::Http(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            debug!(model, "Model is reachable");
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(classify_failure(status.as_u16(), &body, model))
    }
}

/// Joins the messages into a single user turn.
fn request_body(temperature: f64, messages: &[String]) -> Value {
    json!({
        "contents": [{
            "role": "user",
            "parts": [{ "text": messages.join("\n\n") }]
        }],
        "generationConfig": {
            "temperature": temperature,
            "maxOutputTokens": MAX_OUTPUT_TOKENS
        }
    })
}

fn response_text(body: &Value) -> Option<String> {
    let text: String = body["candidates"][0]["content"]["parts"]
        .as_array()?
        .iter()
        .filter_map(|part| part["text"].as_str())
        .collect();

    (!text.trim().is_empty()).then_some(text)
}

fn classify_failure(status: u16, body: &str, model: &str) -> TransportError {
    let lower = body.to_lowercase();
    let detail = format!("HTTP {status}: {}", body.trim());

    match status {
        429 => TransportError::RateLimited(detail),
        401 | 403 => TransportError::Auth(detail),
        404 => TransportError::Model(format!("model '{model}' not found ({detail})")),
        _ if lower.contains("quota") || lower.contains("rate limit") => {
            TransportError::RateLimited(detail)
        }
        _ if lower.contains("api key") => TransportError::Auth(detail),
        _ => TransportError::Http(detail),
    }
}
