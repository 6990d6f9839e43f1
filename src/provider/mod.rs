// src/provider/mod.rs — Model provider layer

pub mod ollama;
pub mod openai_compat;
pub mod resolver;
pub mod retry;
pub mod roles;
pub mod simulation;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::core::types::AgentRole;
use crate::infra::errors::AutonoError;

/// Core trait that all model providers implement.
///
/// Implementations must be safe to share across concurrently running
/// projects; the controller holds them behind `Arc<dyn ModelProvider>`.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    fn id(&self) -> &str;
    fn name(&self) -> &str;

    /// Run one agent call. Transient failures are reported as retriable
    /// errors; retry policy belongs to the caller.
    async fn invoke(
        &self,
        role: AgentRole,
        prompt: &str,
        model: &ModelConfig,
    ) -> Result<Completion, AutonoError>;
}

/// Per-call model settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub model: String,
    pub temperature: f32,
    pub max_output_tokens: u32,
    pub request_timeout: Duration,
}

impl ModelConfig {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Default::default()
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model: "simulated".into(),
            temperature: 0.7,
            max_output_tokens: 1500,
            request_timeout: Duration::from_secs(120),
        }
    }
}

/// A successful provider response.
#[derive(Debug, Clone)]
pub struct Completion {
    pub text: String,
    pub usage: TokenUsage,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl TokenUsage {
    pub fn total(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }
}

/// Rough token estimate used for pre-call budget checks (~4 chars/token).
pub fn estimate_tokens(text: &str) -> u32 {
    (text.chars().count() as f32 / 4.0).ceil() as u32
}

/// Map an HTTP status from a provider into the error taxonomy.
///
/// 408/429/5xx are transient; everything else (400 bad request, 401/403
/// auth, content-policy rejections) is terminal.
pub(crate) fn classify_http_error(
    provider: &str,
    status: reqwest::StatusCode,
    body: String,
    retry_after_ms: Option<u64>,
) -> AutonoError {
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return AutonoError::RateLimited {
            provider: provider.to_string(),
            retry_after_ms: retry_after_ms.unwrap_or(0),
        };
    }
    let retriable = status.is_server_error() || status == reqwest::StatusCode::REQUEST_TIMEOUT;
    AutonoError::Provider {
        provider: provider.to_string(),
        message: format!("HTTP {status}: {body}"),
        retriable,
    }
}

/// Map a transport-level reqwest error.
pub(crate) fn classify_transport_error(
    provider: &str,
    err: reqwest::Error,
    timeout: Duration,
) -> AutonoError {
    if err.is_timeout() {
        return AutonoError::Timeout {
            provider: provider.to_string(),
            timeout_ms: timeout.as_millis() as u64,
        };
    }
    AutonoError::Provider {
        provider: provider.to_string(),
        message: err.to_string(),
        retriable: err.is_connect() || err.is_request(),
    }
}

/// Parse a `Retry-After` header given in seconds.
pub(crate) fn retry_after_ms(headers: &reqwest::header::HeaderMap) -> Option<u64> {
    headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<f64>()
        .ok()
        .map(|secs| (secs * 1000.0) as u64)
}
