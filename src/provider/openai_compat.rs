// src/provider/openai_compat.rs — Generic OpenAI-compatible provider
//
// Serves the hosted inference path. Groq is the default endpoint; any
// `/chat/completions` compatible API (Together, OpenRouter, DeepSeek) works
// by changing `base_url`.

use async_trait::async_trait;
use std::time::Instant;

use super::{
    classify_http_error, classify_transport_error, retry_after_ms, Completion, ModelConfig,
    ModelProvider, TokenUsage,
};
use crate::core::types::AgentRole;
use crate::infra::errors::AutonoError;

pub const GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";

/// Provider for any OpenAI-compatible API endpoint.
pub struct OpenAICompatProvider {
    id_str: String,
    name_str: String,
    api_key: String,
    base_url: String,
    client: reqwest::Client,
}

impl OpenAICompatProvider {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        api_key: String,
        base_url: String,
    ) -> Self {
        Self {
            id_str: id.into(),
            name_str: name.into(),
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn groq(api_key: String) -> Self {
        Self::new("groq", "Groq", api_key, GROQ_BASE_URL.into())
    }

    fn request_body(prompt: &str, model: &ModelConfig) -> serde_json::Value {
        serde_json::json!({
            "model": model.model,
            "messages": [{"role": "user", "content": prompt}],
            "max_tokens": model.max_output_tokens,
            "temperature": model.temperature,
        })
    }
}

/// Pull text and usage out of a `/chat/completions` response body.
fn parse_completion(resp: &serde_json::Value) -> (String, TokenUsage) {
    let content = resp["choices"][0]["message"]["content"]
        .as_str()
        .unwrap_or("")
        .to_string();
    let usage = TokenUsage {
        input_tokens: resp["usage"]["prompt_tokens"].as_u64().unwrap_or(0) as u32,
        output_tokens: resp["usage"]["completion_tokens"].as_u64().unwrap_or(0) as u32,
    };
    (content, usage)
}

#[async_trait]
impl ModelProvider for OpenAICompatProvider {
    fn id(&self) -> &str {
        &self.id_str
    }

    fn name(&self) -> &str {
        &self.name_str
    }

    async fn invoke(
        &self,
        role: AgentRole,
        prompt: &str,
        model: &ModelConfig,
    ) -> Result<Completion, AutonoError> {
        let started = Instant::now();
        tracing::debug!(provider = %self.id_str, role = %role, model = %model.model, "chat request");

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header(
                "User-Agent",
                format!("autonowrite/{}", env!("CARGO_PKG_VERSION")),
            )
            .timeout(model.request_timeout)
            .json(&Self::request_body(prompt, model))
            .send()
            .await
            .map_err(|e| classify_transport_error(&self.id_str, e, model.request_timeout))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = retry_after_ms(response.headers());
            let body = response.text().await.unwrap_or_default();
            return Err(classify_http_error(&self.id_str, status, body, retry_after));
        }

        let resp: serde_json::Value =
            response.json().await.map_err(|e| AutonoError::Provider {
                provider: self.id_str.clone(),
                message: format!("Failed to parse response: {e}"),
                retriable: false,
            })?;

        let (text, usage) = parse_completion(&resp);
        if text.trim().is_empty() {
            // Empty choices usually mean a moderation stop; retrying won't help.
            return Err(AutonoError::Provider {
                provider: self.id_str.clone(),
                message: format!(
                    "Empty completion (finish_reason: {})",
                    resp["choices"][0]["finish_reason"].as_str().unwrap_or("unknown")
                ),
                retriable: false,
            });
        }

        Ok(Completion {
            text,
            usage,
            elapsed: started.elapsed(),
        })
    }
}
