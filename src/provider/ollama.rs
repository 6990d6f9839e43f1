// src/provider/ollama.rs — Ollama local model provider

use async_trait::async_trait;
use std::time::Instant;

use super::{
    classify_http_error, classify_transport_error, Completion, ModelConfig, ModelProvider,
    TokenUsage,
};
use crate::core::types::AgentRole;
use crate::infra::errors::AutonoError;

pub struct OllamaProvider {
    base_url: String,
    client: reqwest::Client,
}

impl OllamaProvider {
    pub fn new(base_url: Option<String>) -> Self {
        Self {
            base_url: base_url
                .unwrap_or_else(|| "http://localhost:11434".into())
                .trim_end_matches('/')
                .to_string(),
            client: reqwest::Client::new(),
        }
    }

    fn request_body(prompt: &str, model: &ModelConfig) -> serde_json::Value {
        serde_json::json!({
            "model": model.model,
            "messages": [{"role": "user", "content": prompt}],
            "stream": false,
            "options": {
                "temperature": model.temperature,
                "num_predict": model.max_output_tokens,
            },
        })
    }
}

impl Default for OllamaProvider {
    fn default() -> Self {
        Self::new(None)
    }
}

#[async_trait]
impl ModelProvider for OllamaProvider {
    fn id(&self) -> &str {
        "ollama"
    }

    fn name(&self) -> &str {
        "Ollama"
    }

    async fn invoke(
        &self,
        role: AgentRole,
        prompt: &str,
        model: &ModelConfig,
    ) -> Result<Completion, AutonoError> {
        let started = Instant::now();
        tracing::debug!(role = %role, model = %model.model, "ollama chat request");

        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .timeout(model.request_timeout)
            .json(&Self::request_body(prompt, model))
            .send()
            .await
            .map_err(|e| classify_transport_error("ollama", e, model.request_timeout))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(classify_http_error("ollama", status, error_body, None));
        }

        let resp: serde_json::Value =
            response.json().await.map_err(|e| AutonoError::Provider {
                provider: "ollama".into(),
                message: format!("Failed to parse response: {}", e),
                retriable: false,
            })?;

        let text = resp["message"]["content"]
            .as_str()
            .unwrap_or("")
            .to_string();

        let usage = TokenUsage {
            input_tokens: resp["prompt_eval_count"].as_u64().unwrap_or(0) as u32,
            output_tokens: resp["eval_count"].as_u64().unwrap_or(0) as u32,
        };

        Ok(Completion {
            text,
            usage,
            elapsed: started.elapsed(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_base_url() {
        let p = OllamaProvider::default();
        assert_eq!(p.base_url, "http://localhost:11434");
    }

    #[test]
    fn test_request_body_disables_streaming() {
        let body = OllamaProvider::request_body("plan this", &ModelConfig::new("gemma:2b"));
        assert_eq!(body["stream"], false);
        assert_eq!(body["model"], "gemma:2b");
        assert_eq!(body["options"]["num_predict"], 1500);
    }
}
