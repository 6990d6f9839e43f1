// src/provider/resolver.rs — Provider selection from configuration

use std::sync::Arc;

use super::ollama::OllamaProvider;
use super::openai_compat::{OpenAICompatProvider, GROQ_BASE_URL};
use super::simulation::SimulationProvider;
use super::ModelProvider;
use crate::infra::config::{ProviderConfig, ProviderKind};
use crate::infra::errors::AutonoError;

/// Build the provider client named by `[provider] kind`.
///
/// The hosted provider needs its API key in the environment variable named by
/// `api_key_env`; a missing key is a configuration error, not a silent
/// fallback to simulation.
pub fn build_provider(config: &ProviderConfig) -> Result<Arc<dyn ModelProvider>, AutonoError> {
    let provider: Arc<dyn ModelProvider> = match config.kind {
        ProviderKind::Simulation => Arc::new(SimulationProvider::new()),
        ProviderKind::Local => Arc::new(OllamaProvider::new(config.base_url.clone())),
        ProviderKind::Hosted => {
            let api_key = resolve_key(&config.api_key_env).ok_or_else(|| {
                AutonoError::Config(format!(
                    "hosted provider selected but {} is not set",
                    config.api_key_env
                ))
            })?;
            let base_url = config
                .base_url
                .clone()
                .unwrap_or_else(|| GROQ_BASE_URL.to_string());
            Arc::new(OpenAICompatProvider::new(
                "groq", "Groq", api_key, base_url,
            ))
        }
    };
    tracing::info!(
        provider = provider.id(),
        model = %config.model_or_default(),
        "Provider selected"
    );
    Ok(provider)
}

fn resolve_key(env_var: &str) -> Option<String> {
    std::env::var(env_var)
        .ok()
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
}
