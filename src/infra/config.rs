// src/infra/config.rs — Configuration loading (TOML)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::infra::paths;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub provider: ProviderConfig,

    #[serde(default)]
    pub models: ModelsConfig,

    #[serde(default)]
    pub iteration: IterationConfig,

    #[serde(default)]
    pub research: ResearchConfig,

    #[serde(default)]
    pub rubric: RubricConfig,

    #[serde(default)]
    pub storage: StorageConfig,
}

/// Which provider client serves agent calls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Deterministic canned responses; no network.
    #[default]
    Simulation,
    /// OpenAI-compatible hosted inference API (Groq by default).
    Hosted,
    /// Local Ollama runtime.
    Local,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Simulation => "simulation",
            ProviderKind::Hosted => "hosted",
            ProviderKind::Local => "local",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            ProviderKind::Simulation => "simulated",
            ProviderKind::Hosted => "llama-3.3-70b-versatile",
            ProviderKind::Local => "gemma:2b",
        }
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "simulation" | "auto" => Ok(ProviderKind::Simulation),
            "hosted" | "groq" => Ok(ProviderKind::Hosted),
            "local" | "ollama" => Ok(ProviderKind::Local),
            other => Err(format!("unknown provider '{other}'")),
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    /// Model identifier; falls back to the kind's default when unset.
    pub model: Option<String>,
    pub base_url: Option<String>,
    /// Environment variable holding the hosted API key.
    pub api_key_env: String,
    pub temperature: f32,
    pub max_output_tokens: u32,
    pub request_timeout_seconds: u64,
}

fn default_api_key_env() -> String {
    "GROQ_API_KEY".into()
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            kind: ProviderKind::Simulation,
            model: None,
            base_url: None,
            api_key_env: default_api_key_env(),
            temperature: 0.7,
            max_output_tokens: 1500,
            request_timeout_seconds: 120,
        }
    }
}

impl ProviderConfig {
    pub fn model_or_default(&self) -> String {
        self.model
            .clone()
            .unwrap_or_else(|| self.kind.default_model().to_string())
    }
}

/// Per-role model overrides. Unset roles use `[provider] model`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelsConfig {
    pub planner: Option<String>,
    pub researcher: Option<String>,
    pub writer: Option<String>,
    pub critic: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IterationConfig {
    pub max_iterations: u32,
    pub approval_threshold: f32,
    pub min_criterion_floor: Option<f32>,
    pub token_budget: u64,
    pub time_budget_seconds: u64,
    pub max_retries_per_call: u32,
    pub retry_backoff: BackoffConfig,
}

impl Default for IterationConfig {
    fn default() -> Self {
        Self {
            max_iterations: 3,
            approval_threshold: 8.0,
            min_criterion_floor: None,
            token_budget: 200_000,
            time_budget_seconds: 1800,
            max_retries_per_call: 3,
            retry_backoff: BackoffConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    pub base_delay_ms: u64,
    pub multiplier: f64,
    pub max_delay_ms: u64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 2_000,
            multiplier: 2.0,
            max_delay_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchBackendKind {
    #[default]
    Simulation,
    /// SearxNG-compatible `/search?format=json` endpoint.
    Searx,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResearchConfig {
    pub backend: SearchBackendKind,
    pub endpoint: Option<String>,
    pub per_query_result_cap: usize,
    pub total_source_cap: usize,
    pub fan_out: usize,
    pub max_queries: usize,
    pub request_timeout_seconds: u64,
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            backend: SearchBackendKind::Simulation,
            endpoint: None,
            per_query_result_cap: 5,
            total_source_cap: 12,
            fan_out: 4,
            max_queries: 5,
            request_timeout_seconds: 15,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CriterionConfig {
    pub name: String,
    pub weight: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RubricConfig {
    pub criteria: Vec<CriterionConfig>,
}

impl Default for RubricConfig {
    fn default() -> Self {
        let criteria = ["structure", "depth", "clarity", "sourcing", "coherence"]
            .into_iter()
            .map(|name| CriterionConfig {
                name: name.into(),
                weight: 0.2,
            })
            .collect();
        Self { criteria }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// SQLite path; defaults to the data directory.
    pub db_path: Option<String>,
}

impl StorageConfig {
    pub fn resolved_db_path(&self) -> PathBuf {
        self.db_path
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(paths::db_path)
    }
}

impl Config {
    /// Load config from file, falling back to defaults.
    pub fn load() -> anyhow::Result<Self> {
        let path = paths::config_file_path();
        let mut config = if path.exists() {
            Self::load_from(&path)?
        } else {
            Self::default()
        };
        config.apply_env();
        Ok(config)
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// `LLM_PROVIDER` overrides the configured provider kind. Unknown values
    /// are ignored with a warning.
    pub fn apply_env(&mut self) {
        if let Ok(value) = std::env::var("LLM_PROVIDER") {
            match value.parse::<ProviderKind>() {
                Ok(kind) => self.provider.kind = kind,
                Err(e) => tracing::warn!("Ignoring LLM_PROVIDER: {}", e),
            }
        }
    }
}
