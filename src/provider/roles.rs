// src/provider/roles.rs — Role-based model assignment

use std::time::Duration;

use super::ModelConfig;
use crate::core::types::AgentRole;
use crate::infra::config::{ModelsConfig, ProviderConfig};

/// Assigns a model configuration to each agent role in the round.
#[derive(Debug, Clone, PartialEq)]
pub struct RoleModels {
    pub planner: ModelConfig,
    pub researcher: ModelConfig,
    pub writer: ModelConfig,
    pub critic: ModelConfig,
}

impl RoleModels {
    /// Same model for every role.
    pub fn from_single(model: ModelConfig) -> Self {
        Self {
            planner: model.clone(),
            researcher: model.clone(),
            writer: model.clone(),
            critic: model,
        }
    }

    /// Build from the provider section, applying per-role model overrides.
    /// The critic runs cooler than the others so its scores are steadier.
    pub fn from_config(provider: &ProviderConfig, models: &ModelsConfig) -> Self {
        let base = ModelConfig {
            model: provider.model_or_default(),
            temperature: provider.temperature,
            max_output_tokens: provider.max_output_tokens,
            request_timeout: Duration::from_secs(provider.request_timeout_seconds),
        };
        let with_model = |name: Option<&String>| match name {
            Some(m) => ModelConfig {
                model: m.clone(),
                ..base.clone()
            },
            None => base.clone(),
        };

        let mut critic = with_model(models.critic.as_ref());
        critic.temperature = critic.temperature.min(0.2);

        Self {
            planner: with_model(models.planner.as_ref()),
            researcher: with_model(models.researcher.as_ref()),
            writer: with_model(models.writer.as_ref()),
            critic,
        }
    }

    pub fn for_role(&self, role: AgentRole) -> &ModelConfig {
        match role {
            AgentRole::Planner => &self.planner,
            AgentRole::Researcher => &self.researcher,
            AgentRole::Writer => &self.writer,
            AgentRole::Critic => &self.critic,
        }
    }
}

impl Default for RoleModels {
    fn default() -> Self {
        Self::from_single(ModelConfig::default())
    }
}
