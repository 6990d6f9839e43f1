// src/core/types.rs — Core domain types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use std::time::Duration;

use super::ledger::Ledger;
use super::state::ProjectStatus;
use crate::evaluator::rubric::Rubric;
use crate::infra::config::{BackoffConfig, Config};
use crate::infra::errors::AutonoError;
use crate::provider::roles::RoleModels;

/// The four agents of a round, in the order they run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentRole {
    Planner,
    Researcher,
    Writer,
    Critic,
}

impl AgentRole {
    pub const ALL: [AgentRole; 4] = [
        AgentRole::Planner,
        AgentRole::Researcher,
        AgentRole::Writer,
        AgentRole::Critic,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentRole::Planner => "planner",
            AgentRole::Researcher => "researcher",
            AgentRole::Writer => "writer",
            AgentRole::Critic => "critic",
        }
    }
}

impl std::fmt::Display for AgentRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentRole {
    type Err = AutonoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "planner" => Ok(AgentRole::Planner),
            "researcher" => Ok(AgentRole::Researcher),
            "writer" => Ok(AgentRole::Writer),
            "critic" => Ok(AgentRole::Critic),
            other => Err(AutonoError::InvalidInput(format!("unknown role '{other}'"))),
        }
    }
}

/// Machine-readable reason a project ended in `failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    MaxIterationsExceeded,
    BudgetExceeded,
    ProviderError,
    Cancelled,
    /// The ledger could not be written mid-run.
    StorageError,
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureReason::MaxIterationsExceeded => "max_iterations_exceeded",
            FailureReason::BudgetExceeded => "budget_exceeded",
            FailureReason::ProviderError => "provider_error",
            FailureReason::Cancelled => "cancelled",
            FailureReason::StorageError => "storage_error",
        }
    }
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FailureReason {
    type Err = AutonoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "max_iterations_exceeded" => Ok(FailureReason::MaxIterationsExceeded),
            "budget_exceeded" => Ok(FailureReason::BudgetExceeded),
            "provider_error" => Ok(FailureReason::ProviderError),
            "cancelled" => Ok(FailureReason::Cancelled),
            "storage_error" => Ok(FailureReason::StorageError),
            other => Err(AutonoError::InvalidInput(format!(
                "unknown failure reason '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub title: String,
    pub status: ProjectStatus,
    /// Set only when `status == Failed`.
    pub failure_reason: Option<FailureReason>,
    /// Set only when `status == Completed`.
    pub final_content: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Project {
    pub fn new(title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            title: title.into(),
            status: ProjectStatus::Draft,
            failure_reason: None,
            final_content: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// One agent call, as recorded in the ledger. Failed calls have no output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentExecution {
    pub id: String,
    pub project_id: String,
    pub iteration: u32,
    pub role: AgentRole,
    pub input_prompt: String,
    pub output: Option<String>,
    /// Wall-clock time including retries and backoff.
    pub execution_time: Duration,
    pub tokens_used: u32,
    pub attempts: u32,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl AgentExecution {
    pub fn succeeded(&self) -> bool {
        self.output.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriterionScore {
    pub criterion: String,
    pub score: f32,
    pub weight: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityEvaluation {
    pub id: String,
    pub project_id: String,
    pub iteration: u32,
    pub score: f32,
    /// In rubric order.
    pub criteria_breakdown: Vec<CriterionScore>,
    pub approved: bool,
    pub feedback: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A discovered source, already normalized by the research layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub url: String,
    pub canonical_id: String,
    pub title: String,
    pub snippet: String,
    /// Clamped to [0, 1].
    pub relevance: f32,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

/// One search query issued during a round and what it retained.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchData {
    pub id: String,
    pub project_id: String,
    pub iteration: u32,
    pub query: String,
    pub sources: Vec<Source>,
    pub aggregate_relevance: f32,
    pub content_summary: String,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Limits applied by the research aggregator each round.
#[derive(Debug, Clone, PartialEq)]
pub struct ResearchLimits {
    pub max_queries: usize,
    pub per_query_result_cap: usize,
    pub total_source_cap: usize,
}

impl Default for ResearchLimits {
    fn default() -> Self {
        Self {
            max_queries: 5,
            per_query_result_cap: 5,
            total_source_cap: 12,
        }
    }
}

/// Everything `run_project` needs besides the project and its request.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub max_iterations: u32,
    pub approval_threshold: f32,
    pub min_criterion_floor: Option<f32>,
    pub token_budget: u64,
    pub time_budget: Duration,
    pub max_retries_per_call: u32,
    pub retry_backoff: BackoffConfig,
    pub models: RoleModels,
    pub research: ResearchLimits,
    pub rubric: Rubric,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl RunConfig {
    /// Reject out-of-range values before any state change.
    pub fn validate(&self) -> Result<(), AutonoError> {
        if self.max_iterations == 0 {
            return Err(AutonoError::Config("max_iterations must be > 0".into()));
        }
        if !(0.0..=10.0).contains(&self.approval_threshold) {
            return Err(AutonoError::Config(format!(
                "approval_threshold must be in [0, 10], got {}",
                self.approval_threshold
            )));
        }
        if let Some(floor) = self.min_criterion_floor {
            if !(0.0..=10.0).contains(&floor) {
                return Err(AutonoError::Config(format!(
                    "min_criterion_floor must be in [0, 10], got {floor}"
                )));
            }
        }
        if self.token_budget == 0 {
            return Err(AutonoError::Config("token_budget must be > 0".into()));
        }
        if self.time_budget.is_zero() {
            return Err(AutonoError::Config("time_budget must be > 0".into()));
        }
        let backoff = &self.retry_backoff;
        if backoff.multiplier < 1.0 || backoff.max_delay_ms < backoff.base_delay_ms {
            return Err(AutonoError::Config(
                "retry_backoff needs multiplier >= 1 and max_delay_ms >= base_delay_ms".into(),
            ));
        }
        if self.research.per_query_result_cap == 0 || self.research.total_source_cap == 0 {
            return Err(AutonoError::Config("research caps must be > 0".into()));
        }
        self.rubric.validate()
    }
}

impl From<&Config> for RunConfig {
    fn from(config: &Config) -> Self {
        let it = &config.iteration;
        Self {
            max_iterations: it.max_iterations,
            approval_threshold: it.approval_threshold,
            min_criterion_floor: it.min_criterion_floor,
            token_budget: it.token_budget,
            time_budget: Duration::from_secs(it.time_budget_seconds),
            max_retries_per_call: it.max_retries_per_call,
            retry_backoff: it.retry_backoff.clone(),
            models: RoleModels::from_config(&config.provider, &config.models),
            research: ResearchLimits {
                max_queries: config.research.max_queries,
                per_query_result_cap: config.research.per_query_result_cap,
                total_source_cap: config.research.total_source_cap,
            },
            rubric: Rubric::from(&config.rubric),
        }
    }
}

/// Token and time spent by a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageTotals {
    pub tokens: u64,
    pub elapsed: Duration,
    pub calls: u32,
}

/// What `run_project` returns once the project reaches a terminal state.
#[derive(Debug, Clone)]
pub struct TerminalOutcome {
    pub project_id: String,
    pub status: ProjectStatus,
    pub reason: Option<FailureReason>,
    pub final_content: Option<String>,
    pub final_score: Option<f32>,
    pub iterations: u32,
    pub usage: UsageTotals,
    pub ledger: Ledger,
}

impl TerminalOutcome {
    pub fn is_completed(&self) -> bool {
        self.status == ProjectStatus::Completed
    }
}

/// Real-time progress events emitted by the controller.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    RunStarted {
        project_id: String,
        max_iterations: u32,
    },
    IterationStart {
        iteration: u32,
        max_iterations: u32,
    },
    RoleFinished {
        iteration: u32,
        role: AgentRole,
        tokens: u32,
        elapsed: Duration,
        attempts: u32,
        ok: bool,
    },
    ResearchGathered {
        iteration: u32,
        queries: usize,
        sources: usize,
        aggregate_relevance: f32,
    },
    Evaluated {
        iteration: u32,
        score: f32,
        approved: bool,
    },
    Finished {
        status: ProjectStatus,
        reason: Option<FailureReason>,
        iterations: u32,
        total_tokens: u64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_role_order_and_roundtrip() {
        assert_eq!(AgentRole::ALL[0], AgentRole::Planner);
        assert_eq!(AgentRole::ALL[3], AgentRole::Critic);
        for role in AgentRole::ALL {
            assert_eq!(role.as_str().parse::<AgentRole>().unwrap(), role);
        }
        assert!("editor".parse::<AgentRole>().is_err());
    }

    #[test]
    fn test_failure_reason_roundtrip() {
        for r in [
            FailureReason::MaxIterationsExceeded,
            FailureReason::BudgetExceeded,
            FailureReason::ProviderError,
            FailureReason::Cancelled,
            FailureReason::StorageError,
        ] {
            assert_eq!(r.as_str().parse::<FailureReason>().unwrap(), r);
            assert_eq!(serde_json::to_string(&r).unwrap(), format!("\"{}\"", r));
        }
    }

    #[test]
    fn test_project_new_is_draft() {
        let p = Project::new("Essay");
        assert_eq!(p.status, ProjectStatus::Draft);
        assert!(p.failure_reason.is_none());
        assert!(p.final_content.is_none());
        assert!(!p.id.is_empty());
    }

    #[test]
    fn test_run_config_from_default_config_is_valid() {
        let rc = RunConfig::default();
        assert_eq!(rc.max_iterations, 3);
        assert_eq!(rc.time_budget, Duration::from_secs(1800));
        assert!(rc.validate().is_ok());
    }

    #[test]
    fn test_run_config_rejects_zero_iterations() {
        let rc = RunConfig {
            max_iterations: 0,
            ..Default::default()
        };
        assert!(matches!(rc.validate(), Err(AutonoError::Config(_))));
    }

    #[test]
    fn test_run_config_rejects_threshold_out_of_range() {
        for threshold in [-0.1, 10.5] {
            let rc = RunConfig {
                approval_threshold: threshold,
                ..Default::default()
            };
            assert!(rc.validate().is_err());
        }
    }

    #[test]
    fn test_run_config_rejects_bad_floor_and_backoff() {
        let rc = RunConfig {
            min_criterion_floor: Some(11.0),
            ..Default::default()
        };
        assert!(rc.validate().is_err());

        let mut rc = RunConfig::default();
        rc.retry_backoff.multiplier = 0.5;
        assert!(rc.validate().is_err());
    }
}
