// src/cli/run.rs — `run` command: execute a request and export a report

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::RunArgs;
use crate::core::orchestrator::IterationController;
use crate::core::request::StructuredInput;
use crate::core::state::ProjectStatus;
use crate::core::types::{FailureReason, RunConfig, TerminalOutcome};
use crate::evaluator::utils::truncate_chars;
use crate::infra::config::Config;
use crate::infra::paths;
use crate::provider::{resolver, ModelProvider};
use crate::research::backend::build_search_backend;
use crate::research::ResearchAggregator;
use crate::store::{ProjectStore, SqliteStore};

#[derive(Debug, Clone, Serialize)]
pub struct ProviderInfo {
    pub kind: String,
    pub id: String,
    pub name: String,
    pub model: String,
    pub search_backend: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CriticEntry {
    pub iteration: u32,
    pub score: f32,
    pub approved: bool,
    pub feedback: Option<String>,
}

/// JSON export written after every run, completed or not.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub project_id: String,
    pub topic: String,
    pub status: ProjectStatus,
    pub failure_reason: Option<FailureReason>,
    pub final_content: Option<String>,
    pub final_score: Option<f32>,
    pub iterations: u32,
    pub approved: bool,
    pub total_calls: u32,
    pub total_tokens: u64,
    pub elapsed_seconds: f64,
    pub provider: ProviderInfo,
    pub critic_history: Vec<CriticEntry>,
    pub generated_at: DateTime<Utc>,
}

impl RunReport {
    pub fn from_outcome(
        outcome: &TerminalOutcome,
        input: &StructuredInput,
        provider: ProviderInfo,
    ) -> Self {
        Self {
            project_id: outcome.project_id.clone(),
            topic: input.topic(),
            status: outcome.status,
            failure_reason: outcome.reason,
            final_content: outcome.final_content.clone(),
            final_score: outcome.final_score,
            iterations: outcome.iterations,
            approved: outcome.is_completed(),
            total_calls: outcome.usage.calls,
            total_tokens: outcome.usage.tokens,
            elapsed_seconds: outcome.usage.elapsed.as_secs_f64(),
            provider,
            critic_history: outcome
                .ledger
                .evaluations
                .iter()
                .map(|e| CriticEntry {
                    iteration: e.iteration,
                    score: e.score,
                    approved: e.approved,
                    feedback: e.feedback.clone(),
                })
                .collect(),
            generated_at: Utc::now(),
        }
    }

    pub fn file_name(&self) -> String {
        let short: String = self.project_id.chars().take(8).collect();
        format!(
            "autonowrite_{}_{}.json",
            self.generated_at.format("%Y%m%d_%H%M%S"),
            short
        )
    }
}

pub async fn write_report(report: &RunReport, dir: &Path) -> anyhow::Result<PathBuf> {
    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(report.file_name());
    let json = serde_json::to_string_pretty(report)?;
    tokio::fs::write(&path, json).await?;
    Ok(path)
}

/// Create a project for the request, run it and export the report.
///
/// Returns an error after the report is written when the project failed, so
/// the process exits non-zero.
pub async fn run_request(args: &RunArgs, mut config: Config) -> anyhow::Result<()> {
    let input = StructuredInput::load(&args.request)?;
    input.validate()?;
    args.apply_overrides(&mut config)?;
    let run_config = RunConfig::from(&config);
    run_config.validate()?;

    let provider = resolver::build_provider(&config.provider)?;
    let backend = build_search_backend(&config.research)?;
    let search_backend = backend.name().to_string();
    let research = Arc::new(ResearchAggregator::new(backend, config.research.fan_out));
    let store: Arc<dyn ProjectStore> =
        Arc::new(SqliteStore::open(&config.storage.resolved_db_path())?);

    let topic = input.topic();
    let title = args.title.clone().unwrap_or_else(|| topic.clone());
    let project = store.create_project(&title)?;
    store.save_structured_input(&project.id, &input)?;

    let mut controller = IterationController::new(provider.clone(), research, store.clone());
    if !args.quiet {
        controller = controller.with_progress(super::progress::terminal_progress());
    }

    let token = controller.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted; stopping after the current round");
            token.cancel();
        }
    });

    let model = config.provider.model_or_default();
    if !args.quiet {
        eprintln!(
            "[execute] {} | provider: {} | model: {}",
            truncate_chars(&topic, 60),
            provider.name(),
            model,
        );
    }

    let outcome = controller
        .run_project(&project, &input, &run_config)
        .await?;

    let report = RunReport::from_outcome(
        &outcome,
        &input,
        provider_info(provider.as_ref(), &config, model, search_backend),
    );
    let dir = args.output.clone().unwrap_or_else(paths::output_dir);
    let path = write_report(&report, &dir).await?;

    if let Some(ref content) = outcome.final_content {
        println!("{}", content);
    }
    if !args.quiet {
        eprintln!("[report] {}", path.display());
    }

    match outcome.reason {
        None => Ok(()),
        Some(reason) => anyhow::bail!(
            "project {} failed after {} iteration(s): {}",
            outcome.project_id,
            outcome.iterations,
            reason
        ),
    }
}

pub(crate) fn provider_info(
    provider: &dyn ModelProvider,
    config: &Config,
    model: String,
    search_backend: String,
) -> ProviderInfo {
    ProviderInfo {
        kind: config.provider.kind.as_str().to_string(),
        id: provider.id().to_string(),
        name: provider.name().to_string(),
        model,
        search_backend,
    }
}
