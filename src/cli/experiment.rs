// src/cli/experiment.rs — `experiment` command: compare iteration caps
//
// Runs every request once per `max_iterations` setting, then reports which
// setting gave the best quality, the fastest runs, and the best quality per
// second, with plain-language recommendations.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::run::{provider_info, ProviderInfo, RunReport};
use super::ExperimentArgs;
use crate::core::orchestrator::IterationController;
use crate::core::request::StructuredInput;
use crate::core::state::ProjectStatus;
use crate::core::types::{FailureReason, RunConfig};
use crate::evaluator::utils::truncate_chars;
use crate::infra::config::Config;
use crate::infra::errors::AutonoError;
use crate::infra::paths;
use crate::provider::resolver;
use crate::research::backend::build_search_backend;
use crate::research::ResearchAggregator;
use crate::store::{ProjectStore, SqliteStore};

/// Gain between consecutive settings that counts as a real improvement.
const SIGNIFICANT_GAIN: f64 = 0.5;
const EXCELLENT_SCORE: f64 = 8.0;
const GOOD_SCORE: f64 = 7.0;
/// Floor for the time denominator so instant runs still rank.
const MIN_AVG_SECONDS: f64 = 1e-3;

/// One request run under one setting.
#[derive(Debug, Clone, Serialize)]
pub struct TrialResult {
    pub project_id: String,
    pub topic: String,
    pub status: ProjectStatus,
    pub failure_reason: Option<FailureReason>,
    /// Approved score, or the last critic score when the run failed.
    pub final_score: f32,
    pub iterations_used: u32,
    pub elapsed_seconds: f64,
    pub calls: u32,
    pub tokens: u64,
    pub approved: bool,
    pub content_length: usize,
}

impl TrialResult {
    pub fn from_report(report: &RunReport) -> Self {
        let final_score = report
            .final_score
            .or_else(|| report.critic_history.last().map(|c| c.score))
            .unwrap_or(0.0);
        Self {
            project_id: report.project_id.clone(),
            topic: report.topic.clone(),
            status: report.status,
            failure_reason: report.failure_reason,
            final_score,
            iterations_used: report.iterations,
            elapsed_seconds: report.elapsed_seconds,
            calls: report.total_calls,
            tokens: report.total_tokens,
            approved: report.approved,
            content_length: report
                .final_content
                .as_deref()
                .map(|c| c.chars().count())
                .unwrap_or(0),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConfigStatistics {
    pub avg_score: f64,
    pub avg_seconds: f64,
    pub total_calls: u32,
    pub total_tokens: u64,
    pub approval_rate: f64,
}

impl ConfigStatistics {
    pub fn from_trials(trials: &[TrialResult]) -> Self {
        if trials.is_empty() {
            return Self::default();
        }
        let n = trials.len() as f64;
        Self {
            avg_score: round2(trials.iter().map(|t| t.final_score as f64).sum::<f64>() / n),
            avg_seconds: trials.iter().map(|t| t.elapsed_seconds).sum::<f64>() / n,
            total_calls: trials.iter().map(|t| t.calls).sum(),
            total_tokens: trials.iter().map(|t| t.tokens).sum(),
            approval_rate: trials.iter().filter(|t| t.approved).count() as f64 / n,
        }
    }

    /// Average score per second of run time.
    pub fn efficiency(&self) -> f64 {
        self.avg_score / self.avg_seconds.max(MIN_AVG_SECONDS)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ConfigurationResult {
    pub max_iterations: u32,
    pub trials: Vec<TrialResult>,
    pub statistics: ConfigStatistics,
}

impl ConfigurationResult {
    pub fn new(max_iterations: u32, trials: Vec<TrialResult>) -> Self {
        let statistics = ConfigStatistics::from_trials(&trials);
        Self {
            max_iterations,
            trials,
            statistics,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfigPick {
    pub max_iterations: u32,
    pub avg_score: f64,
    pub avg_seconds: f64,
    pub efficiency: f64,
}

impl ConfigPick {
    fn of(config: &ConfigurationResult) -> Self {
        Self {
            max_iterations: config.max_iterations,
            avg_score: config.statistics.avg_score,
            avg_seconds: config.statistics.avg_seconds,
            efficiency: config.statistics.efficiency(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExperimentSummary {
    pub best_quality: ConfigPick,
    pub fastest: ConfigPick,
    pub most_efficient: ConfigPick,
    /// Spread between the best and worst average score, relative to the worst.
    pub quality_improvement_percent: f64,
    pub total_calls: u32,
    pub total_tokens: u64,
    pub recommendations: Vec<String>,
}

/// Pick the best configurations. `None` when nothing ran.
///
/// Ties go to the configuration listed first, so the cheaper setting wins
/// when settings are listed in ascending order.
pub fn summarize(configs: &[ConfigurationResult]) -> Option<ExperimentSummary> {
    let best_quality = pick(configs, |a, b| a.statistics.avg_score > b.statistics.avg_score)?;
    let fastest = pick(configs, |a, b| a.statistics.avg_seconds < b.statistics.avg_seconds)?;
    let most_efficient = pick(configs, |a, b| {
        a.statistics.efficiency() > b.statistics.efficiency()
    })?;

    let (lo, hi) = configs.iter().map(|c| c.statistics.avg_score).fold(
        (f64::INFINITY, f64::NEG_INFINITY),
        |(lo, hi), s| (lo.min(s), hi.max(s)),
    );
    let quality_improvement_percent = if lo > 0.0 {
        ((hi - lo) / lo * 1000.0).round() / 10.0
    } else {
        0.0
    };

    Some(ExperimentSummary {
        best_quality: ConfigPick::of(best_quality),
        fastest: ConfigPick::of(fastest),
        most_efficient: ConfigPick::of(most_efficient),
        quality_improvement_percent,
        total_calls: configs.iter().map(|c| c.statistics.total_calls).sum(),
        total_tokens: configs.iter().map(|c| c.statistics.total_tokens).sum(),
        recommendations: recommendations(configs),
    })
}

fn pick(
    configs: &[ConfigurationResult],
    better: impl Fn(&ConfigurationResult, &ConfigurationResult) -> bool,
) -> Option<&ConfigurationResult> {
    let mut iter = configs.iter();
    let first = iter.next()?;
    Some(iter.fold(first, |best, c| if better(c, best) { c } else { best }))
}

pub fn recommendations(configs: &[ConfigurationResult]) -> Vec<String> {
    let mut out = Vec::new();
    let mut by_cap: Vec<(u32, f64)> = configs
        .iter()
        .map(|c| (c.max_iterations, c.statistics.avg_score))
        .collect();
    by_cap.sort_by_key(|(n, _)| *n);

    if by_cap.len() > 1 {
        let first_gain = by_cap[1].1 - by_cap[0].1;
        if first_gain > SIGNIFICANT_GAIN {
            out.push(format!(
                "Raising the cap from {} to {} iteration(s) improves quality significantly (+{:.2})",
                by_cap[0].0, by_cap[1].0, first_gain
            ));
        }
        if by_cap.len() > 2 {
            let second_gain = by_cap[2].1 - by_cap[1].1;
            if second_gain < first_gain * 0.5 {
                out.push(format!(
                    "Diminishing returns beyond {} iteration(s)",
                    by_cap[1].0
                ));
            }
        }
        if let Some(best) = pick(configs, |a, b| a.statistics.avg_score > b.statistics.avg_score)
        {
            if best.statistics.avg_score >= EXCELLENT_SCORE {
                out.push(format!(
                    "{} iteration(s) reach excellent quality ({:.2}/10)",
                    best.max_iterations, best.statistics.avg_score
                ));
            }
        }
    }

    if let Some(fastest) = pick(configs, |a, b| {
        a.statistics.avg_seconds < b.statistics.avg_seconds
    }) {
        if fastest.statistics.avg_score >= GOOD_SCORE {
            out.push(format!(
                "For quick turnaround: {} iteration(s) give good quality in {:.1}s",
                fastest.max_iterations, fastest.statistics.avg_seconds
            ));
        }
    }
    out
}

/// Full experiment export.
#[derive(Debug, Clone, Serialize)]
pub struct ExperimentReport {
    pub experiment_id: String,
    pub topics: Vec<String>,
    pub provider: ProviderInfo,
    pub configurations: Vec<ConfigurationResult>,
    pub summary: Option<ExperimentSummary>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl ExperimentReport {
    pub fn file_stem(&self) -> String {
        format!("experiment_{}", self.experiment_id)
    }

    pub fn render_markdown(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "# AutonoWrite experiment {}", self.experiment_id);
        let _ = writeln!(out);
        let _ = writeln!(out, "- Topics: {}", self.topics.len());
        let caps: Vec<String> = self
            .configurations
            .iter()
            .map(|c| c.max_iterations.to_string())
            .collect();
        let _ = writeln!(out, "- Iteration caps: {}", caps.join(", "));
        let _ = writeln!(
            out,
            "- Trials: {}",
            self.configurations.iter().map(|c| c.trials.len()).sum::<usize>()
        );
        let _ = writeln!(
            out,
            "- Provider: {} ({})",
            self.provider.name, self.provider.model
        );

        if let Some(ref s) = self.summary {
            let _ = writeln!(out, "\n## Summary\n");
            for (label, p) in [
                ("Best quality", &s.best_quality),
                ("Fastest", &s.fastest),
                ("Most efficient", &s.most_efficient),
            ] {
                let _ = writeln!(
                    out,
                    "- {label}: {} iteration(s), avg score {:.2}/10, avg time {:.1}s",
                    p.max_iterations, p.avg_score, p.avg_seconds
                );
            }
            let _ = writeln!(
                out,
                "- Quality spread: {:.1}%, {} call(s), {} tokens",
                s.quality_improvement_percent, s.total_calls, s.total_tokens
            );
        }

        for c in &self.configurations {
            let st = &c.statistics;
            let _ = writeln!(out, "\n## {} iteration(s)\n", c.max_iterations);
            let _ = writeln!(
                out,
                "Avg score {:.2}/10, avg time {:.1}s, approval {:.0}%, {} call(s)\n",
                st.avg_score,
                st.avg_seconds,
                st.approval_rate * 100.0,
                st.total_calls
            );
            for t in &c.trials {
                let _ = writeln!(
                    out,
                    "- {} (score {:.1}, {})",
                    truncate_chars(&t.topic, 60),
                    t.final_score,
                    t.failure_reason
                        .map(|r| r.as_str())
                        .unwrap_or("approved")
                );
            }
        }

        if let Some(ref s) = self.summary {
            if !s.recommendations.is_empty() {
                let _ = writeln!(out, "\n## Recommendations\n");
                for r in &s.recommendations {
                    let _ = writeln!(out, "- {r}");
                }
            }
        }
        out
    }
}

/// Run each input once per iteration cap, settings in the given order.
///
/// Every trial gets its own project. Trials stop early once the controller's
/// cancellation token fires.
pub async fn run_trials(
    controller: &IterationController,
    inputs: &[StructuredInput],
    caps: &[u32],
    base: &RunConfig,
    provider: &ProviderInfo,
) -> Result<Vec<ConfigurationResult>, AutonoError> {
    let store = controller.store();
    let cancel = controller.cancellation_token();
    let mut configs = Vec::with_capacity(caps.len());

    'caps: for &cap in caps {
        let run_config = RunConfig {
            max_iterations: cap,
            ..base.clone()
        };
        run_config.validate()?;

        let mut trials = Vec::with_capacity(inputs.len());
        for input in inputs {
            if cancel.is_cancelled() {
                configs.push(ConfigurationResult::new(cap, trials));
                break 'caps;
            }
            let project = store.create_project(&format!("[cap {cap}] {}", input.topic()))?;
            store.save_structured_input(&project.id, input)?;
            let outcome = controller.run_project(&project, input, &run_config).await?;
            let report = RunReport::from_outcome(&outcome, input, provider.clone());
            let trial = TrialResult::from_report(&report);
            tracing::info!(
                cap,
                project_id = %trial.project_id,
                score = trial.final_score,
                approved = trial.approved,
                "Experiment trial finished"
            );
            trials.push(trial);
        }
        configs.push(ConfigurationResult::new(cap, trials));
    }
    Ok(configs)
}

pub async fn write_experiment(
    report: &ExperimentReport,
    dir: &Path,
) -> anyhow::Result<(PathBuf, PathBuf)> {
    tokio::fs::create_dir_all(dir).await?;
    let json_path = dir.join(format!("{}.json", report.file_stem()));
    let md_path = dir.join(format!("{}.md", report.file_stem()));
    tokio::fs::write(&json_path, serde_json::to_string_pretty(report)?).await?;
    tokio::fs::write(&md_path, report.render_markdown()).await?;
    Ok((json_path, md_path))
}

pub async fn run_experiment(args: &ExperimentArgs, mut config: Config) -> anyhow::Result<()> {
    if args.iterations.is_empty() {
        anyhow::bail!("at least one iteration cap is required");
    }
    let mut inputs = Vec::with_capacity(args.requests.len());
    for path in &args.requests {
        let input = StructuredInput::load(path)?;
        input.validate()?;
        inputs.push(input);
    }
    args.apply_overrides(&mut config)?;
    let base = RunConfig::from(&config);
    base.validate()?;

    let provider = resolver::build_provider(&config.provider)?;
    let backend = build_search_backend(&config.research)?;
    let search_backend = backend.name().to_string();
    let research = Arc::new(ResearchAggregator::new(backend, config.research.fan_out));
    let store: Arc<dyn ProjectStore> =
        Arc::new(SqliteStore::open(&config.storage.resolved_db_path())?);

    let mut controller = IterationController::new(provider.clone(), research, store);
    if !args.quiet {
        controller = controller.with_progress(super::progress::terminal_progress());
    }
    let token = controller.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted; stopping the experiment after the current round");
            token.cancel();
        }
    });

    let model = config.provider.model_or_default();
    let info = provider_info(provider.as_ref(), &config, model, search_backend);
    let started_at = Utc::now();
    let experiment_id = format!("exp_{}", started_at.format("%Y%m%d_%H%M%S"));
    if !args.quiet {
        eprintln!(
            "[experiment] {} | {} topic(s) | caps {:?} | provider: {}",
            experiment_id,
            inputs.len(),
            args.iterations,
            info.name
        );
    }

    let configurations = run_trials(&controller, &inputs, &args.iterations, &base, &info).await?;
    let report = ExperimentReport {
        experiment_id,
        topics: inputs.iter().map(StructuredInput::topic).collect(),
        provider: info,
        summary: summarize(&configurations),
        configurations,
        started_at,
        finished_at: Utc::now(),
    };

    let dir = args
        .output
        .clone()
        .unwrap_or_else(|| paths::output_dir().join("experiments"));
    let (json_path, md_path) = write_experiment(&report, &dir).await?;
    print!("{}", report.render_markdown());
    if !args.quiet {
        eprintln!("[report] {}", json_path.display());
        eprintln!("[report] {}", md_path.display());
    }
    Ok(())
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn trial(score: f32, seconds: f64, approved: bool) -> TrialResult {
        TrialResult {
            project_id: "p".into(),
            topic: "Rust".into(),
            status: if approved {
                ProjectStatus::Completed
            } else {
                ProjectStatus::Failed
            },
            failure_reason: (!approved).then_some(FailureReason::MaxIterationsExceeded),
            final_score: score,
            iterations_used: 1,
            elapsed_seconds: seconds,
            calls: 4,
            tokens: 1000,
            approved,
            content_length: 10,
        }
    }

    fn config(cap: u32, trials: Vec<TrialResult>) -> ConfigurationResult {
        ConfigurationResult::new(cap, trials)
    }

    #[test]
    fn test_statistics() {
        let st = ConfigStatistics::from_trials(&[trial(7.0, 2.0, false), trial(9.0, 4.0, true)]);
        assert_eq!(st.avg_score, 8.0);
        assert_eq!(st.avg_seconds, 3.0);
        assert_eq!(st.total_calls, 8);
        assert_eq!(st.total_tokens, 2000);
        assert_eq!(st.approval_rate, 0.5);
        assert_eq!(ConfigStatistics::from_trials(&[]), ConfigStatistics::default());
    }

    #[test]
    fn test_summary_picks() {
        let configs = vec![
            config(1, vec![trial(6.0, 1.0, false)]),
            config(2, vec![trial(8.0, 2.0, true)]),
            config(3, vec![trial(8.2, 6.0, true)]),
        ];
        let s = summarize(&configs).unwrap();
        assert_eq!(s.best_quality.max_iterations, 3);
        assert_eq!(s.fastest.max_iterations, 1);
        // 6.0/s against 4.0/s against ~1.37/s
        assert_eq!(s.most_efficient.max_iterations, 1);
        assert_eq!(s.quality_improvement_percent, 36.7);
        assert_eq!(s.total_calls, 12);
    }

    #[test]
    fn test_ties_go_to_first_listed() {
        let configs = vec![
            config(1, vec![trial(8.0, 1.0, true)]),
            config(2, vec![trial(8.0, 1.0, true)]),
        ];
        let s = summarize(&configs).unwrap();
        assert_eq!(s.best_quality.max_iterations, 1);
        assert_eq!(s.fastest.max_iterations, 1);
        assert_eq!(s.quality_improvement_percent, 0.0);
    }

    #[test]
    fn test_summary_empty() {
        assert!(summarize(&[]).is_none());
    }

    #[test]
    fn test_zero_time_runs_still_rank() {
        let configs = vec![
            config(1, vec![trial(5.0, 0.0, false)]),
            config(2, vec![trial(9.0, 0.0, true)]),
        ];
        let s = summarize(&configs).unwrap();
        assert_eq!(s.most_efficient.max_iterations, 2);
        assert!(s.most_efficient.efficiency.is_finite());
    }

    #[test]
    fn test_recommendations() {
        let configs = vec![
            config(3, vec![trial(8.3, 6.0, true)]),
            config(1, vec![trial(7.0, 1.0, false)]),
            config(2, vec![trial(8.1, 2.0, true)]),
        ];
        let recs = recommendations(&configs);
        assert_eq!(recs.len(), 4);
        assert!(recs[0].contains("from 1 to 2"));
        assert!(recs[1].contains("beyond 2"));
        assert!(recs[2].starts_with("3 iteration(s) reach excellent quality"));
        assert!(recs[3].starts_with("For quick turnaround: 1 iteration(s)"));
    }

    #[test]
    fn test_no_recommendations_for_flat_low_scores() {
        let configs = vec![
            config(1, vec![trial(5.0, 1.0, false)]),
            config(2, vec![trial(5.2, 2.0, false)]),
        ];
        assert!(recommendations(&configs).is_empty());
    }

    #[test]
    fn test_trial_uses_last_critic_score_when_failed() {
        use crate::cli::run::CriticEntry;
        let report = RunReport {
            project_id: "p".into(),
            topic: "Rust".into(),
            status: ProjectStatus::Failed,
            failure_reason: Some(FailureReason::MaxIterationsExceeded),
            final_content: None,
            final_score: None,
            iterations: 2,
            approved: false,
            total_calls: 8,
            total_tokens: 900,
            elapsed_seconds: 1.5,
            provider: ProviderInfo {
                kind: "simulation".into(),
                id: "simulation".into(),
                name: "Simulation".into(),
                model: "simulated".into(),
                search_backend: "simulated".into(),
            },
            critic_history: vec![
                CriticEntry {
                    iteration: 1,
                    score: 6.0,
                    approved: false,
                    feedback: None,
                },
                CriticEntry {
                    iteration: 2,
                    score: 7.1,
                    approved: false,
                    feedback: None,
                },
            ],
            generated_at: Utc::now(),
        };
        let t = TrialResult::from_report(&report);
        assert_eq!(t.final_score, 7.1);
        assert_eq!(t.content_length, 0);
        assert!(!t.approved);
    }

    #[test]
    fn test_markdown_lists_configurations() {
        let configurations = vec![
            config(1, vec![trial(6.0, 1.0, false)]),
            config(2, vec![trial(8.6, 2.0, true)]),
        ];
        let report = ExperimentReport {
            experiment_id: "exp_1".into(),
            topics: vec!["Rust".into()],
            provider: ProviderInfo {
                kind: "simulation".into(),
                id: "simulation".into(),
                name: "Simulation".into(),
                model: "simulated".into(),
                search_backend: "simulated".into(),
            },
            summary: summarize(&configurations),
            configurations,
            started_at: Utc::now(),
            finished_at: Utc::now(),
        };
        let md = report.render_markdown();
        assert!(md.starts_with("# AutonoWrite experiment exp_1"));
        assert!(md.contains("- Iteration caps: 1, 2"));
        assert!(md.contains("## 2 iteration(s)"));
        assert!(md.contains("max_iterations_exceeded"));
        assert!(md.contains("## Recommendations"));
        assert_eq!(report.file_stem(), "experiment_exp_1");
    }
}
