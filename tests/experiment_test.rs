// tests/experiment_test.rs — Integration test: iteration-cap experiments on the offline stack

use std::sync::Arc;

use pretty_assertions::assert_eq;

use autonowrite::cli::experiment::{run_trials, summarize, ExperimentReport};
use autonowrite::cli::run::ProviderInfo;
use autonowrite::core::orchestrator::IterationController;
use autonowrite::core::request::StructuredInput;
use autonowrite::core::state::ProjectStatus;
use autonowrite::core::types::{FailureReason, RunConfig};
use autonowrite::provider::simulation::SimulationProvider;
use autonowrite::research::backend::SimulatedSearch;
use autonowrite::research::ResearchAggregator;
use autonowrite::store::{ArenaStore, ProjectStore};

fn simulated_controller(store: Arc<dyn ProjectStore>) -> IterationController {
    let research = Arc::new(ResearchAggregator::new(Arc::new(SimulatedSearch), 4));
    IterationController::new(Arc::new(SimulationProvider::new()), research, store)
}

fn info() -> ProviderInfo {
    ProviderInfo {
        kind: "simulation".into(),
        id: "simulation".into(),
        name: "Simulation".into(),
        model: "simulated".into(),
        search_backend: "simulated".into(),
    }
}

fn inputs() -> Vec<StructuredInput> {
    vec![
        StructuredInput::new("Distributed systems", "Explain Raft consensus"),
        StructuredInput::new("Databases", "Compare B-trees and LSM trees"),
    ]
}

#[tokio::test]
async fn test_second_iteration_wins_on_simulated_runs() {
    let store: Arc<dyn ProjectStore> = Arc::new(ArenaStore::new());
    let controller = simulated_controller(store.clone());
    let base = RunConfig {
        approval_threshold: 8.0,
        ..RunConfig::default()
    };

    let configs = run_trials(&controller, &inputs(), &[1, 2], &base, &info())
        .await
        .unwrap();

    assert_eq!(configs.len(), 2);
    assert_eq!(store.list_projects().unwrap().len(), 4);

    let one = &configs[0];
    assert_eq!(one.max_iterations, 1);
    assert_eq!(one.trials.len(), 2);
    for t in &one.trials {
        assert_eq!(t.status, ProjectStatus::Failed);
        assert_eq!(t.failure_reason, Some(FailureReason::MaxIterationsExceeded));
        assert!((t.final_score - 7.7).abs() < 1e-3);
        assert_eq!(t.content_length, 0);
    }
    assert_eq!(one.statistics.avg_score, 7.7);
    assert_eq!(one.statistics.approval_rate, 0.0);
    assert_eq!(one.statistics.total_calls, 8);

    let two = &configs[1];
    for t in &two.trials {
        assert!(t.approved);
        assert_eq!(t.iterations_used, 2);
        assert!(t.content_length > 0);
    }
    assert_eq!(two.statistics.avg_score, 8.6);
    assert_eq!(two.statistics.approval_rate, 1.0);
    assert_eq!(two.statistics.total_calls, 16);

    let summary = summarize(&configs).unwrap();
    assert_eq!(summary.best_quality.max_iterations, 2);
    assert_eq!(summary.quality_improvement_percent, 11.7);
    assert_eq!(summary.total_calls, 24);
    assert!(summary
        .recommendations
        .iter()
        .any(|r| r.contains("from 1 to 2")));
    assert!(summary
        .recommendations
        .iter()
        .any(|r| r.starts_with("2 iteration(s) reach excellent quality")));
}

#[tokio::test]
async fn test_cancelled_experiment_runs_nothing() {
    let store: Arc<dyn ProjectStore> = Arc::new(ArenaStore::new());
    let controller = simulated_controller(store.clone());
    controller.cancellation_token().cancel();

    let configs = run_trials(&controller, &inputs(), &[1, 2, 3], &RunConfig::default(), &info())
        .await
        .unwrap();

    assert_eq!(configs.len(), 1);
    assert!(configs[0].trials.is_empty());
    assert!(store.list_projects().unwrap().is_empty());
}

#[tokio::test]
async fn test_zero_cap_is_rejected_before_any_project() {
    let store: Arc<dyn ProjectStore> = Arc::new(ArenaStore::new());
    let controller = simulated_controller(store.clone());

    let err = run_trials(&controller, &inputs(), &[0], &RunConfig::default(), &info())
        .await
        .unwrap_err();

    assert!(err.to_string().contains("max_iterations"));
    assert!(store.list_projects().unwrap().is_empty());
}

#[tokio::test]
async fn test_experiment_files_written() {
    let store: Arc<dyn ProjectStore> = Arc::new(ArenaStore::new());
    let controller = simulated_controller(store);
    let inputs = inputs();
    let base = RunConfig::default();
    let configurations = run_trials(&controller, &inputs[..1], &[1, 2], &base, &info())
        .await
        .unwrap();
    let report = ExperimentReport {
        experiment_id: "exp_test".into(),
        topics: vec![inputs[0].topic()],
        provider: info(),
        summary: summarize(&configurations),
        configurations,
        started_at: chrono::Utc::now(),
        finished_at: chrono::Utc::now(),
    };

    let dir = tempfile::tempdir().unwrap();
    let (json_path, md_path) = autonowrite::cli::experiment::write_experiment(&report, dir.path())
        .await
        .unwrap();

    assert!(json_path.ends_with("experiment_exp_test.json"));
    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(json_path).unwrap()).unwrap();
    assert_eq!(json["configurations"].as_array().unwrap().len(), 2);
    assert_eq!(json["summary"]["best_quality"]["max_iterations"], 2);
    assert_eq!(json["configurations"][1]["trials"][0]["status"], "completed");
    let md = std::fs::read_to_string(md_path).unwrap();
    assert!(md.contains("## Recommendations"));
}
