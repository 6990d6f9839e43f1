// src/cli/mod.rs — CLI definition (clap derive)

pub mod experiment;
pub mod progress;
pub mod run;
pub mod status;
pub mod validate;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::infra::config::{Config, ProviderKind};

#[derive(Parser)]
#[command(
    name = "autonowrite",
    about = "Plan, research, write and critique long-form text until it passes review",
    version
)]
pub struct Cli {
    /// Config file path
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Database path (overrides [storage] db_path)
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create a project from a request file and run it to completion
    Run(RunArgs),
    /// Show a project's status and audit ledger
    Status {
        project_id: String,
        /// Include prompts and outputs of every call
        #[arg(long)]
        verbose: bool,
    },
    /// List all projects
    List,
    /// Check a request file without running it
    Validate { request: PathBuf },
    /// Run requests under several iteration caps and compare the results
    Experiment(ExperimentArgs),
}

#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// Structured request (JSON)
    pub request: PathBuf,

    /// Project title (defaults to the rendered topic)
    #[arg(long)]
    pub title: Option<String>,

    /// Provider: simulation, hosted (groq) or local (ollama)
    #[arg(long)]
    pub provider: Option<String>,

    /// Model for every role
    #[arg(short, long)]
    pub model: Option<String>,

    /// Max rounds
    #[arg(short = 'i', long)]
    pub max_iterations: Option<u32>,

    /// Approval threshold (0-10)
    #[arg(short = 'q', long)]
    pub threshold: Option<f32>,

    /// Directory for the JSON report
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Suppress progress output (only emit final result)
    #[arg(long)]
    pub quiet: bool,
}

impl RunArgs {
    /// Command-line flags win over the config file and the environment.
    pub fn apply_overrides(&self, config: &mut Config) -> anyhow::Result<()> {
        if let Some(ref p) = self.provider {
            config.provider.kind = p.parse::<ProviderKind>().map_err(anyhow::Error::msg)?;
        }
        if let Some(ref m) = self.model {
            config.provider.model = Some(m.clone());
        }
        if let Some(n) = self.max_iterations {
            config.iteration.max_iterations = n;
        }
        if let Some(t) = self.threshold {
            config.iteration.approval_threshold = t;
        }
        Ok(())
    }
}

#[derive(Args, Debug, Clone)]
pub struct ExperimentArgs {
    /// Structured requests (JSON), one per topic
    #[arg(required = true)]
    pub requests: Vec<PathBuf>,

    /// Iteration caps to compare
    #[arg(short = 'i', long, value_delimiter = ',', default_values_t = [1u32, 2, 3])]
    pub iterations: Vec<u32>,

    /// Provider: simulation, hosted (groq) or local (ollama)
    #[arg(long)]
    pub provider: Option<String>,

    /// Model for every role
    #[arg(short, long)]
    pub model: Option<String>,

    /// Approval threshold (0-10)
    #[arg(short = 'q', long)]
    pub threshold: Option<f32>,

    /// Directory for the JSON and Markdown results
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Suppress progress output
    #[arg(long)]
    pub quiet: bool,
}

impl ExperimentArgs {
    /// Same precedence as `run`; the iteration cap is set per trial.
    pub fn apply_overrides(&self, config: &mut Config) -> anyhow::Result<()> {
        RunArgs {
            provider: self.provider.clone(),
            model: self.model.clone(),
            threshold: self.threshold,
            ..Default::default()
        }
        .apply_overrides(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run_flags() {
        let cli = Cli::parse_from([
            "autonowrite",
            "run",
            "req.json",
            "-i",
            "5",
            "-q",
            "7.5",
            "--provider",
            "ollama",
            "--db",
            "/tmp/x.db",
        ]);
        assert_eq!(cli.db.as_deref(), Some(std::path::Path::new("/tmp/x.db")));
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        let mut config = Config::default();
        args.apply_overrides(&mut config).unwrap();
        assert_eq!(config.iteration.max_iterations, 5);
        assert!((config.iteration.approval_threshold - 7.5).abs() < f32::EPSILON);
        assert_eq!(config.provider.kind, ProviderKind::Local);
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let args = RunArgs {
            provider: Some("mystery".into()),
            ..Default::default()
        };
        assert!(args.apply_overrides(&mut Config::default()).is_err());
    }

    #[test]
    fn test_status_and_list() {
        let cli = Cli::parse_from(["autonowrite", "status", "abc", "--verbose"]);
        assert!(matches!(
            cli.command,
            Commands::Status { ref project_id, verbose: true } if project_id == "abc"
        ));
        let cli = Cli::parse_from(["autonowrite", "list"]);
        assert!(matches!(cli.command, Commands::List));
    }

    #[test]
    fn test_parse_experiment_flags() {
        let cli = Cli::parse_from(["autonowrite", "experiment", "a.json", "b.json"]);
        let Commands::Experiment(args) = cli.command else {
            panic!("expected experiment");
        };
        assert_eq!(args.requests.len(), 2);
        assert_eq!(args.iterations, vec![1, 2, 3]);

        let cli = Cli::parse_from([
            "autonowrite",
            "experiment",
            "a.json",
            "-i",
            "2,4",
            "-q",
            "9",
            "--provider",
            "simulation",
        ]);
        let Commands::Experiment(args) = cli.command else {
            panic!("expected experiment");
        };
        assert_eq!(args.iterations, vec![2, 4]);
        let mut config = Config::default();
        args.apply_overrides(&mut config).unwrap();
        assert_eq!(config.iteration.max_iterations, 3);
        assert!((config.iteration.approval_threshold - 9.0).abs() < f32::EPSILON);
        assert_eq!(config.provider.kind, ProviderKind::Simulation);
    }

    #[test]
    fn test_experiment_needs_a_request() {
        assert!(Cli::try_parse_from(["autonowrite", "experiment"]).is_err());
    }
}
