// src/main.rs — AutonoWrite entry point

use clap::Parser;

use autonowrite::cli::{Cli, Commands};
use autonowrite::infra::config::Config;
use autonowrite::infra::{logger, paths};
use autonowrite::store::SqliteStore;

#[tokio::main]
async fn main() {
    // Initialize logging (respects RUST_LOG / AUTONOWRITE_LOG)
    logger::init_logging("warn");

    if let Err(e) = run().await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load config (falls back to defaults if no config.toml)
    let mut config = match cli.config {
        Some(ref path) => {
            let mut c = Config::load_from(path)?;
            c.apply_env();
            c
        }
        None => Config::load()?,
    };
    if let Some(ref db) = cli.db {
        config.storage.db_path = Some(db.display().to_string());
    }

    match cli.command {
        Commands::Validate { ref request } => autonowrite::cli::validate::validate_request(request),
        Commands::Run(ref args) => {
            paths::ensure_dirs().await?;
            autonowrite::cli::run::run_request(args, config).await
        }
        Commands::Experiment(ref args) => {
            paths::ensure_dirs().await?;
            autonowrite::cli::experiment::run_experiment(args, config).await
        }
        Commands::Status {
            ref project_id,
            verbose,
        } => {
            let store = SqliteStore::open(&config.storage.resolved_db_path())?;
            autonowrite::cli::status::show_status(&store, project_id, verbose)
        }
        Commands::List => {
            let store = SqliteStore::open(&config.storage.resolved_db_path())?;
            autonowrite::cli::status::list_projects(&store)
        }
    }
}
