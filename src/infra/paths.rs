// src/infra/paths.rs — Path management
//
// All paths respect the AUTONOWRITE_HOME environment variable for isolation.
// When AUTONOWRITE_HOME is set, config and data live under that directory.
// When unset, config uses ~/.autonowrite/ and data uses XDG_DATA_HOME/autonowrite.

use directories::{BaseDirs, ProjectDirs};
use std::path::PathBuf;

/// Returns the AUTONOWRITE_HOME override, if set.
fn autonowrite_home() -> Option<PathBuf> {
    std::env::var_os("AUTONOWRITE_HOME").map(PathBuf::from)
}

/// Home directory, or the working directory when none can be determined.
pub fn dirs_home() -> PathBuf {
    BaseDirs::new()
        .map(|b| b.home_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Configuration directory: $AUTONOWRITE_HOME/ or ~/.autonowrite/
pub fn config_dir() -> PathBuf {
    if let Some(home) = autonowrite_home() {
        return home;
    }
    dirs_home().join(".autonowrite")
}

/// Data directory: $AUTONOWRITE_HOME/data/ or ~/.local/share/autonowrite/
pub fn data_dir() -> PathBuf {
    if let Some(home) = autonowrite_home() {
        return home.join("data");
    }
    ProjectDirs::from("", "", "autonowrite")
        .map(|d| d.data_local_dir().to_path_buf())
        .unwrap_or_else(|| config_dir().join("data"))
}

/// Database path
pub fn db_path() -> PathBuf {
    data_dir().join("autonowrite.db")
}

/// Where `run` writes its JSON reports.
pub fn output_dir() -> PathBuf {
    data_dir().join("generated")
}

/// Config file path
pub fn config_file_path() -> PathBuf {
    config_dir().join("config.toml")
}

/// Ensure all required directories exist
pub async fn ensure_dirs() -> anyhow::Result<()> {
    for dir in [config_dir(), data_dir(), output_dir()] {
        tokio::fs::create_dir_all(&dir).await?;
    }
    Ok(())
}
