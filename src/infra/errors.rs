// src/infra/errors.rs — Error types for AutonoWrite

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AutonoError {
    // Provider errors (retriable depends on the flag)
    #[error("Provider '{provider}' error: {message}")]
    Provider {
        provider: String,
        message: String,
        retriable: bool,
    },

    #[error("Rate limited by '{provider}', retry after {retry_after_ms}ms")]
    RateLimited {
        provider: String,
        retry_after_ms: u64,
    },

    #[error("Provider '{provider}' timed out after {timeout_ms}ms")]
    Timeout { provider: String, timeout_ms: u64 },

    #[error("Search backend '{backend}' error: {message}")]
    Search { backend: String, message: String },

    // Lifecycle errors (not retriable)
    #[error("Invalid status transition for project {project_id}: {from} -> {to}")]
    InvalidTransition {
        project_id: String,
        from: String,
        to: String,
    },

    #[error("Project {project_id} cannot start a run: status is {status}")]
    RunRejected { project_id: String, status: String },

    #[error("Project {0} not found")]
    ProjectNotFound(String),

    #[error("Ledger violation for project {project_id}: {message}")]
    LedgerViolation { project_id: String, message: String },

    // User errors
    #[error("Invalid request: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    Config(String),

    // Infra
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl AutonoError {
    /// Transient failures that a retry may resolve: timeouts, rate limits,
    /// and provider errors flagged retriable (5xx, connection resets).
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            AutonoError::Provider {
                retriable: true,
                ..
            } | AutonoError::RateLimited { .. }
                | AutonoError::Timeout { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retriable_classification() {
        assert!(AutonoError::RateLimited {
            provider: "groq".into(),
            retry_after_ms: 100,
        }
        .is_retriable());
        assert!(AutonoError::Timeout {
            provider: "ollama".into(),
            timeout_ms: 5000,
        }
        .is_retriable());
        assert!(AutonoError::Provider {
            provider: "groq".into(),
            message: "HTTP 503".into(),
            retriable: true,
        }
        .is_retriable());
        assert!(!AutonoError::Provider {
            provider: "groq".into(),
            message: "HTTP 401".into(),
            retriable: false,
        }
        .is_retriable());
        assert!(!AutonoError::Config("bad".into()).is_retriable());
    }

    #[test]
    fn test_display_run_rejected() {
        let e = AutonoError::RunRejected {
            project_id: "p-1".into(),
            status: "in_progress".into(),
        };
        assert_eq!(
            e.to_string(),
            "Project p-1 cannot start a run: status is in_progress"
        );
    }
}
