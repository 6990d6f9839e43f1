// src/store/mod.rs — Project persistence
//
// Ledger tables (executions, evaluations, research) are append-only in every
// backend. Status changes go through compare-and-set so two runs can never
// both start the same project.

pub mod arena;
pub mod schema;
pub mod sqlite;

use std::sync::{Mutex, MutexGuard};

use crate::core::ledger::Ledger;
use crate::core::request::StructuredInput;
use crate::core::state::ProjectStatus;
use crate::core::types::{AgentExecution, FailureReason, Project, QualityEvaluation, ResearchData};
use crate::infra::errors::AutonoError;

pub use arena::ArenaStore;
pub use sqlite::SqliteStore;

/// Storage consumed by the iteration controller and the CLI.
///
/// Implementations are shared across concurrently running projects, so every
/// method takes `&self` and synchronizes internally.
pub trait ProjectStore: Send + Sync {
    fn create_project(&self, title: &str) -> Result<Project, AutonoError>;

    fn get_project(&self, project_id: &str) -> Result<Project, AutonoError>;

    /// All projects, oldest first.
    fn list_projects(&self) -> Result<Vec<Project>, AutonoError>;

    /// Attach a request to a draft project. Rejected once the run started.
    fn save_structured_input(
        &self,
        project_id: &str,
        input: &StructuredInput,
    ) -> Result<(), AutonoError>;

    fn load_structured_input(&self, project_id: &str)
        -> Result<Option<StructuredInput>, AutonoError>;

    /// Atomically move `draft -> in_progress` and freeze `input` as the
    /// project's request. Any other current status yields `RunRejected`.
    fn begin_run(&self, project_id: &str, input: &StructuredInput)
        -> Result<Project, AutonoError>;

    /// Atomically move `in_progress -> completed | failed`.
    fn finish_run(
        &self,
        project_id: &str,
        status: ProjectStatus,
        reason: Option<FailureReason>,
        final_content: Option<&str>,
    ) -> Result<Project, AutonoError>;

    fn append_execution(&self, exec: &AgentExecution) -> Result<(), AutonoError>;

    fn append_evaluation(&self, eval: &QualityEvaluation) -> Result<(), AutonoError>;

    fn append_research(&self, row: &ResearchData) -> Result<(), AutonoError>;

    fn executions(&self, project_id: &str) -> Result<Vec<AgentExecution>, AutonoError>;

    fn evaluations(&self, project_id: &str) -> Result<Vec<QualityEvaluation>, AutonoError>;

    fn research(&self, project_id: &str) -> Result<Vec<ResearchData>, AutonoError>;

    fn ledger(&self, project_id: &str) -> Result<Ledger, AutonoError> {
        Ok(Ledger {
            project: self.get_project(project_id)?,
            executions: self.executions(project_id)?,
            evaluations: self.evaluations(project_id)?,
            research: self.research(project_id)?,
        })
    }
}

/// Shape checks for `finish_run` that do not depend on stored state.
pub(crate) fn check_finish_args(
    project_id: &str,
    status: ProjectStatus,
    reason: Option<FailureReason>,
    final_content: Option<&str>,
) -> Result<(), AutonoError> {
    let ok = match status {
        ProjectStatus::Completed => reason.is_none() && final_content.is_some(),
        ProjectStatus::Failed => reason.is_some() && final_content.is_none(),
        _ => false,
    };
    if !ok {
        return Err(AutonoError::InvalidTransition {
            project_id: project_id.to_string(),
            from: ProjectStatus::InProgress.to_string(),
            to: status.to_string(),
        });
    }
    Ok(())
}

/// Appends are only accepted while the project is running.
pub(crate) fn check_appendable(project: &Project) -> Result<(), AutonoError> {
    if project.status != ProjectStatus::InProgress {
        return Err(AutonoError::LedgerViolation {
            project_id: project.id.clone(),
            message: format!("cannot append while project is {}", project.status),
        });
    }
    Ok(())
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, AutonoError> {
    mutex
        .lock()
        .map_err(|_| AutonoError::Other(anyhow::anyhow!("store lock poisoned")))
}
