// src/store/arena.rs — In-process project store
//
// One append-only log per project behind a single mutex. Used by tests and
// by runs that do not need to outlive the process.

use chrono::Utc;
use std::collections::HashMap;
use std::sync::Mutex;

use super::{check_appendable, check_finish_args, lock, ProjectStore};
use crate::core::ledger::{
    check_evaluation_append, check_execution_append, check_research_append, max_iteration,
};
use crate::core::request::StructuredInput;
use crate::core::state::ProjectStatus;
use crate::core::types::{AgentExecution, FailureReason, Project, QualityEvaluation, ResearchData};
use crate::infra::errors::AutonoError;

#[derive(Debug)]
struct ProjectLog {
    project: Project,
    input: Option<StructuredInput>,
    executions: Vec<AgentExecution>,
    evaluations: Vec<QualityEvaluation>,
    research: Vec<ResearchData>,
}

#[derive(Debug, Default)]
pub struct ArenaStore {
    logs: Mutex<HashMap<String, ProjectLog>>,
}

impl ArenaStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn get_log<'a>(
    logs: &'a mut HashMap<String, ProjectLog>,
    project_id: &str,
) -> Result<&'a mut ProjectLog, AutonoError> {
    logs.get_mut(project_id)
        .ok_or_else(|| AutonoError::ProjectNotFound(project_id.to_string()))
}

impl ProjectStore for ArenaStore {
    fn create_project(&self, title: &str) -> Result<Project, AutonoError> {
        let project = Project::new(title);
        lock(&self.logs)?.insert(
            project.id.clone(),
            ProjectLog {
                project: project.clone(),
                input: None,
                executions: Vec::new(),
                evaluations: Vec::new(),
                research: Vec::new(),
            },
        );
        Ok(project)
    }

    fn get_project(&self, project_id: &str) -> Result<Project, AutonoError> {
        let mut logs = lock(&self.logs)?;
        Ok(get_log(&mut logs, project_id)?.project.clone())
    }

    fn list_projects(&self) -> Result<Vec<Project>, AutonoError> {
        let logs = lock(&self.logs)?;
        let mut projects: Vec<Project> = logs.values().map(|l| l.project.clone()).collect();
        projects.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(projects)
    }

    fn save_structured_input(
        &self,
        project_id: &str,
        input: &StructuredInput,
    ) -> Result<(), AutonoError> {
        let mut logs = lock(&self.logs)?;
        let log = get_log(&mut logs, project_id)?;
        if log.project.status != ProjectStatus::Draft {
            return Err(AutonoError::RunRejected {
                project_id: project_id.to_string(),
                status: log.project.status.to_string(),
            });
        }
        log.input = Some(input.clone());
        Ok(())
    }

    fn load_structured_input(
        &self,
        project_id: &str,
    ) -> Result<Option<StructuredInput>, AutonoError> {
        let mut logs = lock(&self.logs)?;
        Ok(get_log(&mut logs, project_id)?.input.clone())
    }

    fn begin_run(
        &self,
        project_id: &str,
        input: &StructuredInput,
    ) -> Result<Project, AutonoError> {
        let mut logs = lock(&self.logs)?;
        let log = get_log(&mut logs, project_id)?;
        if log.project.status != ProjectStatus::Draft {
            return Err(AutonoError::RunRejected {
                project_id: project_id.to_string(),
                status: log.project.status.to_string(),
            });
        }
        log.input = Some(input.clone());
        log.project.status = ProjectStatus::InProgress;
        log.project.updated_at = Utc::now();
        Ok(log.project.clone())
    }

    fn finish_run(
        &self,
        project_id: &str,
        status: ProjectStatus,
        reason: Option<FailureReason>,
        final_content: Option<&str>,
    ) -> Result<Project, AutonoError> {
        check_finish_args(project_id, status, reason, final_content)?;
        let mut logs = lock(&self.logs)?;
        let log = get_log(&mut logs, project_id)?;
        if !log.project.status.can_transition_to(status) {
            return Err(AutonoError::InvalidTransition {
                project_id: project_id.to_string(),
                from: log.project.status.to_string(),
                to: status.to_string(),
            });
        }
        log.project.status = status;
        log.project.failure_reason = reason;
        log.project.final_content = final_content.map(str::to_string);
        log.project.updated_at = Utc::now();
        Ok(log.project.clone())
    }

    fn append_execution(&self, exec: &AgentExecution) -> Result<(), AutonoError> {
        let mut logs = lock(&self.logs)?;
        let log = get_log(&mut logs, &exec.project_id)?;
        check_appendable(&log.project)?;
        check_execution_append(
            &exec.project_id,
            log.executions.iter().map(|e| (e.iteration, e.role)),
            exec.iteration,
            exec.role,
        )?;
        log.executions.push(exec.clone());
        Ok(())
    }

    fn append_evaluation(&self, eval: &QualityEvaluation) -> Result<(), AutonoError> {
        let mut logs = lock(&self.logs)?;
        let log = get_log(&mut logs, &eval.project_id)?;
        check_appendable(&log.project)?;
        check_evaluation_append(
            &eval.project_id,
            log.executions.iter().map(|e| (e.iteration, e.role)),
            eval.iteration,
        )?;
        if log.evaluations.iter().any(|e| e.iteration == eval.iteration) {
            return Err(AutonoError::LedgerViolation {
                project_id: eval.project_id.clone(),
                message: format!("iteration {} already evaluated", eval.iteration),
            });
        }
        log.evaluations.push(eval.clone());
        Ok(())
    }

    fn append_research(&self, row: &ResearchData) -> Result<(), AutonoError> {
        let mut logs = lock(&self.logs)?;
        let log = get_log(&mut logs, &row.project_id)?;
        check_appendable(&log.project)?;
        check_research_append(&row.project_id, max_iteration(&log.executions), row.iteration)?;
        log.research.push(row.clone());
        Ok(())
    }

    fn executions(&self, project_id: &str) -> Result<Vec<AgentExecution>, AutonoError> {
        let mut logs = lock(&self.logs)?;
        Ok(get_log(&mut logs, project_id)?.executions.clone())
    }

    fn evaluations(&self, project_id: &str) -> Result<Vec<QualityEvaluation>, AutonoError> {
        let mut logs = lock(&self.logs)?;
        Ok(get_log(&mut logs, project_id)?.evaluations.clone())
    }

    fn research(&self, project_id: &str) -> Result<Vec<ResearchData>, AutonoError> {
        let mut logs = lock(&self.logs)?;
        Ok(get_log(&mut logs, project_id)?.research.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::AgentRole;
    use std::time::Duration;

    fn exec(project_id: &str, iteration: u32, role: AgentRole) -> AgentExecution {
        AgentExecution {
            id: uuid::Uuid::new_v4().to_string(),
            project_id: project_id.into(),
            iteration,
            role,
            input_prompt: "p".into(),
            output: Some("o".into()),
            execution_time: Duration::from_millis(5),
            tokens_used: 3,
            attempts: 1,
            error: None,
            created_at: Utc::now(),
        }
    }

    fn started(store: &ArenaStore) -> Project {
        let p = store.create_project("t").unwrap();
        store
            .begin_run(&p.id, &StructuredInput::new("d", "o"))
            .unwrap()
    }

    #[test]
    fn test_begin_run_only_from_draft() {
        let store = ArenaStore::new();
        let p = started(&store);
        assert_eq!(p.status, ProjectStatus::InProgress);
        let again = store.begin_run(&p.id, &StructuredInput::new("d", "o"));
        assert!(matches!(again, Err(AutonoError::RunRejected { .. })));
    }

    #[test]
    fn test_unknown_project() {
        let store = ArenaStore::new();
        assert!(matches!(
            store.get_project("nope"),
            Err(AutonoError::ProjectNotFound(_))
        ));
    }

    #[test]
    fn test_append_requires_in_progress() {
        let store = ArenaStore::new();
        let p = store.create_project("t").unwrap();
        let err = store.append_execution(&exec(&p.id, 1, AgentRole::Planner));
        assert!(matches!(err, Err(AutonoError::LedgerViolation { .. })));
    }

    #[test]
    fn test_finish_run_checks_shape() {
        let store = ArenaStore::new();
        let p = started(&store);
        assert!(store
            .finish_run(&p.id, ProjectStatus::Completed, None, None)
            .is_err());
        assert!(store
            .finish_run(&p.id, ProjectStatus::Failed, None, None)
            .is_err());
        let done = store
            .finish_run(&p.id, ProjectStatus::Failed, Some(FailureReason::Cancelled), None)
            .unwrap();
        assert_eq!(done.failure_reason, Some(FailureReason::Cancelled));
        assert!(store
            .finish_run(&p.id, ProjectStatus::Completed, None, Some("x"))
            .is_err());
    }

    #[test]
    fn test_save_input_frozen_after_start() {
        let store = ArenaStore::new();
        let p = store.create_project("t").unwrap();
        store
            .save_structured_input(&p.id, &StructuredInput::new("a", "b"))
            .unwrap();
        store
            .begin_run(&p.id, &StructuredInput::new("c", "d"))
            .unwrap();
        assert!(store
            .save_structured_input(&p.id, &StructuredInput::new("e", "f"))
            .is_err());
        let input = store.load_structured_input(&p.id).unwrap().unwrap();
        assert_eq!(input.domain, "c");
    }

    #[test]
    fn test_ledger_roundtrip_and_verify() {
        let store = ArenaStore::new();
        let p = started(&store);
        for role in AgentRole::ALL {
            store.append_execution(&exec(&p.id, 1, role)).unwrap();
        }
        assert!(store
            .append_execution(&exec(&p.id, 1, AgentRole::Writer))
            .is_err());
        assert!(store
            .append_execution(&exec(&p.id, 3, AgentRole::Planner))
            .is_err());
        let ledger = store.ledger(&p.id).unwrap();
        assert_eq!(ledger.executions.len(), 4);
        assert!(ledger.verify().is_ok());
    }
}
