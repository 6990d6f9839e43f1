// src/core/state.rs — Project lifecycle state machine
//
// draft -> in_progress -> {completed, failed}. Terminal states never change.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::types::FailureReason;
use crate::infra::errors::AutonoError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    Draft,
    InProgress,
    Completed,
    Failed,
}

impl ProjectStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectStatus::Draft => "draft",
            ProjectStatus::InProgress => "in_progress",
            ProjectStatus::Completed => "completed",
            ProjectStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ProjectStatus::Completed | ProjectStatus::Failed)
    }

    pub fn can_transition_to(&self, next: ProjectStatus) -> bool {
        matches!(
            (self, next),
            (ProjectStatus::Draft, ProjectStatus::InProgress)
                | (ProjectStatus::InProgress, ProjectStatus::Completed)
                | (ProjectStatus::InProgress, ProjectStatus::Failed)
        )
    }
}

impl std::fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProjectStatus {
    type Err = AutonoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(ProjectStatus::Draft),
            "in_progress" => Ok(ProjectStatus::InProgress),
            "completed" => Ok(ProjectStatus::Completed),
            "failed" => Ok(ProjectStatus::Failed),
            other => Err(AutonoError::InvalidInput(format!(
                "unknown project status '{other}'"
            ))),
        }
    }
}

/// In-memory view of one project's lifecycle during a run.
///
/// The controller owns one of these per run and mirrors each transition to
/// the store; the store's compare-and-set is what makes the transition stick.
#[derive(Debug, Clone)]
pub struct ProjectStateMachine {
    project_id: String,
    status: ProjectStatus,
    reason: Option<FailureReason>,
}

impl ProjectStateMachine {
    pub fn new(project_id: impl Into<String>, status: ProjectStatus) -> Self {
        Self {
            project_id: project_id.into(),
            status,
            reason: None,
        }
    }

    pub fn current_status(&self) -> ProjectStatus {
        self.status
    }

    pub fn failure_reason(&self) -> Option<FailureReason> {
        self.reason
    }

    pub fn start(&mut self) -> Result<(), AutonoError> {
        self.transition(ProjectStatus::InProgress)
    }

    pub fn complete(&mut self) -> Result<(), AutonoError> {
        self.transition(ProjectStatus::Completed)
    }

    pub fn fail(&mut self, reason: FailureReason) -> Result<(), AutonoError> {
        self.transition(ProjectStatus::Failed)?;
        self.reason = Some(reason);
        Ok(())
    }

    fn transition(&mut self, next: ProjectStatus) -> Result<(), AutonoError> {
        if !self.status.can_transition_to(next) {
            return Err(AutonoError::InvalidTransition {
                project_id: self.project_id.clone(),
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        tracing::debug!(
            project_id = %self.project_id,
            from = %self.status,
            to = %next,
            "Project status transition"
        );
        self.status = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [ProjectStatus; 4] = [
        ProjectStatus::Draft,
        ProjectStatus::InProgress,
        ProjectStatus::Completed,
        ProjectStatus::Failed,
    ];

    #[test]
    fn test_status_string_roundtrip() {
        for s in ALL {
            assert_eq!(s.as_str().parse::<ProjectStatus>().unwrap(), s);
        }
        assert!("archived".parse::<ProjectStatus>().is_err());
    }

    #[test]
    fn test_only_three_legal_transitions() {
        let mut legal = 0;
        for from in ALL {
            for to in ALL {
                if from.can_transition_to(to) {
                    legal += 1;
                }
            }
        }
        assert_eq!(legal, 3);
    }

    #[test]
    fn test_terminal_states_never_transition() {
        for from in [ProjectStatus::Completed, ProjectStatus::Failed] {
            assert!(from.is_terminal());
            for to in ALL {
                assert!(!from.can_transition_to(to));
            }
        }
    }

    #[test]
    fn test_happy_path() {
        let mut sm = ProjectStateMachine::new("p1", ProjectStatus::Draft);
        sm.start().unwrap();
        assert_eq!(sm.current_status(), ProjectStatus::InProgress);
        sm.complete().unwrap();
        assert_eq!(sm.current_status(), ProjectStatus::Completed);
        assert!(sm.failure_reason().is_none());
    }

    #[test]
    fn test_fail_records_reason() {
        let mut sm = ProjectStateMachine::new("p1", ProjectStatus::Draft);
        sm.start().unwrap();
        sm.fail(FailureReason::BudgetExceeded).unwrap();
        assert_eq!(sm.current_status(), ProjectStatus::Failed);
        assert_eq!(sm.failure_reason(), Some(FailureReason::BudgetExceeded));
    }

    #[test]
    fn test_illegal_transitions_rejected() {
        let mut sm = ProjectStateMachine::new("p1", ProjectStatus::Draft);
        assert!(matches!(
            sm.complete(),
            Err(AutonoError::InvalidTransition { .. })
        ));
        sm.start().unwrap();
        assert!(sm.start().is_err());
        sm.complete().unwrap();
        assert!(sm.fail(FailureReason::Cancelled).is_err());
        assert_eq!(sm.current_status(), ProjectStatus::Completed);
    }
}
