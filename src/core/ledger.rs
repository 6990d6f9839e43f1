// src/core/ledger.rs — Audit ledger invariants
//
// The append checks here are shared by every store backend so that the
// arena log and SQLite reject exactly the same writes.

use serde::Serialize;
use std::collections::BTreeSet;

use super::types::{AgentExecution, AgentRole, Project, QualityEvaluation, ResearchData};
use crate::infra::errors::AutonoError;

/// A project together with everything recorded for it, in append order.
#[derive(Debug, Clone, Serialize)]
pub struct Ledger {
    pub project: Project,
    pub executions: Vec<AgentExecution>,
    pub evaluations: Vec<QualityEvaluation>,
    pub research: Vec<ResearchData>,
}

impl Ledger {
    /// Highest iteration number recorded, 0 when nothing ran.
    pub fn iterations(&self) -> u32 {
        max_iteration(&self.executions)
    }

    pub fn executions_for(&self, iteration: u32) -> impl Iterator<Item = &AgentExecution> {
        self.executions
            .iter()
            .filter(move |e| e.iteration == iteration)
    }

    pub fn evaluation_for(&self, iteration: u32) -> Option<&QualityEvaluation> {
        self.evaluations.iter().find(|e| e.iteration == iteration)
    }

    pub fn total_tokens(&self) -> u64 {
        self.executions.iter().map(|e| e.tokens_used as u64).sum()
    }

    /// Re-check every invariant over the loaded records.
    pub fn verify(&self) -> Result<(), AutonoError> {
        let pid = &self.project.id;

        let mut seen: Vec<(u32, AgentRole)> = Vec::with_capacity(self.executions.len());
        for exec in &self.executions {
            check_execution_append(pid, seen.iter().copied(), exec.iteration, exec.role)?;
            seen.push((exec.iteration, exec.role));
        }

        let mut evaluated = BTreeSet::new();
        for eval in &self.evaluations {
            check_evaluation_append(pid, seen.iter().copied(), eval.iteration)?;
            if !evaluated.insert(eval.iteration) {
                return Err(violation(
                    pid,
                    format!("duplicate evaluation for iteration {}", eval.iteration),
                ));
            }
        }

        let current = self.iterations();
        for row in &self.research {
            if row.iteration == 0 || row.iteration > current {
                return Err(violation(
                    pid,
                    format!("research for unknown iteration {}", row.iteration),
                ));
            }
        }
        Ok(())
    }
}

fn violation(project_id: &str, message: String) -> AutonoError {
    AutonoError::LedgerViolation {
        project_id: project_id.to_string(),
        message,
    }
}

pub fn max_iteration(executions: &[AgentExecution]) -> u32 {
    executions.iter().map(|e| e.iteration).max().unwrap_or(0)
}

/// An execution for `iteration` may only continue the current round or
/// open the next one, and each role runs at most once per round.
///
/// `existing` yields the (iteration, role) pairs already recorded.
pub fn check_execution_append(
    project_id: &str,
    existing: impl Iterator<Item = (u32, AgentRole)> + Clone,
    iteration: u32,
    role: AgentRole,
) -> Result<(), AutonoError> {
    let current = existing.clone().map(|(i, _)| i).max().unwrap_or(0);
    if iteration == 0 || (iteration != current && iteration != current + 1) {
        return Err(violation(
            project_id,
            format!("iteration {iteration} is not contiguous with current iteration {current}"),
        ));
    }
    if existing
        .into_iter()
        .any(|(i, r)| i == iteration && r == role)
    {
        return Err(violation(
            project_id,
            format!("{role} already recorded for iteration {iteration}"),
        ));
    }
    Ok(())
}

/// An evaluation needs all four roles recorded for its iteration.
pub fn check_evaluation_append(
    project_id: &str,
    executions: impl Iterator<Item = (u32, AgentRole)>,
    iteration: u32,
) -> Result<(), AutonoError> {
    let roles: BTreeSet<AgentRole> = executions
        .filter(|(i, _)| *i == iteration)
        .map(|(_, r)| r)
        .collect();
    if roles.len() != AgentRole::ALL.len() {
        let missing: Vec<&str> = AgentRole::ALL
            .iter()
            .filter(|r| !roles.contains(*r))
            .map(|r| r.as_str())
            .collect();
        return Err(violation(
            project_id,
            format!(
                "evaluation for iteration {iteration} without {}",
                missing.join(", ")
            ),
        ));
    }
    Ok(())
}

/// Research rows belong to the round currently being recorded.
pub fn check_research_append(
    project_id: &str,
    current_iteration: u32,
    iteration: u32,
) -> Result<(), AutonoError> {
    if iteration == 0 || iteration != current_iteration {
        return Err(violation(
            project_id,
            format!("research for iteration {iteration} while current iteration is {current_iteration}"),
        ));
    }
    Ok(())
}
