// src/store/sqlite.rs — SQLite project store

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::str::FromStr;
use std::sync::Mutex;
use std::time::Duration;

use super::{check_appendable, check_finish_args, lock, schema, ProjectStore};
use crate::core::ledger::{check_evaluation_append, check_execution_append, check_research_append};
use crate::core::request::StructuredInput;
use crate::core::state::ProjectStatus;
use crate::core::types::{
    AgentExecution, AgentRole, FailureReason, Project, QualityEvaluation, ResearchData,
};
use crate::infra::errors::AutonoError;

/// Durable store. One connection guarded by a mutex; every status change and
/// append runs inside its own transaction.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> Result<Self, AutonoError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        schema::run_migrations(&conn)?;
        tracing::debug!(path = %path.display(), "Opened project store");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory database (for testing).
    pub fn in_memory() -> Result<Self, AutonoError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        schema::run_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

fn parse_time(raw: &str) -> Result<DateTime<Utc>, AutonoError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| AutonoError::Other(anyhow::anyhow!("bad timestamp '{raw}': {e}")))
}

struct ProjectRow {
    id: String,
    title: String,
    status: String,
    failure_reason: Option<String>,
    final_content: Option<String>,
    created_at: String,
    updated_at: String,
}

impl ProjectRow {
    fn into_project(self) -> Result<Project, AutonoError> {
        Ok(Project {
            id: self.id,
            title: self.title,
            status: ProjectStatus::from_str(&self.status)?,
            failure_reason: self
                .failure_reason
                .as_deref()
                .map(FailureReason::from_str)
                .transpose()?,
            final_content: self.final_content,
            created_at: parse_time(&self.created_at)?,
            updated_at: parse_time(&self.updated_at)?,
        })
    }
}

const PROJECT_COLUMNS: &str =
    "id, title, status, failure_reason, final_content, created_at, updated_at";

fn project_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ProjectRow> {
    Ok(ProjectRow {
        id: row.get(0)?,
        title: row.get(1)?,
        status: row.get(2)?,
        failure_reason: row.get(3)?,
        final_content: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

fn find_project(conn: &Connection, project_id: &str) -> Result<Option<Project>, AutonoError> {
    let row = conn
        .query_row(
            &format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE id = ?1"),
            params![project_id],
            project_row,
        )
        .optional()?;
    row.map(ProjectRow::into_project).transpose()
}

fn require_project(conn: &Connection, project_id: &str) -> Result<Project, AutonoError> {
    find_project(conn, project_id)?
        .ok_or_else(|| AutonoError::ProjectNotFound(project_id.to_string()))
}

fn execution_pairs(
    conn: &Connection,
    project_id: &str,
) -> Result<Vec<(u32, AgentRole)>, AutonoError> {
    let mut stmt =
        conn.prepare("SELECT iteration, role FROM agent_executions WHERE project_id = ?1")?;
    let rows = stmt.query_map(params![project_id], |row| {
        Ok((row.get::<_, u32>(0)?, row.get::<_, String>(1)?))
    })?;

    let mut result = Vec::new();
    for row in rows {
        let (iteration, role) = row?;
        result.push((iteration, AgentRole::from_str(&role)?));
    }
    Ok(result)
}

impl ProjectStore for SqliteStore {
    fn create_project(&self, title: &str) -> Result<Project, AutonoError> {
        let project = Project::new(title);
        let conn = lock(&self.conn)?;
        conn.execute(
            "INSERT INTO projects (id, title, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                project.id,
                project.title,
                project.status.as_str(),
                project.created_at.to_rfc3339(),
                project.updated_at.to_rfc3339()
            ],
        )?;
        Ok(project)
    }

    fn get_project(&self, project_id: &str) -> Result<Project, AutonoError> {
        let conn = lock(&self.conn)?;
        require_project(&conn, project_id)
    }

    fn list_projects(&self) -> Result<Vec<Project>, AutonoError> {
        let conn = lock(&self.conn)?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {PROJECT_COLUMNS} FROM projects ORDER BY created_at, id"
        ))?;
        let rows = stmt.query_map([], project_row)?;

        let mut result = Vec::new();
        for row in rows {
            result.push(row?.into_project()?);
        }
        Ok(result)
    }

    fn save_structured_input(
        &self,
        project_id: &str,
        input: &StructuredInput,
    ) -> Result<(), AutonoError> {
        let body = serde_json::to_string(input)?;
        let mut conn = lock(&self.conn)?;
        let tx = conn.transaction()?;
        let project = require_project(&tx, project_id)?;
        if project.status != ProjectStatus::Draft {
            return Err(AutonoError::RunRejected {
                project_id: project_id.to_string(),
                status: project.status.to_string(),
            });
        }
        upsert_input(&tx, project_id, &body)?;
        tx.commit()?;
        Ok(())
    }

    fn load_structured_input(
        &self,
        project_id: &str,
    ) -> Result<Option<StructuredInput>, AutonoError> {
        let conn = lock(&self.conn)?;
        require_project(&conn, project_id)?;
        let body: Option<String> = conn
            .query_row(
                "SELECT body FROM structured_inputs WHERE project_id = ?1",
                params![project_id],
                |r| r.get(0),
            )
            .optional()?;
        Ok(body.map(|b| serde_json::from_str(&b)).transpose()?)
    }

    fn begin_run(
        &self,
        project_id: &str,
        input: &StructuredInput,
    ) -> Result<Project, AutonoError> {
        let body = serde_json::to_string(input)?;
        let mut conn = lock(&self.conn)?;
        let tx = conn.transaction()?;
        let changed = tx.execute(
            "UPDATE projects SET status = 'in_progress', updated_at = ?2
             WHERE id = ?1 AND status = 'draft'",
            params![project_id, Utc::now().to_rfc3339()],
        )?;
        if changed == 0 {
            let project = require_project(&tx, project_id)?;
            return Err(AutonoError::RunRejected {
                project_id: project_id.to_string(),
                status: project.status.to_string(),
            });
        }
        upsert_input(&tx, project_id, &body)?;
        let project = require_project(&tx, project_id)?;
        tx.commit()?;
        Ok(project)
    }

    fn finish_run(
        &self,
        project_id: &str,
        status: ProjectStatus,
        reason: Option<FailureReason>,
        final_content: Option<&str>,
    ) -> Result<Project, AutonoError> {
        check_finish_args(project_id, status, reason, final_content)?;
        let mut conn = lock(&self.conn)?;
        let tx = conn.transaction()?;
        let changed = tx.execute(
            "UPDATE projects SET status = ?2, failure_reason = ?3, final_content = ?4,
             updated_at = ?5 WHERE id = ?1 AND status = 'in_progress'",
            params![
                project_id,
                status.as_str(),
                reason.map(|r| r.as_str()),
                final_content,
                Utc::now().to_rfc3339()
            ],
        )?;
        if changed == 0 {
            let project = require_project(&tx, project_id)?;
            return Err(AutonoError::InvalidTransition {
                project_id: project_id.to_string(),
                from: project.status.to_string(),
                to: status.to_string(),
            });
        }
        let project = require_project(&tx, project_id)?;
        tx.commit()?;
        Ok(project)
    }

    fn append_execution(&self, exec: &AgentExecution) -> Result<(), AutonoError> {
        let mut conn = lock(&self.conn)?;
        let tx = conn.transaction()?;
        check_appendable(&require_project(&tx, &exec.project_id)?)?;
        let existing = execution_pairs(&tx, &exec.project_id)?;
        check_execution_append(
            &exec.project_id,
            existing.iter().copied(),
            exec.iteration,
            exec.role,
        )?;
        tx.execute(
            "INSERT INTO agent_executions (id, project_id, iteration, role, input_prompt, output,
             execution_time_ns, tokens_used, attempts, error, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                exec.id,
                exec.project_id,
                exec.iteration,
                exec.role.as_str(),
                exec.input_prompt,
                exec.output,
                i64::try_from(exec.execution_time.as_nanos()).unwrap_or(i64::MAX),
                exec.tokens_used,
                exec.attempts,
                exec.error,
                exec.created_at.to_rfc3339()
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn append_evaluation(&self, eval: &QualityEvaluation) -> Result<(), AutonoError> {
        let criteria = serde_json::to_string(&eval.criteria_breakdown)?;
        let mut conn = lock(&self.conn)?;
        let tx = conn.transaction()?;
        check_appendable(&require_project(&tx, &eval.project_id)?)?;
        let existing = execution_pairs(&tx, &eval.project_id)?;
        check_evaluation_append(&eval.project_id, existing.into_iter(), eval.iteration)?;
        let duplicate: bool = tx.query_row(
            "SELECT EXISTS(SELECT 1 FROM quality_evaluations
             WHERE project_id = ?1 AND iteration = ?2)",
            params![eval.project_id, eval.iteration],
            |r| r.get(0),
        )?;
        if duplicate {
            return Err(AutonoError::LedgerViolation {
                project_id: eval.project_id.clone(),
                message: format!("iteration {} already evaluated", eval.iteration),
            });
        }
        tx.execute(
            "INSERT INTO quality_evaluations (id, project_id, iteration, score, criteria,
             approved, feedback, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                eval.id,
                eval.project_id,
                eval.iteration,
                eval.score as f64,
                criteria,
                eval.approved,
                eval.feedback,
                eval.created_at.to_rfc3339()
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn append_research(&self, row: &ResearchData) -> Result<(), AutonoError> {
        let sources = serde_json::to_string(&row.sources)?;
        let mut conn = lock(&self.conn)?;
        let tx = conn.transaction()?;
        check_appendable(&require_project(&tx, &row.project_id)?)?;
        let current: u32 = tx.query_row(
            "SELECT COALESCE(MAX(iteration), 0) FROM agent_executions WHERE project_id = ?1",
            params![row.project_id],
            |r| r.get(0),
        )?;
        check_research_append(&row.project_id, current, row.iteration)?;
        tx.execute(
            "INSERT INTO research_data (id, project_id, iteration, query, sources,
             aggregate_relevance, content_summary, error, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                row.id,
                row.project_id,
                row.iteration,
                row.query,
                sources,
                row.aggregate_relevance as f64,
                row.content_summary,
                row.error,
                row.created_at.to_rfc3339()
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn executions(&self, project_id: &str) -> Result<Vec<AgentExecution>, AutonoError> {
        let conn = lock(&self.conn)?;
        require_project(&conn, project_id)?;
        let mut stmt = conn.prepare(
            "SELECT id, project_id, iteration, role, input_prompt, output, execution_time_ns,
             tokens_used, attempts, error, created_at
             FROM agent_executions WHERE project_id = ?1 ORDER BY seq",
        )?;
        let rows = stmt.query_map(params![project_id], |row| {
            Ok((
                (
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, u32>(2)?,
                    row.get::<_, String>(3)?,
                ),
                (
                    row.get::<_, String>(4)?,
                    row.get::<_, Option<String>>(5)?,
                    row.get::<_, i64>(6)?,
                    row.get::<_, u32>(7)?,
                    row.get::<_, u32>(8)?,
                    row.get::<_, Option<String>>(9)?,
                    row.get::<_, String>(10)?,
                ),
            ))
        })?;

        let mut result = Vec::new();
        for row in rows {
            let ((id, project_id, iteration, role), (prompt, output, ns, tokens, attempts, error, at)) =
                row?;
            result.push(AgentExecution {
                id,
                project_id,
                iteration,
                role: AgentRole::from_str(&role)?,
                input_prompt: prompt,
                output,
                execution_time: Duration::from_nanos(ns.max(0) as u64),
                tokens_used: tokens,
                attempts,
                error,
                created_at: parse_time(&at)?,
            });
        }
        Ok(result)
    }

    fn evaluations(&self, project_id: &str) -> Result<Vec<QualityEvaluation>, AutonoError> {
        let conn = lock(&self.conn)?;
        require_project(&conn, project_id)?;
        let mut stmt = conn.prepare(
            "SELECT id, project_id, iteration, score, criteria, approved, feedback, created_at
             FROM quality_evaluations WHERE project_id = ?1 ORDER BY seq",
        )?;
        let rows = stmt.query_map(params![project_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, u32>(2)?,
                row.get::<_, f64>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, bool>(5)?,
                row.get::<_, Option<String>>(6)?,
                row.get::<_, String>(7)?,
            ))
        })?;

        let mut result = Vec::new();
        for row in rows {
            let (id, project_id, iteration, score, criteria, approved, feedback, at) = row?;
            result.push(QualityEvaluation {
                id,
                project_id,
                iteration,
                score: score as f32,
                criteria_breakdown: serde_json::from_str(&criteria)?,
                approved,
                feedback,
                created_at: parse_time(&at)?,
            });
        }
        Ok(result)
    }

    fn research(&self, project_id: &str) -> Result<Vec<ResearchData>, AutonoError> {
        let conn = lock(&self.conn)?;
        require_project(&conn, project_id)?;
        let mut stmt = conn.prepare(
            "SELECT id, project_id, iteration, query, sources, aggregate_relevance,
             content_summary, error, created_at
             FROM research_data WHERE project_id = ?1 ORDER BY seq",
        )?;
        let rows = stmt.query_map(params![project_id], |row| {
            Ok((
                (
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, u32>(2)?,
                    row.get::<_, String>(3)?,
                ),
                (
                    row.get::<_, String>(4)?,
                    row.get::<_, f64>(5)?,
                    row.get::<_, String>(6)?,
                    row.get::<_, Option<String>>(7)?,
                    row.get::<_, String>(8)?,
                ),
            ))
        })?;

        let mut result = Vec::new();
        for row in rows {
            let ((id, project_id, iteration, query), (sources, relevance, summary, error, at)) =
                row?;
            result.push(ResearchData {
                id,
                project_id,
                iteration,
                query,
                sources: serde_json::from_str(&sources)?,
                aggregate_relevance: relevance as f32,
                content_summary: summary,
                error,
                created_at: parse_time(&at)?,
            });
        }
        Ok(result)
    }
}

fn upsert_input(conn: &Connection, project_id: &str, body: &str) -> Result<(), AutonoError> {
    conn.execute(
        "INSERT INTO structured_inputs (project_id, body, updated_at) VALUES (?1, ?2, ?3)
         ON CONFLICT(project_id) DO UPDATE SET body = excluded.body,
         updated_at = excluded.updated_at",
        params![project_id, body, Utc::now().to_rfc3339()],
    )?;
    Ok(())
}
