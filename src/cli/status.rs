// src/cli/status.rs — Project status and listing

use std::fmt::Write as _;

use crate::core::ledger::Ledger;
use crate::core::types::Project;
use crate::evaluator::utils::truncate_chars;
use crate::store::ProjectStore;

/// Display one project and its ledger.
pub fn show_status(store: &dyn ProjectStore, project_id: &str, verbose: bool) -> anyhow::Result<()> {
    let ledger = store.ledger(project_id)?;
    print!("{}", render_status(&ledger, verbose));
    Ok(())
}

/// Display all projects.
pub fn list_projects(store: &dyn ProjectStore) -> anyhow::Result<()> {
    let projects = store.list_projects()?;
    if projects.is_empty() {
        println!("No projects yet. Start one with `autonowrite run <request.json>`.");
        return Ok(());
    }
    print!("{}", render_list(&projects));
    Ok(())
}

pub fn render_status(ledger: &Ledger, verbose: bool) -> String {
    let p = &ledger.project;
    let mut out = String::new();
    let _ = writeln!(out, "Project {}", p.id);
    let _ = writeln!(out, "  Title:      {}", p.title);
    match p.failure_reason {
        Some(reason) => {
            let _ = writeln!(out, "  Status:     {} ({})", p.status, reason);
        }
        None => {
            let _ = writeln!(out, "  Status:     {}", p.status);
        }
    }
    let _ = writeln!(out, "  Created:    {}", p.created_at.to_rfc3339());
    let _ = writeln!(out, "  Updated:    {}", p.updated_at.to_rfc3339());
    let _ = writeln!(
        out,
        "  Usage:      {} call(s), {} tokens",
        ledger.executions.len(),
        ledger.total_tokens()
    );

    for iteration in 1..=ledger.iterations() {
        let _ = writeln!(out);
        let _ = writeln!(out, "  Iteration {}", iteration);
        for exec in ledger.executions_for(iteration) {
            let state = match exec.error {
                Some(ref e) => format!("FAILED: {}", truncate_chars(e, 80)),
                None => "ok".to_string(),
            };
            let _ = writeln!(
                out,
                "    {:<10} {:>6} tokens {:>7} ms  x{}  {}",
                exec.role.as_str(),
                exec.tokens_used,
                exec.execution_time.as_millis(),
                exec.attempts,
                state
            );
            if verbose {
                if let Some(ref output) = exec.output {
                    let _ = writeln!(out, "      > {}", truncate_chars(output.trim(), 200));
                }
            }
        }
        let sources: usize = ledger
            .research
            .iter()
            .filter(|r| r.iteration == iteration)
            .map(|r| r.sources.len())
            .sum();
        let queries = ledger
            .research
            .iter()
            .filter(|r| r.iteration == iteration)
            .count();
        let _ = writeln!(out, "    research   {} query(ies), {} source(s)", queries, sources);
        if let Some(eval) = ledger.evaluation_for(iteration) {
            let _ = writeln!(
                out,
                "    score      {:.2} ({})",
                eval.score,
                if eval.approved { "approved" } else { "rejected" }
            );
            if verbose {
                for c in &eval.criteria_breakdown {
                    let _ = writeln!(out, "      {:<12} {:.1}", c.criterion, c.score);
                }
            }
        }
    }

    if verbose {
        if let Some(ref content) = p.final_content {
            let _ = writeln!(out);
            let _ = writeln!(out, "Final content:");
            let _ = writeln!(out, "{}", content);
        }
    }
    out
}

pub fn render_list(projects: &[Project]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{:<36}  {:<12}  {:<20}  TITLE", "ID", "STATUS", "CREATED");
    for p in projects {
        let _ = writeln!(
            out,
            "{:<36}  {:<12}  {:<20}  {}",
            p.id,
            p.status.as_str(),
            p.created_at.format("%Y-%m-%d %H:%M:%S"),
            truncate_chars(&p.title, 60)
        );
    }
    out
}
