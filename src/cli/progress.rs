// src/cli/progress.rs — Terminal progress renderer for real-time run feedback

use crate::core::types::ProgressEvent;

/// Build a progress callback that writes formatted output to stderr.
///
/// All progress output goes to stderr so stdout remains clean for the final
/// text. Returns a closure suitable for `IterationController::with_progress()`.
pub fn terminal_progress() -> impl Fn(ProgressEvent) + Send + Sync + 'static {
    move |event| eprintln!("{}", format_event(&event))
}

pub fn format_event(event: &ProgressEvent) -> String {
    match event {
        ProgressEvent::RunStarted {
            project_id,
            max_iterations,
        } => format!(
            "[run] project {} (up to {} round(s))",
            project_id, max_iterations
        ),
        ProgressEvent::IterationStart {
            iteration,
            max_iterations,
        } => format!("[iter {}/{}] planning...", iteration, max_iterations),
        ProgressEvent::RoleFinished {
            iteration,
            role,
            tokens,
            elapsed,
            attempts,
            ok,
        } => {
            let status = if *ok { "ok" } else { "FAILED" };
            let retries = if *attempts > 1 {
                format!(" after {} attempts", attempts)
            } else {
                String::new()
            };
            format!(
                "[iter {}]   {:<10} {} ({} tokens, {:.1}s){}",
                iteration,
                role.as_str(),
                status,
                tokens,
                elapsed.as_secs_f64(),
                retries,
            )
        }
        ProgressEvent::ResearchGathered {
            iteration,
            queries,
            sources,
            aggregate_relevance,
        } => format!(
            "[iter {}]   research   {} quer{} -> {} source(s), relevance {:.2}",
            iteration,
            queries,
            if *queries == 1 { "y" } else { "ies" },
            sources,
            aggregate_relevance,
        ),
        ProgressEvent::Evaluated {
            iteration,
            score,
            approved,
        } => format!(
            "[iter {}] score={:.2} -> {}",
            iteration,
            score,
            if *approved { "approved" } else { "revise" },
        ),
        ProgressEvent::Finished {
            status,
            reason,
            iterations,
            total_tokens,
        } => match reason {
            Some(r) => format!(
                "[done] {} ({}) iterations={} tokens={}",
                status, r, iterations, total_tokens
            ),
            None => format!(
                "[done] {} iterations={} tokens={}",
                status, iterations, total_tokens
            ),
        },
    }
}
