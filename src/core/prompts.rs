// src/core/prompts.rs — Prompt construction for each agent role
//
// Wording is pluggable through `PromptStrategy`; the controller only decides
// which pieces of loop data each role sees.

use super::request::StructuredInput;
use crate::evaluator::rubric::Rubric;
use crate::research::ResearchBundle;

/// Section header the default writer prompt uses for the previous draft.
pub const PREVIOUS_DRAFT_HEADER: &str = "PREVIOUS DRAFT:";

/// Everything the writer sees in a round.
pub struct WriterContext<'a> {
    pub input: &'a StructuredInput,
    pub outline: &'a str,
    pub research: &'a ResearchBundle,
    /// Critic feedback from the previous round (i > 1).
    pub feedback: Option<&'a str>,
    /// Draft from the previous round (i > 1).
    pub previous_draft: Option<&'a str>,
}

pub trait PromptStrategy: Send + Sync {
    fn planner(&self, input: &StructuredInput, feedback: Option<&str>) -> String;
    /// Must ask for one search query per line.
    fn researcher(&self, input: &StructuredInput, outline: &str) -> String;
    fn writer(&self, ctx: &WriterContext<'_>) -> String;
    /// Must ask for `criterion: score/10` lines, `OVERALL:` and `RECOMMENDATIONS:`.
    fn critic(&self, input: &StructuredInput, draft: &str, rubric: &Rubric) -> String;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultPrompts;

impl PromptStrategy for DefaultPrompts {
    fn planner(&self, input: &StructuredInput, feedback: Option<&str>) -> String {
        let mut prompt = String::with_capacity(2048);
        prompt.push_str("You are the planner of an editorial team.\n\n");
        append_request_section(&mut prompt, input);
        if let Some(fb) = feedback {
            prompt.push_str("CRITIC FEEDBACK FROM THE LAST ROUND:\n");
            prompt.push_str(fb);
            prompt.push_str("\n\n");
        }
        prompt.push_str(
            "Produce a structured outline as markdown headings (## Section) with \
             bullet points under each. Address every objective and required section.",
        );
        if feedback.is_some() {
            prompt.push_str(" Revise the structure to resolve the feedback above.");
        }
        prompt.push('\n');
        prompt
    }

    fn researcher(&self, input: &StructuredInput, outline: &str) -> String {
        let mut prompt = String::with_capacity(2048);
        prompt.push_str("You are the researcher of an editorial team.\n\n");
        append_request_section(&mut prompt, input);
        prompt.push_str("OUTLINE:\n");
        prompt.push_str(outline);
        prompt.push_str("\n\n");
        prompt.push_str(
            "List the web search queries that would find supporting sources for \
             this outline. Write exactly one query per line, with no numbering \
             and no commentary.\n",
        );
        prompt
    }

    fn writer(&self, ctx: &WriterContext<'_>) -> String {
        let mut prompt = String::with_capacity(8192);
        prompt.push_str("You are the writer of an editorial team.\n\n");
        append_request_section(&mut prompt, ctx.input);
        prompt.push_str("OUTLINE:\n");
        prompt.push_str(ctx.outline);
        prompt.push_str("\n\n");

        if ctx.research.is_empty() {
            prompt.push_str("RESEARCH: no sources were found; rely on the request alone.\n\n");
        } else {
            prompt.push_str("RESEARCH:\n");
            prompt.push_str(&ctx.research.summary);
            prompt.push_str("\n\n");
        }

        if let Some(draft) = ctx.previous_draft {
            prompt.push_str(PREVIOUS_DRAFT_HEADER);
            prompt.push('\n');
            prompt.push_str(draft);
            prompt.push_str("\n\n");
        }
        if let Some(fb) = ctx.feedback {
            prompt.push_str("CRITIC FEEDBACK TO ADDRESS:\n");
            prompt.push_str(fb);
            prompt.push_str("\n\n");
        }

        let target = ctx
            .input
            .scope
            .word_count_target
            .map(|w| format!(" of about {w} words"))
            .unwrap_or_default();
        prompt.push_str(&format!(
            "Write the complete article{target} in markdown, in {}, with a {} tone.",
            ctx.input.style.language,
            ctx.input.style.tone.as_str()
        ));
        if ctx.input.sources.required_citations {
            prompt.push_str(" Cite sources for every factual claim.");
        }
        prompt.push('\n');
        prompt
    }

    fn critic(&self, input: &StructuredInput, draft: &str, rubric: &Rubric) -> String {
        let mut prompt = String::with_capacity(4096);
        prompt.push_str("You are the critic of an editorial team.\n\n");
        prompt.push_str(&format!("TOPIC: {}\n\n", input.topic()));
        prompt.push_str("DRAFT:\n");
        prompt.push_str(draft);
        prompt.push_str("\n\n");
        prompt.push_str("Score the draft from 0 to 10 on each criterion:\n");
        for c in rubric.criteria() {
            prompt.push_str(&format!("- {}\n", c.name));
        }
        prompt.push_str(
            "\nRespond in exactly this format:\n\
             <criterion>: <score>/10   (one line per criterion above)\n\
             OVERALL: <score>/10\n\
             RECOMMENDATIONS:\n\
             1. <concrete change>\n",
        );
        prompt
    }
}

// ─── Section builders ───────────────────────────────────────────────────────

fn append_request_section(prompt: &mut String, input: &StructuredInput) {
    prompt.push_str(&format!("TOPIC: {}\n", input.topic()));
    prompt.push_str(&format!("AUDIENCE: {}\n", input.audience));
    if let Some(bg) = &input.background_info {
        prompt.push_str(&format!("BACKGROUND: {bg}\n"));
    }
    append_list(prompt, "KEY CONCEPTS", &input.key_concepts);
    append_list(prompt, "OBJECTIVES", &input.objectives);
    append_list(prompt, "KEY QUESTIONS", &input.key_questions);
    append_list(prompt, "MUST INCLUDE", &input.scope.must_include);
    append_list(prompt, "MUST EXCLUDE", &input.scope.must_exclude);
    append_list(prompt, "REQUIRED SECTIONS", &input.style.required_sections);
    append_list(prompt, "PREFERRED SOURCES", &input.sources.preferred_sources);
    prompt.push_str(&format!("DEPTH: {}/5\n", input.scope.depth_level));
    if let Some(period) = &input.scope.time_period {
        prompt.push_str(&format!("TIME PERIOD: {period}\n"));
    }
    prompt.push('\n');
}

fn append_list(prompt: &mut String, label: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    prompt.push_str(label);
    prompt.push_str(":\n");
    for item in items {
        prompt.push_str("- ");
        prompt.push_str(item);
        prompt.push('\n');
    }
}
