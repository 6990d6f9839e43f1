// src/provider/simulation.rs — Deterministic offline provider
//
// Returns canned output per agent role so the whole loop can run without
// network access. The writer marks a draft as revised when its prompt carries
// a previous draft, and the critic scores revised drafts higher, so a
// simulated run converges in two rounds at the default threshold.

use async_trait::async_trait;
use std::time::{Duration, Instant};

use super::{estimate_tokens, Completion, ModelConfig, ModelProvider, TokenUsage};
use crate::core::prompts::PREVIOUS_DRAFT_HEADER;
use crate::core::types::AgentRole;
use crate::infra::errors::AutonoError;

const REVISION_MARKER: &str = "## Revision Notes";

#[derive(Debug, Clone, Default)]
pub struct SimulationProvider {
    /// Artificial latency per call. Zero unless a demo wants visible pacing.
    latency: Duration,
}

impl SimulationProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(latency: Duration) -> Self {
        Self { latency }
    }

    fn respond(role: AgentRole, prompt: &str) -> String {
        let topic = topic_line(prompt).unwrap_or("the requested subject");
        match role {
            AgentRole::Planner => planner_output(topic),
            AgentRole::Researcher => researcher_output(topic),
            AgentRole::Writer => writer_output(topic, prompt.contains(PREVIOUS_DRAFT_HEADER)),
            AgentRole::Critic => critic_output(prompt.contains(REVISION_MARKER)),
        }
    }
}

/// Pull the value of a `TOPIC:` line out of a prompt, if one is present.
fn topic_line(prompt: &str) -> Option<&str> {
    prompt
        .lines()
        .find_map(|l| l.trim().strip_prefix("TOPIC:"))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

fn planner_output(topic: &str) -> String {
    format!(
        "# Outline: {topic}\n\n\
         ## Introduction\n- Context and relevance\n- Goals of the piece\n\n\
         ## Background\n- Core concepts\n- State of the art\n\n\
         ## Analysis\n- Strengths and limitations\n- Practical use cases\n\n\
         ## Discussion\n- Open challenges\n- Future directions\n\n\
         ## Conclusion\n- Key takeaways\n"
    )
}

fn researcher_output(topic: &str) -> String {
    format!(
        "{topic} overview\n\
         {topic} recent developments\n\
         {topic} practical case studies\n\
         {topic} limitations and criticism\n"
    )
}

fn writer_output(topic: &str, revised: bool) -> String {
    let mut out = format!(
        "# {topic}\n\n\
         ## Introduction\n\n\
         This article examines {topic}, why it matters today, and what readers \
         should take away from it.\n\n\
         ## Background\n\n\
         The field rests on a small set of core concepts that have matured over \
         the last decade. Each is introduced with a short definition.\n\n\
         ## Analysis\n\n\
         Practical deployments show clear strengths alongside limitations in cost \
         and operational complexity.\n\n\
         ## Conclusion\n\n\
         {topic} offers real benefits when applied with care.\n"
    );
    if revised {
        out.push_str(&format!(
            "\n{REVISION_MARKER}\n\n\
             - Added citations for quantitative claims\n\
             - Expanded the analysis with a worked example\n"
        ));
    }
    out
}

fn critic_output(revised: bool) -> String {
    let (structure, depth, clarity, sourcing, coherence, overall) = if revised {
        (8.8, 8.4, 8.9, 8.2, 8.7, 8.6)
    } else {
        (8.5, 7.0, 8.5, 6.5, 8.0, 7.7)
    };
    format!(
        "Structure: {structure}/10\n\
         Depth: {depth}/10\n\
         Clarity: {clarity}/10\n\
         Sourcing: {sourcing}/10\n\
         Coherence: {coherence}/10\n\
         OVERALL: {overall}/10\n\n\
         RECOMMENDATIONS:\n\
         1. Add direct citations for the quantitative data mentioned\n\
         2. Include a practical implementation example in the analysis\n"
    )
}

#[async_trait]
impl ModelProvider for SimulationProvider {
    fn id(&self) -> &str {
        "simulation"
    }

    fn name(&self) -> &str {
        "Simulation"
    }

    async fn invoke(
        &self,
        role: AgentRole,
        prompt: &str,
        _model: &ModelConfig,
    ) -> Result<Completion, AutonoError> {
        let started = Instant::now();
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let text = Self::respond(role, prompt);
        let usage = TokenUsage {
            input_tokens: estimate_tokens(prompt),
            output_tokens: estimate_tokens(&text),
        };
        Ok(Completion {
            text,
            usage,
            elapsed: started.elapsed(),
        })
    }
}
