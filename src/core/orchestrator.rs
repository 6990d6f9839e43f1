// src/core/orchestrator.rs — Iteration controller

use chrono::Utc;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::budget::BudgetTracker;
use super::prompts::{DefaultPrompts, PromptStrategy, WriterContext};
use super::request::StructuredInput;
use super::state::{ProjectStateMachine, ProjectStatus};
use super::types::*;
use crate::evaluator::QualityEvaluator;
use crate::infra::errors::AutonoError;
use crate::provider::retry::{invoke_with_retry, RetryPolicy};
use crate::provider::ModelProvider;
use crate::research::queries::{fallback_queries, parse_query_lines};
use crate::research::{ResearchAggregator, ResearchBundle};
use crate::store::ProjectStore;

pub type ProgressCallback = Box<dyn Fn(ProgressEvent) + Send + Sync>;

/// Drives the planner -> researcher -> writer -> critic loop for a project
/// until the draft is approved or a stop condition is hit.
///
/// One controller can run many projects concurrently; all per-run state
/// lives on the stack of `run_project`.
pub struct IterationController {
    provider: Arc<dyn ModelProvider>,
    research: Arc<ResearchAggregator>,
    store: Arc<dyn ProjectStore>,
    prompts: Arc<dyn PromptStrategy>,
    cancel: CancellationToken,
    /// Optional callback for real-time progress events.
    on_progress: Option<ProgressCallback>,
}

/// Result of one agent call after retries and the budget gate.
enum Call {
    Done(String),
    /// Refused before sending: the prompt would overrun the budget.
    Refused,
    Failed,
}

enum RoundOutcome {
    Approved { draft: String, score: f32 },
    Rejected { draft: String, feedback: Option<String> },
    Failed(FailureReason),
}

/// Loop data carried from a rejected round into the next one.
struct Carry {
    draft: String,
    feedback: Option<String>,
}

/// Per-run mutable state.
struct Run<'a> {
    project_id: &'a str,
    config: &'a RunConfig,
    policy: RetryPolicy,
    budget: BudgetTracker,
}

impl IterationController {
    pub fn new(
        provider: Arc<dyn ModelProvider>,
        research: Arc<ResearchAggregator>,
        store: Arc<dyn ProjectStore>,
    ) -> Self {
        Self {
            provider,
            research,
            store,
            prompts: Arc::new(DefaultPrompts),
            cancel: CancellationToken::new(),
            on_progress: None,
        }
    }

    pub fn with_prompts(mut self, prompts: Arc<dyn PromptStrategy>) -> Self {
        self.prompts = prompts;
        self
    }

    /// Runs stop at the next round boundary once `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Set a callback for real-time progress events.
    pub fn with_progress(mut self, cb: impl Fn(ProgressEvent) + Send + Sync + 'static) -> Self {
        self.on_progress = Some(Box::new(cb));
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn store(&self) -> &Arc<dyn ProjectStore> {
        &self.store
    }

    /// Fire a progress event if a callback is set.
    fn emit(&self, event: ProgressEvent) {
        if let Some(ref cb) = self.on_progress {
            cb(event);
        }
    }

    /// Run `project` from draft to a terminal status.
    ///
    /// Configuration and request errors are returned before the project is
    /// touched. Once the run has started, every stop condition ends in a
    /// persisted terminal status. A store failure mid-run is returned as
    /// `Err` after the project is marked `failed (storage_error)` where the
    /// store still accepts that write.
    pub async fn run_project(
        &self,
        project: &Project,
        input: &StructuredInput,
        config: &RunConfig,
    ) -> Result<TerminalOutcome, AutonoError> {
        config.validate()?;
        input.validate()?;

        let started = self.store.begin_run(&project.id, input)?;
        match self.drive(&started, input, config).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                self.abandon(&project.id, &e);
                Err(e)
            }
        }
    }

    /// Best-effort terminal write after a mid-run failure.
    fn abandon(&self, project_id: &str, cause: &AutonoError) {
        tracing::error!(project_id, "Run aborted: {}", cause);
        if let Err(e) = self.store.finish_run(
            project_id,
            ProjectStatus::Failed,
            Some(FailureReason::StorageError),
            None,
        ) {
            tracing::warn!(project_id, "Could not mark run failed: {}", e);
        }
    }

    async fn drive(
        &self,
        project: &Project,
        input: &StructuredInput,
        config: &RunConfig,
    ) -> Result<TerminalOutcome, AutonoError> {
        let mut machine = ProjectStateMachine::new(&project.id, ProjectStatus::Draft);
        machine.start()?;

        tracing::info!(
            project_id = %project.id,
            provider = self.provider.id(),
            search = self.research.backend_name(),
            max_iterations = config.max_iterations,
            threshold = config.approval_threshold,
            "Run started"
        );
        self.emit(ProgressEvent::RunStarted {
            project_id: project.id.clone(),
            max_iterations: config.max_iterations,
        });

        let evaluator = QualityEvaluator::new(
            config.rubric.clone(),
            config.approval_threshold,
            config.min_criterion_floor,
        );
        let mut run = Run {
            project_id: &project.id,
            config,
            policy: RetryPolicy::from_config(config.max_retries_per_call, &config.retry_backoff),
            budget: BudgetTracker::new(config.token_budget, config.time_budget),
        };

        let mut iteration = 0u32;
        let mut carry: Option<Carry> = None;
        let ending: Result<(String, f32), FailureReason> = loop {
            if self.cancel.is_cancelled() {
                break Err(FailureReason::Cancelled);
            }
            if iteration >= config.max_iterations {
                break Err(FailureReason::MaxIterationsExceeded);
            }
            if run.budget.is_exhausted() {
                break Err(FailureReason::BudgetExceeded);
            }

            iteration += 1;
            self.emit(ProgressEvent::IterationStart {
                iteration,
                max_iterations: config.max_iterations,
            });

            match self
                .run_round(&mut run, &evaluator, input, iteration, carry.as_ref())
                .await?
            {
                RoundOutcome::Approved { draft, score } => break Ok((draft, score)),
                RoundOutcome::Rejected { draft, feedback } => {
                    carry = Some(Carry { draft, feedback });
                }
                RoundOutcome::Failed(reason) => break Err(reason),
            }
        };

        let (status, reason, final_content, final_score) = match ending {
            Ok((draft, score)) => {
                machine.complete()?;
                (ProjectStatus::Completed, None, Some(draft), Some(score))
            }
            Err(reason) => {
                machine.fail(reason)?;
                (ProjectStatus::Failed, Some(reason), None, None)
            }
        };
        self.store
            .finish_run(&project.id, status, reason, final_content.as_deref())?;

        let ledger = self.store.ledger(&project.id)?;
        let usage = UsageTotals {
            tokens: run.budget.tokens_spent(),
            elapsed: run.budget.time_spent(),
            calls: run.budget.calls(),
        };

        match reason {
            None => tracing::info!(
                project_id = %project.id,
                iterations = ledger.iterations(),
                score = final_score.unwrap_or_default(),
                tokens = usage.tokens,
                "Run completed"
            ),
            Some(r) => tracing::warn!(
                project_id = %project.id,
                iterations = ledger.iterations(),
                reason = %r,
                tokens = usage.tokens,
                "Run failed"
            ),
        }
        self.emit(ProgressEvent::Finished {
            status,
            reason,
            iterations: ledger.iterations(),
            total_tokens: usage.tokens,
        });

        Ok(TerminalOutcome {
            project_id: project.id.clone(),
            status,
            reason,
            final_content,
            final_score,
            iterations: ledger.iterations(),
            usage,
            ledger,
        })
    }

    async fn run_round(
        &self,
        run: &mut Run<'_>,
        evaluator: &QualityEvaluator,
        input: &StructuredInput,
        iteration: u32,
        carry: Option<&Carry>,
    ) -> Result<RoundOutcome, AutonoError> {
        let feedback = carry.and_then(|c| c.feedback.as_deref());

        // 1. Plan
        let prompt = self.prompts.planner(input, feedback);
        let outline = match self.call(run, iteration, AgentRole::Planner, prompt).await? {
            Call::Done(text) => text,
            Call::Refused => return Ok(RoundOutcome::Failed(FailureReason::BudgetExceeded)),
            Call::Failed => return Ok(RoundOutcome::Failed(FailureReason::ProviderError)),
        };

        // 2. Research. A failed researcher call falls back to derived queries.
        let max_queries = run.config.research.max_queries;
        let prompt = self.prompts.researcher(input, &outline);
        let mut queries = match self.call(run, iteration, AgentRole::Researcher, prompt).await? {
            Call::Done(text) => parse_query_lines(&text, max_queries),
            Call::Refused => return Ok(RoundOutcome::Failed(FailureReason::BudgetExceeded)),
            Call::Failed => Vec::new(),
        };
        if queries.is_empty() {
            queries = fallback_queries(&outline, input, max_queries);
            tracing::debug!(iteration, queries = queries.len(), "Using fallback queries");
        }
        let bundle = self
            .research
            .research(
                &queries,
                run.config.research.per_query_result_cap,
                run.config.research.total_source_cap,
            )
            .await;
        self.persist_research(run.project_id, iteration, &bundle)?;
        self.emit(ProgressEvent::ResearchGathered {
            iteration,
            queries: bundle.per_query.len(),
            sources: bundle.sources.len(),
            aggregate_relevance: bundle.aggregate_relevance,
        });

        // 3. Write
        let prompt = self.prompts.writer(&WriterContext {
            input,
            outline: &outline,
            research: &bundle,
            feedback,
            previous_draft: carry.map(|c| c.draft.as_str()),
        });
        let draft = match self.call(run, iteration, AgentRole::Writer, prompt).await? {
            Call::Done(text) => text,
            Call::Refused => return Ok(RoundOutcome::Failed(FailureReason::BudgetExceeded)),
            Call::Failed => return Ok(RoundOutcome::Failed(FailureReason::ProviderError)),
        };

        // 4. Critique
        let prompt = self.prompts.critic(input, &draft, evaluator.rubric());
        let critique = match self.call(run, iteration, AgentRole::Critic, prompt).await? {
            Call::Done(text) => text,
            Call::Refused => return Ok(RoundOutcome::Failed(FailureReason::BudgetExceeded)),
            Call::Failed => return Ok(RoundOutcome::Failed(FailureReason::ProviderError)),
        };
        let verdict = evaluator.evaluate_response(&critique);
        self.store.append_evaluation(&QualityEvaluation {
            id: uuid::Uuid::new_v4().to_string(),
            project_id: run.project_id.to_string(),
            iteration,
            score: verdict.score,
            criteria_breakdown: verdict.breakdown.clone(),
            approved: verdict.approved,
            feedback: verdict.feedback.clone(),
            created_at: Utc::now(),
        })?;
        self.emit(ProgressEvent::Evaluated {
            iteration,
            score: verdict.score,
            approved: verdict.approved,
        });
        tracing::info!(
            project_id = run.project_id,
            iteration,
            score = verdict.score,
            approved = verdict.approved,
            "Draft evaluated"
        );

        // 5. Decide
        if verdict.approved {
            Ok(RoundOutcome::Approved {
                draft,
                score: verdict.score,
            })
        } else {
            Ok(RoundOutcome::Rejected {
                draft,
                feedback: verdict.feedback,
            })
        }
    }

    /// Gate, invoke and record one agent call. Every call that is actually
    /// sent is persisted, whether it succeeded or not.
    async fn call(
        &self,
        run: &mut Run<'_>,
        iteration: u32,
        role: AgentRole,
        prompt: String,
    ) -> Result<Call, AutonoError> {
        if run.budget.would_exceed_prompt(&prompt) {
            let remaining = run.budget.remaining();
            tracing::warn!(
                project_id = run.project_id,
                iteration,
                role = %role,
                remaining_tokens = remaining.tokens,
                remaining_ms = remaining.time.as_millis() as u64,
                "Call refused by budget"
            );
            return Ok(Call::Refused);
        }

        let model = run.config.models.for_role(role);
        let outcome =
            invoke_with_retry(self.provider.as_ref(), role, &prompt, model, &run.policy).await;

        let (output, error, tokens_used) = match outcome.result {
            Ok(completion) => (Some(completion.text), None, completion.usage.total()),
            Err(e) => {
                tracing::error!(
                    project_id = run.project_id,
                    iteration,
                    role = %role,
                    attempts = outcome.attempts,
                    "Agent call failed: {}",
                    e
                );
                (None, Some(e.to_string()), 0)
            }
        };

        let exec = AgentExecution {
            id: uuid::Uuid::new_v4().to_string(),
            project_id: run.project_id.to_string(),
            iteration,
            role,
            input_prompt: prompt,
            output,
            execution_time: outcome.elapsed,
            tokens_used,
            attempts: outcome.attempts,
            error,
            created_at: Utc::now(),
        };
        self.store.append_execution(&exec)?;
        run.budget.record(&exec);

        self.emit(ProgressEvent::RoleFinished {
            iteration,
            role,
            tokens: exec.tokens_used,
            elapsed: exec.execution_time,
            attempts: exec.attempts,
            ok: exec.succeeded(),
        });
        tracing::debug!(
            project_id = run.project_id,
            iteration,
            role = %role,
            tokens = exec.tokens_used,
            elapsed_ms = exec.execution_time.as_millis() as u64,
            "Agent call recorded"
        );

        Ok(match exec.output {
            Some(text) => Call::Done(text),
            None => Call::Failed,
        })
    }

    fn persist_research(
        &self,
        project_id: &str,
        iteration: u32,
        bundle: &ResearchBundle,
    ) -> Result<(), AutonoError> {
        for result in &bundle.per_query {
            self.store.append_research(&ResearchData {
                id: uuid::Uuid::new_v4().to_string(),
                project_id: project_id.to_string(),
                iteration,
                query: result.query.clone(),
                sources: result.sources.clone(),
                aggregate_relevance: result.aggregate_relevance,
                content_summary: result.summary.clone(),
                error: result.error.clone(),
                created_at: Utc::now(),
            })?;
        }
        Ok(())
    }
}
