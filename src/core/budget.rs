// src/core/budget.rs — Token and time budget tracking

use std::time::Duration;

use super::types::AgentExecution;
use crate::provider::estimate_tokens;

/// Headroom left in a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Remaining {
    pub tokens: u64,
    pub time: Duration,
}

/// Tracks token and execution-time spending against the run's budgets.
///
/// Spending is fed from persisted executions only, so a tracker rebuilt
/// with `from_executions` always agrees with the ledger.
#[derive(Debug, Clone)]
pub struct BudgetTracker {
    token_budget: u64,
    time_budget: Duration,
    tokens_spent: u64,
    time_spent: Duration,
    calls: u32,
}

impl BudgetTracker {
    pub fn new(token_budget: u64, time_budget: Duration) -> Self {
        Self {
            token_budget,
            time_budget,
            tokens_spent: 0,
            time_spent: Duration::ZERO,
            calls: 0,
        }
    }

    pub fn from_executions(
        token_budget: u64,
        time_budget: Duration,
        executions: &[AgentExecution],
    ) -> Self {
        let mut tracker = Self::new(token_budget, time_budget);
        for exec in executions {
            tracker.record(exec);
        }
        tracker
    }

    pub fn record(&mut self, exec: &AgentExecution) {
        self.tokens_spent += exec.tokens_used as u64;
        self.time_spent += exec.execution_time;
        self.calls += 1;
    }

    pub fn remaining(&self) -> Remaining {
        Remaining {
            tokens: self.token_budget.saturating_sub(self.tokens_spent),
            time: self.time_budget.saturating_sub(self.time_spent),
        }
    }

    /// Would a call with `estimated_tokens` of prompt overrun the budget?
    ///
    /// Output length is unknown before the call, so the last call may push
    /// spending past the cap by at most its own output.
    pub fn would_exceed(&self, estimated_tokens: u64) -> bool {
        self.tokens_spent + estimated_tokens > self.token_budget
            || self.time_spent >= self.time_budget
    }

    /// Convenience for the pre-call check on a prompt.
    pub fn would_exceed_prompt(&self, prompt: &str) -> bool {
        self.would_exceed(estimate_tokens(prompt) as u64)
    }

    pub fn is_exhausted(&self) -> bool {
        self.tokens_spent >= self.token_budget || self.time_spent >= self.time_budget
    }

    pub fn tokens_spent(&self) -> u64 {
        self.tokens_spent
    }

    pub fn time_spent(&self) -> Duration {
        self.time_spent
    }

    pub fn calls(&self) -> u32 {
        self.calls
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::AgentRole;
    use chrono::Utc;

    fn exec(tokens: u32, secs: u64) -> AgentExecution {
        AgentExecution {
            id: "e".into(),
            project_id: "p".into(),
            iteration: 1,
            role: AgentRole::Writer,
            input_prompt: String::new(),
            output: Some(String::new()),
            execution_time: Duration::from_secs(secs),
            tokens_used: tokens,
            attempts: 1,
            error: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_new_budget() {
        let b = BudgetTracker::new(1000, Duration::from_secs(60));
        assert_eq!(b.remaining().tokens, 1000);
        assert_eq!(b.remaining().time, Duration::from_secs(60));
        assert!(!b.is_exhausted());
    }

    #[test]
    fn test_record_and_remaining() {
        let mut b = BudgetTracker::new(1000, Duration::from_secs(60));
        b.record(&exec(150, 5));
        assert_eq!(b.tokens_spent(), 150);
        assert_eq!(b.remaining().tokens, 850);
        assert_eq!(b.remaining().time, Duration::from_secs(55));
        assert_eq!(b.calls(), 1);
    }

    #[test]
    fn test_would_exceed_tokens() {
        let mut b = BudgetTracker::new(1000, Duration::from_secs(60));
        b.record(&exec(900, 1));
        assert!(!b.would_exceed(100));
        assert!(b.would_exceed(101));
    }

    #[test]
    fn test_would_exceed_when_time_used_up() {
        let mut b = BudgetTracker::new(1000, Duration::from_secs(10));
        b.record(&exec(1, 10));
        assert!(b.would_exceed(0));
        assert!(b.is_exhausted());
    }

    #[test]
    fn test_exhausted_saturates() {
        let mut b = BudgetTracker::new(100, Duration::from_secs(60));
        b.record(&exec(110, 1));
        assert!(b.is_exhausted());
        assert_eq!(b.remaining().tokens, 0);
    }

    #[test]
    fn test_from_executions_matches_incremental() {
        let rows = vec![exec(100, 2), exec(250, 3), exec(50, 1)];
        let rebuilt = BudgetTracker::from_executions(1000, Duration::from_secs(60), &rows);
        let mut incremental = BudgetTracker::new(1000, Duration::from_secs(60));
        rows.iter().for_each(|r| incremental.record(r));
        assert_eq!(rebuilt.tokens_spent(), incremental.tokens_spent());
        assert_eq!(rebuilt.time_spent(), Duration::from_secs(6));
        assert_eq!(rebuilt.calls(), 3);
    }

    #[test]
    fn test_would_exceed_prompt_uses_estimate() {
        let b = BudgetTracker::new(2, Duration::from_secs(60));
        assert!(!b.would_exceed_prompt("abcdefgh"));
        assert!(b.would_exceed_prompt("abcdefghi"));
    }
}
