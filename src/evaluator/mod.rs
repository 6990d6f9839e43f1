// src/evaluator/mod.rs — Quality gate
//
// Turns a critique into a verdict. Everything here is pure: the same
// critique always yields the same score, approval and feedback.

pub mod parser;
pub mod rubric;
pub mod utils;

use crate::core::types::CriterionScore;
use parser::parse_critique;
use rubric::Rubric;
use utils::composite_score;

/// Criteria scoring below this are always named in feedback.
pub const NEEDS_IMPROVEMENT_THRESHOLD: f32 = 7.0;

/// Outcome of the quality gate for one draft.
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub score: f32,
    pub breakdown: Vec<CriterionScore>,
    pub approved: bool,
    pub feedback: Option<String>,
}

#[derive(Debug, Clone)]
pub struct QualityEvaluator {
    rubric: Rubric,
    approval_threshold: f32,
    min_criterion_floor: Option<f32>,
}

impl QualityEvaluator {
    pub fn new(rubric: Rubric, approval_threshold: f32, min_criterion_floor: Option<f32>) -> Self {
        Self {
            rubric,
            approval_threshold,
            min_criterion_floor,
        }
    }

    pub fn rubric(&self) -> &Rubric {
        &self.rubric
    }

    /// Parse a critic response, fill missing criteria, and evaluate.
    pub fn evaluate_response(&self, critique: &str) -> Verdict {
        let parsed = parse_critique(critique, &self.rubric);
        if parsed.missing() > 0 {
            tracing::debug!(
                missing = parsed.missing(),
                overall = ?parsed.overall,
                "Critique missing criterion scores; using fallback"
            );
        }
        let scores = parsed.resolve(&self.rubric);
        self.evaluate(&scores, &parsed.recommendations)
    }

    /// Score = weighted mean of sub-scores. Approved when the score meets the
    /// threshold and no sub-score falls under the configured floor.
    pub fn evaluate(&self, scores: &[CriterionScore], recommendations: &[String]) -> Verdict {
        let breakdown: Vec<CriterionScore> = scores
            .iter()
            .map(|c| CriterionScore {
                score: c.score.clamp(0.0, 10.0),
                ..c.clone()
            })
            .collect();
        let score = composite_score(&breakdown);

        let below_floor = |c: &CriterionScore| {
            self.min_criterion_floor
                .map(|floor| c.score < floor)
                .unwrap_or(false)
        };
        let approved =
            score >= self.approval_threshold && !breakdown.iter().any(|c| below_floor(c));

        let mut lines = Vec::new();
        for c in &breakdown {
            if below_floor(c) {
                lines.push(format!(
                    "- {}: {:.1}/10 is below the minimum of {:.1}",
                    c.criterion,
                    c.score,
                    self.min_criterion_floor.unwrap_or_default()
                ));
            } else if c.score < NEEDS_IMPROVEMENT_THRESHOLD {
                lines.push(format!("- {}: {:.1}/10 needs improvement", c.criterion, c.score));
            }
        }
        if !approved && lines.is_empty() {
            lines.push(format!(
                "- overall: {:.1}/10 is below the approval threshold of {:.1}",
                score, self.approval_threshold
            ));
        }
        if !recommendations.is_empty() {
            lines.push("Recommendations:".into());
            lines.extend(
                recommendations
                    .iter()
                    .enumerate()
                    .map(|(i, r)| format!("{}. {}", i + 1, r)),
            );
        }

        Verdict {
            score,
            breakdown,
            approved,
            feedback: (!lines.is_empty()).then(|| lines.join("\n")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uniform(score: f32) -> Vec<CriterionScore> {
        Rubric::default()
            .criteria()
            .iter()
            .map(|c| CriterionScore {
                criterion: c.name.clone(),
                score,
                weight: c.weight,
            })
            .collect()
    }

    fn evaluator(threshold: f32, floor: Option<f32>) -> QualityEvaluator {
        QualityEvaluator::new(Rubric::default(), threshold, floor)
    }

    #[test]
    fn test_approved_at_threshold() {
        let v = evaluator(7.5, None).evaluate(&uniform(7.5), &[]);
        assert_eq!(v.score, 7.5);
        assert!(v.approved);
        assert!(v.feedback.is_none());
    }

    #[test]
    fn test_perfect_scores_meet_threshold_ten_with_inexact_weights() {
        let rubric = Rubric::new(vec![
            rubric::Criterion {
                name: "structure".into(),
                weight: 0.5,
            },
            rubric::Criterion {
                name: "depth".into(),
                weight: 0.499,
            },
        ])
        .unwrap();
        let v = QualityEvaluator::new(rubric, 10.0, None)
            .evaluate_response("Structure: 10/10\nDepth: 10/10\nOVERALL: 10/10");
        assert_eq!(v.score, 10.0);
        assert!(v.approved);
    }

    #[test]
    fn test_rejected_below_threshold_has_feedback() {
        let v = evaluator(8.0, None).evaluate(&uniform(7.5), &[]);
        assert!(!v.approved);
        let fb = v.feedback.unwrap();
        assert!(fb.contains("below the approval threshold"));
    }

    #[test]
    fn test_floor_blocks_approval() {
        let mut scores = uniform(9.0);
        scores[3].score = 4.0;
        let v = evaluator(7.0, Some(5.0)).evaluate(&scores, &[]);
        assert!(v.score >= 7.0);
        assert!(!v.approved);
        assert!(v.feedback.unwrap().contains("sourcing: 4.0/10 is below the minimum of 5.0"));

        // Same scores without a floor are approved.
        assert!(evaluator(7.0, None).evaluate(&scores, &[]).approved);
    }

    #[test]
    fn test_approval_biconditional() {
        for threshold in [0.0, 5.0, 7.0, 8.5, 10.0] {
            for floor in [None, Some(6.0)] {
                for base in [0.0, 5.5, 6.0, 7.0, 8.5, 10.0] {
                    let mut scores = uniform(base);
                    scores[0].score = (base - 1.0).max(0.0);
                    let v = evaluator(threshold, floor).evaluate(&scores, &[]);
                    let floor_ok = floor.map_or(true, |f| v.breakdown.iter().all(|c| c.score >= f));
                    assert_eq!(v.approved, v.score >= threshold && floor_ok);
                }
            }
        }
    }

    #[test]
    fn test_feedback_in_rubric_order_then_recommendations() {
        let mut scores = uniform(8.0);
        scores[4].score = 6.0;
        scores[1].score = 5.0;
        let recs = vec!["Add citations".to_string()];
        let v = evaluator(9.0, None).evaluate(&scores, &recs);
        let fb = v.feedback.unwrap();
        let lines: Vec<&str> = fb.lines().collect();
        assert_eq!(
            lines,
            vec![
                "- depth: 5.0/10 needs improvement",
                "- coherence: 6.0/10 needs improvement",
                "Recommendations:",
                "1. Add citations",
            ]
        );
    }

    #[test]
    fn test_scores_clamped() {
        let v = evaluator(7.0, None).evaluate(&uniform(14.0), &[]);
        assert_eq!(v.score, 10.0);
        assert!(v.breakdown.iter().all(|c| c.score == 10.0));
    }

    #[test]
    fn test_evaluation_idempotent() {
        let e = evaluator(8.0, Some(6.0));
        let critique = "Structure: 8\nDepth: 5\nOVERALL: 7\nRECOMMENDATIONS:\n- more depth";
        assert_eq!(e.evaluate_response(critique), e.evaluate_response(critique));
    }

    #[test]
    fn test_evaluate_response_uses_overall_fallback() {
        let v = evaluator(7.0, None).evaluate_response("OVERALL: 7.0/10");
        assert_eq!(v.score, 7.0);
        assert!(v.approved);
    }

    #[test]
    fn test_unparseable_critique_is_rejected() {
        let v = evaluator(7.0, None).evaluate_response("Looks great to me!");
        assert_eq!(v.score, 0.0);
        assert!(!v.approved);
        assert!(v.feedback.is_some());
    }
}
