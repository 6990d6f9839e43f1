// src/evaluator/utils.rs — Helper functions for evaluation

use crate::core::types::CriterionScore;

/// Weighted composite score, rounded to 4 decimals so that float noise never
/// flips a threshold comparison.
///
/// Weights are normalized by their sum, so a rubric accepted within the
/// weight tolerance still maps all-10 sub-scores to exactly 10.
pub fn composite_score(criteria: &[CriterionScore]) -> f32 {
    let weight_sum: f64 = criteria.iter().map(|c| c.weight as f64).sum();
    if weight_sum <= 0.0 {
        return 0.0;
    }
    let total: f64 = criteria
        .iter()
        .map(|c| c.weight as f64 * c.score.clamp(0.0, 10.0) as f64)
        .sum::<f64>()
        / weight_sum;
    ((total * 10_000.0).round() / 10_000.0).clamp(0.0, 10.0) as f32
}

/// Truncate text on a char boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
