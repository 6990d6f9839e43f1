// src/evaluator/parser.rs — Parse critic responses into structured scores

use super::rubric::Rubric;
use crate::core::types::CriterionScore;

/// Parsed critique, before any fallback is applied.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedCritique {
    /// Aligned with the rubric; `None` when the critic gave no score.
    pub scores: Vec<Option<f32>>,
    pub overall: Option<f32>,
    pub recommendations: Vec<String>,
}

impl ParsedCritique {
    /// Fill gaps: a missing criterion takes the overall score, or 0.0.
    pub fn resolve(&self, rubric: &Rubric) -> Vec<CriterionScore> {
        rubric
            .criteria()
            .iter()
            .enumerate()
            .map(|(i, c)| CriterionScore {
                criterion: c.name.clone(),
                score: self
                    .scores
                    .get(i)
                    .copied()
                    .flatten()
                    .or(self.overall)
                    .unwrap_or(0.0),
                weight: c.weight,
            })
            .collect()
    }

    pub fn missing(&self) -> usize {
        self.scores.iter().filter(|s| s.is_none()).count()
    }
}

/// Parse a critic response.
///
/// Expected format:
/// ```text
/// Structure: 8.5/10
/// - depth: 7
/// OVERALL: 7.8/10
/// RECOMMENDATIONS:
/// 1. Add citations
/// ```
pub fn parse_critique(response: &str, rubric: &Rubric) -> ParsedCritique {
    let mut parsed = ParsedCritique {
        scores: vec![None; rubric.criteria().len()],
        ..Default::default()
    };
    let mut section = Section::Scores;

    for line in response.lines() {
        let cleaned = line.replace(['*', '#', '`'], "");
        let trimmed = strip_list_marker(cleaned.trim());
        if trimmed.is_empty() {
            continue;
        }

        if let Some(rest) = strip_header(trimmed, "RECOMMENDATIONS") {
            section = Section::Recommendations;
            if !rest.is_empty() {
                parsed.recommendations.push(rest.to_string());
            }
            continue;
        }

        if let Some((label, value)) = trimmed.split_once(':') {
            let label_norm = super::rubric::normalize_name(label);
            if label_norm.starts_with("overall") {
                if let Some(score) = parse_score(value) {
                    parsed.overall = Some(score);
                    section = Section::Scores;
                    continue;
                }
            }
            if let Some(idx) = rubric.position(label) {
                if let Some(score) = parse_score(value) {
                    // First score wins if the critic repeats a criterion.
                    parsed.scores[idx].get_or_insert(score);
                    section = Section::Scores;
                    continue;
                }
            }
        }

        if section == Section::Recommendations {
            parsed.recommendations.push(trimmed.to_string());
        }
    }

    parsed
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Section {
    Scores,
    Recommendations,
}

/// "RECOMMENDATIONS: x" / "Recommendations" -> Some("x") / Some("").
fn strip_header<'a>(line: &'a str, header: &str) -> Option<&'a str> {
    let head = line.get(..header.len())?;
    if !head.eq_ignore_ascii_case(header) {
        return None;
    }
    let rest = line[header.len()..].trim_start();
    let rest = rest.strip_prefix(':').unwrap_or(rest);
    Some(rest.trim())
}

/// Drop "-", "*", "•" or "1." style list markers.
fn strip_list_marker(line: &str) -> &str {
    let line = line.trim_start_matches(['-', '•']).trim_start();
    let digits = line.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits > 0 {
        let rest = &line[digits..];
        if let Some(r) = rest.strip_prefix('.').or_else(|| rest.strip_prefix(')')) {
            if r.starts_with(' ') {
                return r.trim_start();
            }
        }
    }
    line
}

/// Parse "8.5", "8.5/10", "7 / 10", "4/5" or "8,5" into a [0, 10] score.
pub(crate) fn parse_score(text: &str) -> Option<f32> {
    let text = text.trim();
    let number_len = text
        .char_indices()
        .take_while(|(_, c)| c.is_ascii_digit() || *c == '.' || *c == ',')
        .map(|(i, c)| i + c.len_utf8())
        .last()?;
    let value: f32 = text[..number_len].replace(',', ".").parse().ok()?;

    let rest = text[number_len..].trim_start();
    let score = match rest.strip_prefix('/') {
        Some(denom) => {
            let denom_len = denom
                .trim_start()
                .chars()
                .take_while(|c| c.is_ascii_digit() || *c == '.')
                .count();
            let denom: f32 = denom.trim_start()[..denom_len].parse().ok()?;
            if denom <= 0.0 {
                return None;
            }
            value / denom * 10.0
        }
        None => value,
    };
    if !score.is_finite() {
        return None;
    }
    Some(score.clamp(0.0, 10.0))
}
