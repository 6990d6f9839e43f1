// src/research/queries.rs — Search query extraction

use crate::core::request::StructuredInput;

/// Read one query per line from a researcher response.
///
/// List markers and surrounding quotes are stripped, blank lines and
/// duplicates (case-insensitive) dropped, and the result capped at `max`.
pub fn parse_query_lines(text: &str, max: usize) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for line in text.lines() {
        let q = clean_query(line);
        if q.is_empty() || q.ends_with(':') {
            continue;
        }
        push_unique(&mut out, q, max);
    }
    out
}

/// Queries derived without a model: outline headings, then the main purpose
/// and key concepts of the request.
pub fn fallback_queries(outline: &str, input: &StructuredInput, max: usize) -> Vec<String> {
    let mut out = Vec::new();
    let domain = input.domain.trim();

    for line in outline.lines() {
        let Some(heading) = line.trim().strip_prefix("##") else {
            continue;
        };
        let heading = heading.trim_start_matches('#').trim();
        if heading.is_empty() {
            continue;
        }
        push_unique(&mut out, format!("{domain} {heading}"), max);
    }

    push_unique(&mut out, input.main_purpose().trim().to_string(), max);
    for concept in &input.key_concepts {
        push_unique(&mut out, format!("{domain} {}", concept.trim()), max);
    }
    push_unique(&mut out, domain.to_string(), max);
    out
}

fn clean_query(line: &str) -> String {
    let mut q = line.trim().trim_start_matches(['-', '*', '•']).trim_start();
    let digits = q.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits > 0 {
        if let Some(rest) = q[digits..]
            .strip_prefix('.')
            .or_else(|| q[digits..].strip_prefix(')'))
        {
            q = rest.trim_start();
        }
    }
    q.trim_matches(['"', '\'', '`']).trim().to_string()
}

fn push_unique(out: &mut Vec<String>, query: String, max: usize) {
    if out.len() >= max || query.trim().is_empty() {
        return;
    }
    if out.iter().any(|q| q.eq_ignore_ascii_case(&query)) {
        return;
    }
    out.push(query);
}
