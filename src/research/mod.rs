// src/research/mod.rs — Research aggregation
//
// Issues queries concurrently (bounded), then merges in query order so the
// bundle never depends on which request finished first.

pub mod backend;
pub mod canonical;
pub mod queries;

use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;

use crate::core::types::Source;
use crate::evaluator::utils::truncate_chars;
use backend::SearchBackend;
use canonical::canonical_id;

const SUMMARY_MAX_CHARS: usize = 6_000;
const SNIPPET_MAX_CHARS: usize = 300;

/// What one query produced after per-query capping.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    pub query: String,
    pub sources: Vec<Source>,
    pub aggregate_relevance: f32,
    pub summary: String,
    pub error: Option<String>,
}

/// Deduplicated, ranked research for one round.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResearchBundle {
    pub per_query: Vec<QueryResult>,
    pub sources: Vec<Source>,
    pub aggregate_relevance: f32,
    pub summary: String,
}

impl ResearchBundle {
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

pub struct ResearchAggregator {
    backend: Arc<dyn SearchBackend>,
    fan_out: usize,
}

impl ResearchAggregator {
    pub fn new(backend: Arc<dyn SearchBackend>, fan_out: usize) -> Self {
        Self {
            backend,
            fan_out: fan_out.max(1),
        }
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Run every query and merge the results.
    ///
    /// A failing query is logged and contributes no sources; an empty bundle
    /// is a valid outcome.
    pub async fn research(
        &self,
        queries: &[String],
        per_query_result_cap: usize,
        total_source_cap: usize,
    ) -> ResearchBundle {
        // Owned queries keep the per-query futures free of borrowed closure
        // arguments, so a run can be spawned onto its own task.
        let mut indexed: Vec<(usize, QueryResult)> =
            stream::iter(queries.iter().cloned().enumerate())
                .map(|(idx, query)| async move {
                    (idx, self.run_query(&query, per_query_result_cap).await)
                })
                .buffer_unordered(self.fan_out)
                .collect()
                .await;
        indexed.sort_by_key(|(idx, _)| *idx);
        let per_query: Vec<QueryResult> = indexed.into_iter().map(|(_, r)| r).collect();

        let sources = merge_sources(&per_query, total_source_cap);
        tracing::debug!(
            backend = self.backend.name(),
            queries = per_query.len(),
            sources = sources.len(),
            "Research merged"
        );
        ResearchBundle {
            aggregate_relevance: mean_relevance(&sources),
            summary: summarize(&sources),
            sources,
            per_query,
        }
    }

    async fn run_query(&self, query: &str, cap: usize) -> QueryResult {
        match self.backend.search(query, cap).await {
            Ok(raw) => {
                let sources = rank_query_sources(raw, cap);
                QueryResult {
                    query: query.to_string(),
                    aggregate_relevance: mean_relevance(&sources),
                    summary: summarize(&sources),
                    sources,
                    error: None,
                }
            }
            Err(e) => {
                tracing::warn!(backend = self.backend.name(), query, "Search failed: {}", e);
                QueryResult {
                    query: query.to_string(),
                    error: Some(e.to_string()),
                    ..Default::default()
                }
            }
        }
    }
}

/// Normalize one query's hits: canonical ids, clamped relevance, in-query
/// dedupe, sorted by relevance and capped.
fn rank_query_sources(raw: Vec<Source>, cap: usize) -> Vec<Source> {
    let mut sources: Vec<Source> = Vec::with_capacity(raw.len());
    for mut s in raw {
        s.canonical_id = canonical_id(&s.url);
        s.relevance = if s.relevance.is_finite() {
            s.relevance.clamp(0.0, 1.0)
        } else {
            0.0
        };
        match sources.iter().position(|e| e.canonical_id == s.canonical_id) {
            Some(idx) if s.relevance > sources[idx].relevance => sources[idx] = s,
            Some(_) => {}
            None => sources.push(s),
        }
    }
    sort_sources(&mut sources);
    sources.truncate(cap);
    sources
}

/// Dedupe across queries by canonical id. The higher-relevance copy wins;
/// on a tie the copy from the earlier query is kept.
fn merge_sources(per_query: &[QueryResult], total_cap: usize) -> Vec<Source> {
    let mut best: HashMap<&str, &Source> = HashMap::new();
    for result in per_query {
        for s in &result.sources {
            let keep_existing = best
                .get(s.canonical_id.as_str())
                .is_some_and(|existing| existing.relevance >= s.relevance);
            if !keep_existing {
                best.insert(s.canonical_id.as_str(), s);
            }
        }
    }
    let mut merged: Vec<Source> = best.into_values().cloned().collect();
    sort_sources(&mut merged);
    merged.truncate(total_cap);
    merged
}

fn sort_sources(sources: &mut [Source]) {
    sources.sort_by(|a, b| {
        b.relevance
            .total_cmp(&a.relevance)
            .then_with(|| a.canonical_id.cmp(&b.canonical_id))
    });
}

fn mean_relevance(sources: &[Source]) -> f32 {
    if sources.is_empty() {
        return 0.0;
    }
    sources.iter().map(|s| s.relevance).sum::<f32>() / sources.len() as f32
}

/// Numbered digest of titles and snippets, bounded in length.
fn summarize(sources: &[Source]) -> String {
    let mut out = String::new();
    for (i, s) in sources.iter().enumerate() {
        let title = if s.title.trim().is_empty() {
            s.url.as_str()
        } else {
            s.title.trim()
        };
        let entry = format!(
            "[{}] {} ({})\n    {}\n",
            i + 1,
            title,
            s.url,
            truncate_chars(s.snippet.trim(), SNIPPET_MAX_CHARS)
        );
        if out.chars().count() + entry.chars().count() > SUMMARY_MAX_CHARS {
            break;
        }
        out.push_str(&entry);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::errors::AutonoError;
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use std::time::Duration;

    fn source(url: &str, relevance: f32) -> Source {
        Source {
            url: url.into(),
            canonical_id: String::new(),
            title: format!("title {url}"),
            snippet: "snippet".into(),
            relevance,
            metadata: BTreeMap::new(),
        }
    }

    /// Answers from a fixed table; the first query sleeps so that it
    /// finishes last.
    struct TableBackend {
        table: HashMap<String, Result<Vec<Source>, String>>,
    }

    #[async_trait]
    impl SearchBackend for TableBackend {
        fn name(&self) -> &str {
            "table"
        }

        async fn search(&self, query: &str, limit: usize) -> Result<Vec<Source>, AutonoError> {
            if query == "slow" {
                tokio::time::sleep(Duration::from_millis(30)).await;
            }
            match self.table.get(query) {
                Some(Ok(s)) => Ok(s.iter().take(limit).cloned().collect()),
                Some(Err(msg)) => Err(AutonoError::Search {
                    backend: "table".into(),
                    message: msg.clone(),
                }),
                None => Ok(Vec::new()),
            }
        }
    }

    fn aggregator(entries: Vec<(&str, Result<Vec<Source>, String>)>) -> ResearchAggregator {
        let table = entries
            .into_iter()
            .map(|(q, r)| (q.to_string(), r))
            .collect();
        ResearchAggregator::new(Arc::new(TableBackend { table }), 4)
    }

    fn queries(qs: &[&str]) -> Vec<String> {
        qs.iter().map(|q| q.to_string()).collect()
    }

    #[tokio::test]
    async fn test_dedupe_keeps_higher_relevance() {
        let agg = aggregator(vec![
            ("a", Ok(vec![source("https://www.x.com/doc/", 0.4)])),
            ("b", Ok(vec![source("https://x.com/doc#top", 0.8)])),
        ]);
        let bundle = agg.research(&queries(&["a", "b"]), 5, 10).await;
        assert_eq!(bundle.sources.len(), 1);
        assert_eq!(bundle.sources[0].relevance, 0.8);
        assert_eq!(bundle.sources[0].canonical_id, "https://x.com/doc");
    }

    #[tokio::test]
    async fn test_tie_keeps_earlier_query() {
        let mut first = source("https://x.com/doc", 0.5);
        first.title = "first".into();
        let mut second = source("https://x.com/doc/", 0.5);
        second.title = "second".into();
        let agg = aggregator(vec![("slow", Ok(vec![first])), ("fast", Ok(vec![second]))]);
        let bundle = agg.research(&queries(&["slow", "fast"]), 5, 10).await;
        assert_eq!(bundle.sources[0].title, "first");
        // Merge order follows query order, not arrival order.
        assert_eq!(bundle.per_query[0].query, "slow");
    }

    #[tokio::test]
    async fn test_sorted_and_truncated() {
        let agg = aggregator(vec![(
            "a",
            Ok(vec![
                source("https://c.com", 0.5),
                source("https://a.com", 0.9),
                source("https://b.com", 0.5),
                source("https://d.com", 1.7),
            ]),
        )]);
        let bundle = agg.research(&queries(&["a"]), 10, 3).await;
        let ids: Vec<&str> = bundle
            .sources
            .iter()
            .map(|s| s.canonical_id.as_str())
            .collect();
        assert_eq!(ids, ["https://d.com", "https://a.com", "https://b.com"]);
        assert_eq!(bundle.sources[0].relevance, 1.0);
        assert!((bundle.aggregate_relevance - (1.0 + 0.9 + 0.5) / 3.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_per_query_cap() {
        let agg = aggregator(vec![(
            "a",
            Ok(vec![source("https://a.com", 0.2), source("https://b.com", 0.9)]),
        )]);
        let bundle = agg.research(&queries(&["a"]), 1, 10).await;
        assert_eq!(bundle.per_query[0].sources.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_query_degrades_to_empty() {
        let agg = aggregator(vec![
            ("bad", Err("boom".into())),
            ("good", Ok(vec![source("https://ok.com", 0.7)])),
        ]);
        let bundle = agg.research(&queries(&["bad", "good"]), 5, 10).await;
        assert!(bundle.per_query[0].error.as_deref().unwrap().contains("boom"));
        assert!(bundle.per_query[0].sources.is_empty());
        assert_eq!(bundle.sources.len(), 1);
    }

    #[tokio::test]
    async fn test_zero_results_is_valid() {
        let agg = aggregator(vec![]);
        let bundle = agg.research(&queries(&["nothing"]), 5, 10).await;
        assert!(bundle.is_empty());
        assert_eq!(bundle.aggregate_relevance, 0.0);
        assert!(bundle.summary.is_empty());
        assert_eq!(bundle.per_query.len(), 1);
    }

    #[tokio::test]
    async fn test_research_runs_on_spawned_task() {
        let agg = Arc::new(aggregator(vec![
            ("slow", Ok(vec![source("https://a.com", 0.6)])),
            ("fast", Ok(vec![source("https://b.com", 0.9)])),
        ]));
        let handle = tokio::spawn({
            let agg = agg.clone();
            async move { agg.research(&queries(&["slow", "fast"]), 5, 10).await }
        });
        let bundle = handle.await.unwrap();
        assert_eq!(bundle.per_query[0].query, "slow");
        assert_eq!(bundle.sources.len(), 2);
    }

    #[test]
    fn test_summary_is_bounded() {
        let many: Vec<Source> = (0..500)
            .map(|i| {
                let mut s = source(&format!("https://s{i}.com"), 0.5);
                s.snippet = "x".repeat(1000);
                s
            })
            .collect();
        let summary = summarize(&many);
        assert!(summary.chars().count() <= SUMMARY_MAX_CHARS);
        assert!(summary.starts_with("[1] "));
    }
}
