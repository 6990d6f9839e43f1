// src/research/backend.rs — Pluggable search backends

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::core::types::Source;
use crate::infra::config::{ResearchConfig, SearchBackendKind};
use crate::infra::errors::AutonoError;

/// A search engine the research aggregator can query.
///
/// Backends return raw hits; canonical identity, relevance clamping and
/// ranking are applied by the aggregator.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    fn name(&self) -> &str;

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<Source>, AutonoError>;
}

/// SearxNG-compatible JSON endpoint (`/search?q=..&format=json`).
pub struct SearxBackend {
    client: reqwest::Client,
    endpoint: String,
    timeout: Duration,
}

impl SearxBackend {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            timeout,
        }
    }

    fn error(&self, message: String) -> AutonoError {
        AutonoError::Search {
            backend: "searx".into(),
            message,
        }
    }
}

/// Map a SearxNG response body to sources. Relevance is the engine score
/// relative to the best hit, or rank-based when scores are absent.
fn parse_searx_results(data: &serde_json::Value, limit: usize) -> Vec<Source> {
    let Some(items) = data.get("results").and_then(|r| r.as_array()) else {
        return Vec::new();
    };
    let items: Vec<&serde_json::Value> = items.iter().take(limit).collect();
    let max_score = items
        .iter()
        .filter_map(|i| i.get("score").and_then(|s| s.as_f64()))
        .fold(0.0_f64, f64::max);
    let count = items.len().max(1) as f64;

    items
        .iter()
        .enumerate()
        .filter_map(|(rank, item)| {
            let url = item.get("url").and_then(|u| u.as_str())?.to_string();
            let relevance = match item.get("score").and_then(|s| s.as_f64()) {
                Some(score) if max_score > 0.0 => score / max_score,
                _ => 1.0 - rank as f64 / count,
            };
            let mut metadata = BTreeMap::new();
            if let Some(engine) = item.get("engine").and_then(|e| e.as_str()) {
                metadata.insert("engine".to_string(), engine.to_string());
            }
            if let Some(date) = item.get("publishedDate").and_then(|d| d.as_str()) {
                metadata.insert("published".to_string(), date.to_string());
            }
            Some(Source {
                url,
                canonical_id: String::new(),
                title: item
                    .get("title")
                    .and_then(|t| t.as_str())
                    .unwrap_or("")
                    .to_string(),
                snippet: item
                    .get("content")
                    .and_then(|c| c.as_str())
                    .unwrap_or("")
                    .to_string(),
                relevance: relevance as f32,
                metadata,
            })
        })
        .collect()
}

#[async_trait]
impl SearchBackend for SearxBackend {
    fn name(&self) -> &str {
        "searx"
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<Source>, AutonoError> {
        let response = self
            .client
            .get(format!("{}/search", self.endpoint))
            .query(&[("q", query), ("format", "json")])
            .header("Accept", "application/json")
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| self.error(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(self.error(format!("HTTP {}: {}", status.as_u16(), body)));
        }

        let data: serde_json::Value = response
            .json()
            .await
            .map_err(|e| self.error(format!("invalid response: {e}")))?;
        Ok(parse_searx_results(&data, limit))
    }
}

/// Deterministic offline backend. Every query yields the same few sources,
/// and one shared reference page shows up across queries.
#[derive(Debug, Clone, Default)]
pub struct SimulatedSearch;

fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    for c in text.chars() {
        if c.is_alphanumeric() {
            slug.extend(c.to_lowercase());
        } else if !slug.ends_with('-') && !slug.is_empty() {
            slug.push('-');
        }
    }
    slug.trim_end_matches('-').to_string()
}

#[async_trait]
impl SearchBackend for SimulatedSearch {
    fn name(&self) -> &str {
        "simulation"
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<Source>, AutonoError> {
        let slug = slugify(query);
        let mut sources = vec![
            Source {
                url: format!("https://en.wikipedia.org/wiki/{slug}"),
                canonical_id: String::new(),
                title: format!("{query} - overview"),
                snippet: format!("An encyclopedic overview of {query}."),
                relevance: 0.9,
                metadata: BTreeMap::new(),
            },
            Source {
                url: format!("https://arxiv.org/search/?query={slug}"),
                canonical_id: String::new(),
                title: format!("Recent papers on {query}"),
                snippet: format!("Peer-reviewed work discussing {query}."),
                relevance: 0.75,
                metadata: BTreeMap::new(),
            },
            Source {
                url: "https://www.example.org/reference-guide/?utm_source=simulation".into(),
                canonical_id: String::new(),
                title: "Reference guide".into(),
                snippet: "A general reference guide cited by many articles.".into(),
                relevance: 0.6,
                metadata: BTreeMap::new(),
            },
        ];
        sources.truncate(limit);
        Ok(sources)
    }
}

/// Build the search backend named by `[research] backend`.
pub fn build_search_backend(config: &ResearchConfig) -> Result<Arc<dyn SearchBackend>, AutonoError> {
    match config.backend {
        SearchBackendKind::Simulation => Ok(Arc::new(SimulatedSearch)),
        SearchBackendKind::Searx => {
            let endpoint = config.endpoint.clone().ok_or_else(|| {
                AutonoError::Config("research backend 'searx' needs an endpoint".into())
            })?;
            Ok(Arc::new(SearxBackend::new(
                endpoint,
                Duration::from_secs(config.request_timeout_seconds),
            )))
        }
    }
}
