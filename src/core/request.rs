// src/core/request.rs — Structured content request
//
// The request is the read-only input to every round. It is loaded from a
// JSON file, validated once, and persisted before the run begins.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::infra::errors::AutonoError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TechnicalLevel {
    #[serde(alias = "iniciante")]
    Beginner,
    #[default]
    #[serde(alias = "intermediário", alias = "intermediario")]
    Intermediate,
    #[serde(alias = "avançado", alias = "avancado")]
    Advanced,
    #[serde(alias = "acadêmico", alias = "academico")]
    Academic,
}

impl TechnicalLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            TechnicalLevel::Beginner => "beginner",
            TechnicalLevel::Intermediate => "intermediate",
            TechnicalLevel::Advanced => "advanced",
            TechnicalLevel::Academic => "academic",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WritingTone {
    Formal,
    Informal,
    #[default]
    #[serde(alias = "acadêmico", alias = "academico")]
    Academic,
    #[serde(alias = "técnico", alias = "tecnico")]
    Technical,
    #[serde(alias = "persuasivo")]
    Persuasive,
}

impl WritingTone {
    pub fn as_str(&self) -> &'static str {
        match self {
            WritingTone::Formal => "formal",
            WritingTone::Informal => "informal",
            WritingTone::Academic => "academic",
            WritingTone::Technical => "technical",
            WritingTone::Persuasive => "persuasive",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScopeConstraints {
    pub must_include: Vec<String>,
    pub must_exclude: Vec<String>,
    pub word_count_target: Option<u32>,
    /// 1 (survey) to 5 (exhaustive).
    pub depth_level: u8,
    pub time_period: Option<String>,
}

impl Default for ScopeConstraints {
    fn default() -> Self {
        Self {
            must_include: Vec::new(),
            must_exclude: Vec::new(),
            word_count_target: None,
            depth_level: 2,
            time_period: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcePreferences {
    pub preferred_sources: Vec<String>,
    pub key_authors: Vec<String>,
    pub required_citations: bool,
    pub min_sources: u32,
}

impl Default for SourcePreferences {
    fn default() -> Self {
        Self {
            preferred_sources: Vec::new(),
            key_authors: Vec::new(),
            required_citations: false,
            min_sources: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StyleRequirements {
    #[serde(alias = "writing_tone")]
    pub tone: WritingTone,
    pub required_sections: Vec<String>,
    pub language: String,
    pub examples: Vec<String>,
}

impl Default for StyleRequirements {
    fn default() -> Self {
        Self {
            tone: WritingTone::Academic,
            required_sections: Vec::new(),
            language: "en".into(),
            examples: Vec::new(),
        }
    }
}

/// A content request: what to write, for whom, and under which constraints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredInput {
    #[serde(alias = "knowledge_domain")]
    pub domain: String,
    #[serde(alias = "target_audience")]
    pub audience: String,
    #[serde(default)]
    pub technical_level: TechnicalLevel,
    #[serde(default)]
    pub background_info: Option<String>,
    #[serde(default)]
    pub key_concepts: Vec<String>,
    /// Ordered; the first entry is the main purpose of the piece.
    pub objectives: Vec<String>,
    #[serde(default)]
    pub key_questions: Vec<String>,
    #[serde(default)]
    pub scope: ScopeConstraints,
    #[serde(default)]
    pub sources: SourcePreferences,
    #[serde(default)]
    pub style: StyleRequirements,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl StructuredInput {
    /// Minimal request for a domain and a single objective.
    pub fn new(domain: impl Into<String>, objective: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            audience: "general readers".into(),
            technical_level: TechnicalLevel::default(),
            background_info: None,
            key_concepts: Vec::new(),
            objectives: vec![objective.into()],
            key_questions: Vec::new(),
            scope: ScopeConstraints::default(),
            sources: SourcePreferences::default(),
            style: StyleRequirements::default(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn from_json(json: &str) -> Result<Self, AutonoError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: &Path) -> Result<Self, AutonoError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn main_purpose(&self) -> &str {
        self.objectives.first().map(String::as_str).unwrap_or("")
    }

    pub fn validate(&self) -> Result<(), AutonoError> {
        if self.domain.trim().is_empty() {
            return Err(AutonoError::InvalidInput("domain is required".into()));
        }
        if self.main_purpose().trim().is_empty() {
            return Err(AutonoError::InvalidInput(
                "at least one objective (the main purpose) is required".into(),
            ));
        }
        if !(1..=5).contains(&self.scope.depth_level) {
            return Err(AutonoError::InvalidInput(format!(
                "depth_level must be between 1 and 5, got {}",
                self.scope.depth_level
            )));
        }
        if self.sources.required_citations && self.sources.preferred_sources.is_empty() {
            return Err(AutonoError::InvalidInput(
                "preferred_sources are required when citations are required".into(),
            ));
        }
        Ok(())
    }

    /// One-line topic used for titles, prompts and reports.
    pub fn topic(&self) -> String {
        format!(
            "{} for {} ({}): {}",
            self.domain.trim(),
            self.audience.trim(),
            self.technical_level.as_str(),
            self.main_purpose().trim()
        )
    }
}
