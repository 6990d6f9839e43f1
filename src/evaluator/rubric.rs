// src/evaluator/rubric.rs — Weighted scoring rubric

use serde::{Deserialize, Serialize};

use crate::infra::config::RubricConfig;
use crate::infra::errors::AutonoError;

const WEIGHT_TOLERANCE: f32 = 1e-3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Criterion {
    pub name: String,
    pub weight: f32,
}

/// Ordered criteria whose weights sum to 1.0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rubric {
    criteria: Vec<Criterion>,
}

impl Rubric {
    pub fn new(criteria: Vec<Criterion>) -> Result<Self, AutonoError> {
        let rubric = Self { criteria };
        rubric.validate()?;
        Ok(rubric)
    }

    pub fn criteria(&self) -> &[Criterion] {
        &self.criteria
    }

    pub fn validate(&self) -> Result<(), AutonoError> {
        if self.criteria.is_empty() {
            return Err(AutonoError::Config("rubric has no criteria".into()));
        }
        for (i, c) in self.criteria.iter().enumerate() {
            if normalize_name(&c.name).is_empty() {
                return Err(AutonoError::Config(format!("rubric criterion {i} has no name")));
            }
            if !(0.0..=1.0).contains(&c.weight) {
                return Err(AutonoError::Config(format!(
                    "weight for '{}' must be in [0, 1], got {}",
                    c.name, c.weight
                )));
            }
            if self.criteria[..i]
                .iter()
                .any(|prev| normalize_name(&prev.name) == normalize_name(&c.name))
            {
                return Err(AutonoError::Config(format!(
                    "duplicate rubric criterion '{}'",
                    c.name
                )));
            }
        }
        let total: f32 = self.criteria.iter().map(|c| c.weight).sum();
        if (total - 1.0).abs() > WEIGHT_TOLERANCE {
            return Err(AutonoError::Config(format!(
                "rubric weights must sum to 1.0, got {total:.3}"
            )));
        }
        Ok(())
    }

    /// Index of the criterion a critic-written label refers to.
    ///
    /// Matching ignores case, spacing and punctuation, and accepts labels that
    /// extend the name ("Structure and organization" matches `structure`).
    pub fn position(&self, label: &str) -> Option<usize> {
        let label = normalize_name(label);
        if label.is_empty() {
            return None;
        }
        self.criteria
            .iter()
            .position(|c| normalize_name(&c.name) == label)
            .or_else(|| {
                self.criteria
                    .iter()
                    .position(|c| label.starts_with(&normalize_name(&c.name)))
            })
    }
}

impl Default for Rubric {
    fn default() -> Self {
        Self::from(&RubricConfig::default())
    }
}

/// Unvalidated conversion; `RunConfig::validate` checks the result.
impl From<&RubricConfig> for Rubric {
    fn from(config: &RubricConfig) -> Self {
        Self {
            criteria: config
                .criteria
                .iter()
                .map(|c| Criterion {
                    name: c.name.clone(),
                    weight: c.weight,
                })
                .collect(),
        }
    }
}

pub(crate) fn normalize_name(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}
