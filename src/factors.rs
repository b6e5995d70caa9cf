//! Effective factor values per experiment.
//!
//! Extracted values come from the metadata extraction step; overrides come
//! from the user. An override always wins, including an explicit
//! `{"value": null}` which pins the factor to unknown.

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::ids::ExperimentId;
use crate::sanitize::{RawValue, format_number};

pub const CATALYST: &str = "catalyst";
pub const ADDITIVE: &str = "additive";
pub const SUBSTRATE: &str = "substrate";
pub const TEMPERATURE: &str = "temperature";

/// Factors the recipe catalogue knows about, in display order.
pub const CATALOGUE_FACTORS: [&str; 4] = [CATALYST, ADDITIVE, SUBSTRATE, TEMPERATURE];

/// A non-null factor value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FactorScalar {
    Number(f64),
    Text(String),
}

impl FactorScalar {
    /// String form used in signatures and group names.
    pub fn as_key(&self) -> String {
        match self {
            FactorScalar::Number(n) => format_number(*n).unwrap_or_else(|| n.to_string()),
            FactorScalar::Text(text) => text.clone(),
        }
    }
}

impl From<&str> for FactorScalar {
    fn from(text: &str) -> Self {
        FactorScalar::Text(text.to_string())
    }
}

impl From<String> for FactorScalar {
    fn from(text: String) -> Self {
        FactorScalar::Text(text)
    }
}

impl From<f64> for FactorScalar {
    fn from(n: f64) -> Self {
        FactorScalar::Number(n)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    #[default]
    Medium,
    High,
}

/// Where in the source metadata a factor value was found.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    pub column: String,
    pub snippet: String,
}

/// One machine-extracted factor for one experiment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactorValue {
    pub name: String,
    #[serde(default)]
    pub value: Option<FactorScalar>,
    #[serde(default)]
    pub confidence: Confidence,
    #[serde(default)]
    pub provenance: Vec<Provenance>,
}

impl FactorValue {
    pub fn new(name: impl Into<String>, value: Option<FactorScalar>) -> Self {
        Self {
            name: name.into(),
            value,
            confidence: Confidence::default(),
            provenance: Vec::new(),
        }
    }
}

/// A user-supplied replacement for one (experiment, factor) cell.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FactorOverride {
    #[serde(default)]
    pub value: Option<FactorScalar>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl FactorOverride {
    pub fn value(value: impl Into<FactorScalar>) -> Self {
        Self {
            value: Some(value.into()),
            note: None,
        }
    }

    /// Override that pins the factor to unknown.
    pub fn unknown() -> Self {
        Self::default()
    }
}

/// experimentId → factorName → override.
pub type OverrideMap = HashMap<ExperimentId, HashMap<String, FactorOverride>>;

/// experimentId → extracted factors.
pub type ExtractedFactors = HashMap<ExperimentId, Vec<FactorValue>>;

/// An imported experiment. Metadata is carried through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Experiment {
    pub experiment_id: ExperimentId,
    #[serde(default)]
    pub metadata: IndexMap<String, RawValue>,
}

/// Effective value of `factor_name` for `experiment_id`.
pub fn resolve(
    experiment_id: &str,
    factor_name: &str,
    overrides: &OverrideMap,
    extracted: &[FactorValue],
) -> Option<FactorScalar> {
    if let Some(factor_override) = overrides
        .get(experiment_id)
        .and_then(|by_factor| by_factor.get(factor_name))
    {
        return factor_override.value.clone();
    }
    extracted
        .iter()
        .find(|factor| factor.name == factor_name)
        .and_then(|factor| factor.value.clone())
}

/// Resolved values for every (experiment, factor) pair, computed once.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedFactors {
    factor_names: Vec<String>,
    rows: IndexMap<ExperimentId, BTreeMap<String, FactorScalar>>,
}

impl ResolvedFactors {
    pub fn build(
        experiments: &[ExperimentId],
        extracted: &ExtractedFactors,
        overrides: &OverrideMap,
        factor_names: &[String],
    ) -> Self {
        let empty = Vec::new();
        let mut rows = IndexMap::with_capacity(experiments.len());
        for experiment in experiments {
            if rows.contains_key(experiment) {
                continue;
            }
            let factors = extracted.get(experiment).unwrap_or(&empty);
            // First match wins, as in `resolve`.
            let mut by_name: HashMap<&str, &FactorValue> = HashMap::with_capacity(factors.len());
            for factor in factors {
                by_name.entry(factor.name.as_str()).or_insert(factor);
            }
            let experiment_overrides = overrides.get(experiment);

            let mut row = BTreeMap::new();
            for name in factor_names {
                let value = match experiment_overrides.and_then(|o| o.get(name)) {
                    Some(factor_override) => factor_override.value.clone(),
                    None => by_name.get(name.as_str()).and_then(|f| f.value.clone()),
                };
                if let Some(value) = value {
                    row.insert(name.clone(), value);
                }
            }
            rows.insert(experiment.clone(), row);
        }
        tracing::debug!(
            experiments = rows.len(),
            factors = factor_names.len(),
            "resolved factor table"
        );
        Self {
            factor_names: factor_names.to_vec(),
            rows,
        }
    }

    /// Catalogue factors first, then any other name seen in `extracted` or
    /// `overrides`, in first-seen order.
    pub fn factor_names_from(
        experiments: &[ExperimentId],
        extracted: &ExtractedFactors,
        overrides: &OverrideMap,
    ) -> Vec<String> {
        let mut names: IndexSet<String> =
            CATALOGUE_FACTORS.iter().map(|name| name.to_string()).collect();
        for experiment in experiments {
            if let Some(factors) = extracted.get(experiment) {
                names.extend(factors.iter().map(|f| f.name.clone()));
            }
            if let Some(by_factor) = overrides.get(experiment) {
                let mut extra: Vec<&String> = by_factor.keys().collect();
                extra.sort();
                names.extend(extra.into_iter().cloned());
            }
        }
        names.into_iter().collect()
    }

    pub fn get(&self, experiment: &str, factor: &str) -> Option<&FactorScalar> {
        self.rows.get(experiment).and_then(|row| row.get(factor))
    }

    pub fn experiments(&self) -> impl Iterator<Item = &ExperimentId> {
        self.rows.keys()
    }

    pub fn factor_names(&self) -> &[String] {
        &self.factor_names
    }

    /// Factors with a non-null value for at least one experiment.
    pub fn available_factor_names(&self) -> Vec<String> {
        self.factor_names
            .iter()
            .filter(|name| self.rows.values().any(|row| row.contains_key(name.as_str())))
            .cloned()
            .collect()
    }
}
