//! Canonical label mappings and their validation.

pub mod error;
pub mod limits;
pub mod output;
pub mod validator;

pub use error::{CanonicalizationError, FailureReason};
pub use limits::CanonLimits;
pub use output::{Members, ModelOutput, Node};
pub use validator::{Auxiliary, CanonicalizationValidator, ValidationOutcome};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Canonical label → aliases, in the order the classifier proposed them.
///
/// Only produced by [`CanonicalizationValidator`], so every alias appears
/// under exactly one label and the aliases cover the source values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CanonicalMapping(IndexMap<String, Vec<String>>);

impl CanonicalMapping {
    pub(crate) fn from_entries(entries: IndexMap<String, Vec<String>>) -> Self {
        Self(entries)
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn aliases(&self, label: &str) -> Option<&[String]> {
        self.0.get(label).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.0.iter().map(|(label, aliases)| (label.as_str(), aliases.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Total number of aliases, equal to the source value count.
    pub fn alias_count(&self) -> usize {
        self.0.values().map(Vec::len).sum()
    }

    pub fn canonical_for(&self, alias: &str) -> Option<&str> {
        self.iter()
            .find(|(_, aliases)| aliases.iter().any(|a| a == alias))
            .map(|(label, _)| label)
    }

    /// Inverted index used to relabel raw values.
    pub fn alias_index(&self) -> HashMap<&str, &str> {
        self.iter()
            .flat_map(|(label, aliases)| aliases.iter().map(move |alias| (alias.as_str(), label)))
            .collect()
    }
}

/// An accepted classifier answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalizationResult {
    pub canonical_to_aliases: CanonicalMapping,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uncertainties: Option<Vec<String>>,
}
