//! Identifier newtypes for experiments and groups.
//!
//! Experiment IDs come from the imported dataset and group IDs are minted by
//! the recipe generator or the manual editor. Keeping them as distinct types
//! stops a group ID from being passed where an experiment ID is expected.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

/// Stable identifier of one imported experiment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExperimentId(String);

impl ExperimentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True when the ID is empty or whitespace-only.
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

/// Identifier of a group inside one partition.
///
/// Generated IDs are deterministic: `group-<recipe>-<ordinal>` for recipe
/// output and `manual-<n>` for groups created by the editor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupId(String);

impl GroupId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// ID for the `ordinal`-th group (1-based) emitted by a recipe.
    pub fn for_recipe(recipe_id: &str, ordinal: usize) -> Self {
        Self(format!("group-{recipe_id}-{ordinal}"))
    }

    pub fn manual(counter: usize) -> Self {
        Self(format!("manual-{counter}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

macro_rules! string_id_impls {
    ($ty:ident) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $ty {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }

        impl From<String> for $ty {
            fn from(id: String) -> Self {
                Self(id)
            }
        }

        impl AsRef<str> for $ty {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl Borrow<str> for $ty {
            fn borrow(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id_impls!(ExperimentId);
string_id_impls!(GroupId);
