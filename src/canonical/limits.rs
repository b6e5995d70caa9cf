//! Size limits applied to columns and classifier answers.

use serde::{Deserialize, Serialize};

use crate::sanitize::DEFAULT_MAX_VALUE_LEN;

/// Maximum distinct values accepted from one column.
pub const DEFAULT_MAX_VALUES: usize = 500;

/// Maximum length of a canonical label, in characters.
pub const DEFAULT_MAX_LABEL_LEN: usize = 120;

/// Maximum length of the free-text `notes` field.
pub const DEFAULT_MAX_NOTES_LEN: usize = 2_000;

/// Maximum number of entries in `uncertainties`.
pub const DEFAULT_MAX_UNCERTAINTIES: usize = 50;

/// Maximum length of one `uncertainties` entry.
pub const DEFAULT_MAX_UNCERTAINTY_LEN: usize = 300;

/// Limits shared by source-value construction and answer validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CanonLimits {
    pub max_values: usize,
    pub max_value_len: usize,
    pub max_label_len: usize,
    pub max_notes_len: usize,
    pub max_uncertainties: usize,
    pub max_uncertainty_len: usize,
}

impl Default for CanonLimits {
    fn default() -> Self {
        Self {
            max_values: DEFAULT_MAX_VALUES,
            max_value_len: DEFAULT_MAX_VALUE_LEN,
            max_label_len: DEFAULT_MAX_LABEL_LEN,
            max_notes_len: DEFAULT_MAX_NOTES_LEN,
            max_uncertainties: DEFAULT_MAX_UNCERTAINTIES,
            max_uncertainty_len: DEFAULT_MAX_UNCERTAINTY_LEN,
        }
    }
}

impl CanonLimits {
    /// Every limit must be at least 1.
    pub fn validate(&self) -> anyhow::Result<()> {
        let fields = [
            ("max_values", self.max_values),
            ("max_value_len", self.max_value_len),
            ("max_label_len", self.max_label_len),
            ("max_notes_len", self.max_notes_len),
            ("max_uncertainties", self.max_uncertainties),
            ("max_uncertainty_len", self.max_uncertainty_len),
        ];
        for (name, value) in fields {
            anyhow::ensure!(value >= 1, "{name} must be at least 1 (got {value})");
        }
        Ok(())
    }
}
