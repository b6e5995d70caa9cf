use serde::Serialize;

use crate::canonical::validator::{MAPPING_FIELD, NOTES_FIELD, UNCERTAINTIES_FIELD};
use crate::sanitize::SourceValues;

/// System/user prompt pair sent to the classifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassificationPrompt {
    pub system: String,
    pub user: String,
}

impl ClassificationPrompt {
    pub fn build(column_name: &str, values: &SourceValues) -> Self {
        let system = format!(
            "You normalize laboratory experiment metadata. Group the given values into \
             canonical categories. Respond with a single JSON object with the field \
             \"{MAPPING_FIELD}\" mapping each canonical label to the list of input values it \
             covers, and optionally \"{NOTES_FIELD}\" (string) and \"{UNCERTAINTIES_FIELD}\" \
             (list of strings). Every input value must appear exactly once, spelled exactly \
             as given. Do not add values that were not provided."
        );
        let listed = serde_json::to_string(&values.iter().collect::<Vec<_>>())
            .unwrap_or_else(|_| "[]".to_string());
        let user = format!(
            "Column: {column_name}\nDistinct values ({count}):\n{listed}",
            count = values.len()
        );
        Self { system, user }
    }
}
