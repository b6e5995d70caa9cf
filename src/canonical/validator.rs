//! Acceptance checks for classifier-proposed canonical mappings.
//!
//! The classifier is untrusted: it may rename values, invent new ones, drop
//! some, or assign one value to two labels. A mapping is accepted only when
//! its aliases form an exact partition of the source values. Checks run in a
//! fixed order and stop at the first failure:
//!
//! 1. envelope shape (object, no unknown top-level fields)
//! 2. labels (non-empty, length-capped, unique after trimming)
//! 3. alias lists (non-empty arrays of strings/numbers that sanitize)
//! 4. no alias claimed twice
//! 5. no alias outside the source set
//! 6. every source value claimed
//! 7. `notes` / `uncertainties`

use indexmap::IndexMap;
use serde_json::Value;
use std::collections::HashSet;

use super::error::CanonicalizationError;
use super::limits::CanonLimits;
use super::output::{Members, ModelOutput, Node};
use super::{CanonicalMapping, CanonicalizationResult};
use crate::sanitize::{SourceValues, ValueSanitizer};

pub const MAPPING_FIELD: &str = "canonicalToAliases";
pub const NOTES_FIELD: &str = "notes";
pub const UNCERTAINTIES_FIELD: &str = "uncertainties";

const ALLOWED_FIELDS: [&str; 3] = [MAPPING_FIELD, NOTES_FIELD, UNCERTAINTIES_FIELD];

/// Optional fields that accompany a mapping. `None` and JSON `null` are both
/// treated as absent.
#[derive(Debug, Clone, Copy, Default)]
pub struct Auxiliary<'a> {
    pub notes: Option<&'a Value>,
    pub uncertainties: Option<&'a Value>,
}

pub type ValidationOutcome = Result<CanonicalizationResult, CanonicalizationError>;

#[derive(Debug, Clone, Default)]
pub struct CanonicalizationValidator {
    limits: CanonLimits,
    sanitizer: ValueSanitizer,
}

impl CanonicalizationValidator {
    pub fn new(limits: CanonLimits) -> Self {
        Self {
            limits,
            sanitizer: ValueSanitizer::new(limits.max_value_len),
        }
    }

    pub fn limits(&self) -> &CanonLimits {
        &self.limits
    }

    pub fn sanitizer(&self) -> &ValueSanitizer {
        &self.sanitizer
    }

    /// Validate a full classifier answer:
    /// `{"canonicalToAliases": {...}, "notes"?: "...", "uncertainties"?: [...]}`.
    pub fn validate_output(&self, output: &Value, source: &SourceValues) -> ValidationOutcome {
        self.validate_model_output(&ModelOutput::from(output), source)
    }

    /// Same as [`Self::validate_output`], for an answer parsed from text with
    /// repeated keys still present.
    pub fn validate_model_output(
        &self,
        output: &ModelOutput,
        source: &SourceValues,
    ) -> ValidationOutcome {
        let object = match output {
            ModelOutput::Object(object) => object,
            ModelOutput::Other(other) => {
                return Err(CanonicalizationError::malformed(format!(
                    "expected a JSON object, got {}",
                    json_type(other)
                )));
            }
        };
        if let Some(unknown) = object.keys().find(|key| !ALLOWED_FIELDS.contains(key)) {
            return Err(CanonicalizationError::malformed(format!(
                "unexpected top-level field {unknown:?}"
            )));
        }
        let mut seen = HashSet::with_capacity(object.len());
        if let Some(repeated) = object.keys().find(|key| !seen.insert(*key)) {
            return Err(CanonicalizationError::malformed(format!(
                "top-level field {repeated:?} appears more than once"
            )));
        }
        let Some(mapping) = object.get(MAPPING_FIELD) else {
            return Err(CanonicalizationError::malformed(format!(
                "missing required field {MAPPING_FIELD:?}"
            )));
        };
        let notes = object.get(NOTES_FIELD).map(Node::to_value);
        let uncertainties = object.get(UNCERTAINTIES_FIELD).map(Node::to_value);
        let auxiliary = Auxiliary {
            notes: notes.as_ref(),
            uncertainties: uncertainties.as_ref(),
        };
        match mapping {
            Node::Object(entries) => self.validate_members(entries, source, auxiliary),
            Node::Other(other) => Err(not_an_object(other)),
        }
    }

    /// Validate a label → aliases mapping against `source`.
    pub fn validate(
        &self,
        mapping: &Value,
        source: &SourceValues,
        auxiliary: Auxiliary<'_>,
    ) -> ValidationOutcome {
        let Some(entries) = mapping.as_object() else {
            return Err(not_an_object(mapping));
        };
        self.validate_members(&Members::from(entries), source, auxiliary)
    }

    fn validate_members(
        &self,
        entries: &Members<Value>,
        source: &SourceValues,
        auxiliary: Auxiliary<'_>,
    ) -> ValidationOutcome {
        let labels = self.check_labels(entries)?;

        let mut coverage: IndexMap<String, &str> = IndexMap::with_capacity(source.len());
        let mut normalized: IndexMap<String, Vec<String>> = IndexMap::with_capacity(labels.len());

        for (label, aliases) in labels.iter().zip(entries.values()) {
            let Some(aliases) = aliases.as_array() else {
                return Err(CanonicalizationError::alias(
                    label,
                    format!("alias list must be an array, got {}", json_type(aliases)),
                ));
            };
            if aliases.is_empty() {
                return Err(CanonicalizationError::alias(label, "alias list is empty"));
            }

            let mut clean_aliases = Vec::with_capacity(aliases.len());
            for alias in aliases {
                if !(alias.is_string() || alias.is_number()) {
                    return Err(CanonicalizationError::alias(
                        label,
                        format!("alias must be a string or number, got {}", json_type(alias)),
                    ));
                }
                let Some(clean) = self.sanitizer.sanitize_json(alias) else {
                    return Err(CanonicalizationError::alias(
                        label,
                        format!("alias {alias} is empty after normalization"),
                    ));
                };
                if let Some(first) = coverage.get(clean.as_str()) {
                    return Err(CanonicalizationError::DuplicateAlias {
                        alias: clean,
                        first: (*first).to_string(),
                        second: label.clone(),
                    });
                }
                if !source.contains(&clean) {
                    return Err(CanonicalizationError::ExtraneousAlias {
                        alias: clean,
                        label: label.clone(),
                    });
                }
                coverage.insert(clean.clone(), label.as_str());
                clean_aliases.push(clean);
            }
            normalized.insert(label.clone(), clean_aliases);
        }

        if coverage.len() != source.len() {
            let missing = source
                .iter()
                .filter(|value| !coverage.contains_key(*value))
                .map(str::to_string)
                .collect();
            return Err(CanonicalizationError::MissingCoverage {
                missing,
                expected: source.len(),
            });
        }

        let notes = self.check_notes(auxiliary.notes)?;
        let uncertainties = self.check_uncertainties(auxiliary.uncertainties)?;

        Ok(CanonicalizationResult {
            canonical_to_aliases: CanonicalMapping::from_entries(normalized),
            notes,
            uncertainties,
        })
    }

    /// Trimmed labels in mapping order.
    fn check_labels(&self, entries: &Members<Value>) -> Result<Vec<String>, CanonicalizationError> {
        let mut seen = HashSet::with_capacity(entries.len());
        let mut labels = Vec::with_capacity(entries.len());
        for raw in entries.keys() {
            let label = raw.trim();
            if label.is_empty() {
                return Err(CanonicalizationError::label(raw, "label is empty"));
            }
            let len = label.chars().count();
            if len > self.limits.max_label_len {
                return Err(CanonicalizationError::label(
                    label,
                    format!(
                        "label exceeds {} characters (got {len})",
                        self.limits.max_label_len
                    ),
                ));
            }
            if !seen.insert(label) {
                return Err(CanonicalizationError::label(label, "label is duplicated"));
            }
            labels.push(label.to_string());
        }
        Ok(labels)
    }

    fn check_notes(&self, notes: Option<&Value>) -> Result<Option<String>, CanonicalizationError> {
        match notes {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(text)) => {
                let len = text.chars().count();
                if len > self.limits.max_notes_len {
                    return Err(CanonicalizationError::auxiliary(
                        NOTES_FIELD,
                        format!("exceeds {} characters (got {len})", self.limits.max_notes_len),
                    ));
                }
                let trimmed = text.trim();
                Ok((!trimmed.is_empty()).then(|| trimmed.to_string()))
            }
            Some(other) => Err(CanonicalizationError::auxiliary(
                NOTES_FIELD,
                format!("must be a string, got {}", json_type(other)),
            )),
        }
    }

    fn check_uncertainties(
        &self,
        uncertainties: Option<&Value>,
    ) -> Result<Option<Vec<String>>, CanonicalizationError> {
        let items = match uncertainties {
            None | Some(Value::Null) => return Ok(None),
            Some(Value::Array(items)) => items,
            Some(other) => {
                return Err(CanonicalizationError::auxiliary(
                    UNCERTAINTIES_FIELD,
                    format!("must be an array, got {}", json_type(other)),
                ));
            }
        };
        if items.len() > self.limits.max_uncertainties {
            return Err(CanonicalizationError::auxiliary(
                UNCERTAINTIES_FIELD,
                format!(
                    "has {} entries, limit is {}",
                    items.len(),
                    self.limits.max_uncertainties
                ),
            ));
        }
        let mut clean = Vec::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
            let Some(text) = item.as_str() else {
                return Err(CanonicalizationError::auxiliary(
                    UNCERTAINTIES_FIELD,
                    format!("entry {index} must be a string, got {}", json_type(item)),
                ));
            };
            let text = text.trim();
            if text.is_empty() {
                return Err(CanonicalizationError::auxiliary(
                    UNCERTAINTIES_FIELD,
                    format!("entry {index} is empty"),
                ));
            }
            let len = text.chars().count();
            if len > self.limits.max_uncertainty_len {
                return Err(CanonicalizationError::auxiliary(
                    UNCERTAINTIES_FIELD,
                    format!(
                        "entry {index} exceeds {} characters (got {len})",
                        self.limits.max_uncertainty_len
                    ),
                ));
            }
            clean.push(text.to_string());
        }
        Ok(Some(clean))
    }
}

fn not_an_object(mapping: &Value) -> CanonicalizationError {
    CanonicalizationError::malformed(format!(
        "{MAPPING_FIELD} must be an object, got {}",
        json_type(mapping)
    ))
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
