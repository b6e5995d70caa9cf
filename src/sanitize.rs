//! Normalization of raw metadata cells into comparable strings.
//!
//! Every comparison between a classifier answer and the original column goes
//! through [`ValueSanitizer`], so two raw values are "the same" exactly when
//! their sanitized strings are equal (case-sensitive).

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Default cap on the length of a sanitized value, in characters.
pub const DEFAULT_MAX_VALUE_LEN: usize = 120;

/// One metadata cell as it arrives from the dataset or the request body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    Number(f64),
    Text(String),
    Null,
    /// Booleans, arrays and objects. Never sanitized into a value.
    Other(Value),
}

impl From<&Value> for RawValue {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => RawValue::Null,
            Value::String(text) => RawValue::Text(text.clone()),
            Value::Number(number) => match number.as_f64() {
                Some(n) => RawValue::Number(n),
                None => RawValue::Other(value.clone()),
            },
            other => RawValue::Other(other.clone()),
        }
    }
}

impl From<&str> for RawValue {
    fn from(text: &str) -> Self {
        RawValue::Text(text.to_string())
    }
}

impl From<f64> for RawValue {
    fn from(n: f64) -> Self {
        RawValue::Number(n)
    }
}

/// Canonical decimal form of a finite number, `None` for NaN and infinities.
///
/// Integral values print without a fractional part and negative zero prints
/// as `0`, so `25`, `25.0` and `-0.0` sanitize to `"25"`, `"25"` and `"0"`.
pub fn format_number(n: f64) -> Option<String> {
    if !n.is_finite() {
        return None;
    }
    if n == 0.0 {
        return Some("0".to_string());
    }
    Some(format!("{n}"))
}

/// Trims, rejects empties, and truncates raw values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValueSanitizer {
    max_len: usize,
}

impl Default for ValueSanitizer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_VALUE_LEN)
    }
}

impl ValueSanitizer {
    pub fn new(max_len: usize) -> Self {
        Self {
            max_len: max_len.max(1),
        }
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }

    pub fn sanitize(&self, raw: &RawValue) -> Option<String> {
        match raw {
            RawValue::Number(n) => format_number(*n).and_then(|s| self.sanitize_str(&s)),
            RawValue::Text(text) => self.sanitize_str(text),
            RawValue::Null | RawValue::Other(_) => None,
        }
    }

    /// Same as [`sanitize`](Self::sanitize) for an untyped JSON value.
    pub fn sanitize_json(&self, value: &Value) -> Option<String> {
        self.sanitize(&RawValue::from(value))
    }

    pub fn sanitize_str(&self, text: &str) -> Option<String> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return None;
        }
        if trimmed.chars().count() <= self.max_len {
            return Some(trimmed.to_string());
        }
        // Re-trim after the cut so a second pass is a no-op.
        let truncated: String = trimmed.chars().take(self.max_len).collect();
        Some(truncated.trim_end().to_string())
    }
}

/// Sanitize with the default length cap.
pub fn sanitize(raw: &RawValue) -> Option<String> {
    ValueSanitizer::default().sanitize(raw)
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SourceValuesError {
    #[error("values must contain at least one non-empty string or finite number")]
    Empty,
    #[error("too many distinct values: {count} exceeds the limit of {max}")]
    TooMany { count: usize, max: usize },
}

/// Distinct sanitized values of one column, in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceValues {
    values: IndexSet<String>,
}

impl SourceValues {
    /// Sanitize `raw`, drop nulls and duplicates, and enforce `max_values`.
    pub fn from_raw(
        raw: &[RawValue],
        sanitizer: &ValueSanitizer,
        max_values: usize,
    ) -> Result<Self, SourceValuesError> {
        let mut values = IndexSet::new();
        let mut dropped = 0usize;
        for value in raw {
            match sanitizer.sanitize(value) {
                Some(clean) => {
                    values.insert(clean);
                }
                None => dropped += 1,
            }
        }
        if dropped > 0 {
            tracing::debug!(dropped, kept = values.len(), "dropped unusable raw values");
        }
        if values.is_empty() {
            return Err(SourceValuesError::Empty);
        }
        if values.len() > max_values {
            return Err(SourceValuesError::TooMany {
                count: values.len(),
                max: max_values,
            });
        }
        Ok(Self { values })
    }

    /// Build directly from already-sanitized strings.
    pub fn from_sanitized<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn contains(&self, value: &str) -> bool {
        self.values.contains(value)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.values.iter().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn numbers_use_canonical_decimal_form() {
        assert_eq!(sanitize(&RawValue::Number(25.0)), Some("25".to_string()));
        assert_eq!(sanitize(&RawValue::Number(0.5)), Some("0.5".to_string()));
        assert_eq!(sanitize(&RawValue::Number(-0.0)), Some("0".to_string()));
        assert_eq!(sanitize(&RawValue::Number(-12.25)), Some("-12.25".to_string()));
    }

    #[test]
    fn non_finite_numbers_are_dropped() {
        assert_eq!(sanitize(&RawValue::Number(f64::NAN)), None);
        assert_eq!(sanitize(&RawValue::Number(f64::INFINITY)), None);
    }

    #[test]
    fn strings_are_trimmed_and_empties_dropped() {
        assert_eq!(sanitize(&"  Pd/C \n".into()), Some("Pd/C".to_string()));
        assert_eq!(sanitize(&"   ".into()), None);
        assert_eq!(sanitize(&"".into()), None);
    }

    #[test]
    fn null_and_other_types_are_dropped() {
        assert_eq!(sanitize(&RawValue::Null), None);
        assert_eq!(sanitize(&RawValue::from(&json!(true))), None);
        assert_eq!(sanitize(&RawValue::from(&json!(["a"]))), None);
    }

    #[test]
    fn truncation_counts_characters_and_retrims() {
        let sanitizer = ValueSanitizer::new(5);
        assert_eq!(sanitizer.sanitize_str("abcdefgh"), Some("abcde".to_string()));
        assert_eq!(sanitizer.sanitize_str("ab   cdef"), Some("ab".to_string()));
        assert_eq!(sanitizer.sanitize_str("°C°C°C°C"), Some("°C°C°".to_string()));
    }

    #[test]
    fn raw_value_deserializes_untagged() {
        let values: Vec<RawValue> = serde_json::from_value(json!(["a", 1.5, null, false])).unwrap();
        assert_eq!(values[0], RawValue::Text("a".into()));
        assert_eq!(values[1], RawValue::Number(1.5));
        assert_eq!(values[2], RawValue::Null);
        assert!(matches!(values[3], RawValue::Other(_)));
    }

    #[test]
    fn source_values_dedupe_in_first_seen_order() {
        let raw: Vec<RawValue> = vec!["b".into(), " a".into(), "b ".into(), RawValue::Null, 3.0.into()];
        let source = SourceValues::from_raw(&raw, &ValueSanitizer::default(), 10).unwrap();
        assert_eq!(source.iter().collect::<Vec<_>>(), vec!["b", "a", "3"]);
    }

    #[test]
    fn source_values_enforce_limits() {
        let raw: Vec<RawValue> = vec![RawValue::Null, " ".into()];
        assert_eq!(
            SourceValues::from_raw(&raw, &ValueSanitizer::default(), 10),
            Err(SourceValuesError::Empty)
        );
        let raw: Vec<RawValue> = vec!["a".into(), "b".into(), "c".into()];
        assert_eq!(
            SourceValues::from_raw(&raw, &ValueSanitizer::default(), 2),
            Err(SourceValuesError::TooMany { count: 3, max: 2 })
        );
    }
}
