use serde::Serialize;
use strum::{AsRefStr, Display, EnumIter};
use thiserror::Error;

/// Category of a rejected classifier answer.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display, AsRefStr, EnumIter,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum FailureReason {
    MalformedShape,
    EmptyOrDuplicateLabel,
    InvalidAlias,
    DuplicateAlias,
    ExtraneousAlias,
    MissingCoverage,
    InvalidAuxiliaryField,
}

/// Why a proposed canonical mapping was rejected.
///
/// Rejection is all-or-nothing: no part of a rejected mapping is ever applied.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CanonicalizationError {
    #[error("malformed output: {detail}")]
    MalformedShape { detail: String },

    #[error("invalid canonical label {label:?}: {detail}")]
    EmptyOrDuplicateLabel { label: String, detail: String },

    #[error("invalid alias under {label:?}: {detail}")]
    InvalidAlias { label: String, detail: String },

    #[error("alias {alias:?} claimed by both {first:?} and {second:?}")]
    DuplicateAlias {
        alias: String,
        first: String,
        second: String,
    },

    #[error("alias {alias:?} under {label:?} is not one of the input values")]
    ExtraneousAlias { alias: String, label: String },

    #[error("{} of {expected} input values not assigned to any label: {}", .missing.len(), .missing.join(", "))]
    MissingCoverage {
        missing: Vec<String>,
        expected: usize,
    },

    #[error("invalid {field}: {detail}")]
    InvalidAuxiliaryField { field: &'static str, detail: String },
}

impl CanonicalizationError {
    pub fn reason(&self) -> FailureReason {
        match self {
            Self::MalformedShape { .. } => FailureReason::MalformedShape,
            Self::EmptyOrDuplicateLabel { .. } => FailureReason::EmptyOrDuplicateLabel,
            Self::InvalidAlias { .. } => FailureReason::InvalidAlias,
            Self::DuplicateAlias { .. } => FailureReason::DuplicateAlias,
            Self::ExtraneousAlias { .. } => FailureReason::ExtraneousAlias,
            Self::MissingCoverage { .. } => FailureReason::MissingCoverage,
            Self::InvalidAuxiliaryField { .. } => FailureReason::InvalidAuxiliaryField,
        }
    }

    pub(crate) fn malformed(detail: impl Into<String>) -> Self {
        Self::MalformedShape {
            detail: detail.into(),
        }
    }

    pub(crate) fn label(label: &str, detail: impl Into<String>) -> Self {
        Self::EmptyOrDuplicateLabel {
            label: label.to_string(),
            detail: detail.into(),
        }
    }

    pub(crate) fn alias(label: &str, detail: impl Into<String>) -> Self {
        Self::InvalidAlias {
            label: label.to_string(),
            detail: detail.into(),
        }
    }

    pub(crate) fn auxiliary(field: &'static str, detail: impl Into<String>) -> Self {
        Self::InvalidAuxiliaryField {
            field,
            detail: detail.into(),
        }
    }
}
