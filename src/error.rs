//! Request-level error taxonomy.
//!
//! Every failure a caller can see maps onto one [`ErrorKind`], which fixes the
//! HTTP status, metric label and retry hint. Domain errors from the validator,
//! classifier and editor convert into [`ServiceError`] with `?`.

use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::fmt;
use thiserror::Error;

use crate::canonical::CanonicalizationError;
use crate::classifier::ClassifierError;
use crate::editor::EditError;
use crate::sanitize::SourceValuesError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    /// Caller input is undecodable or has the wrong shape.
    InvalidRequest,
    /// Known route, wrong HTTP method.
    MethodNotAllowed,
    /// The classifier answered but the answer failed validation.
    InvalidModelOutput,
    /// The classifier call itself failed.
    UpstreamUnavailable,
    /// Required credential or setting is absent.
    ConfigMissing,
    /// A strict-mode edit was refused.
    EditRejected,
}

impl ErrorKind {
    /// Stable kebab-case code used in responses and metrics.
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::InvalidRequest => "invalid-request",
            ErrorKind::MethodNotAllowed => "method-not-allowed",
            ErrorKind::InvalidModelOutput => "invalid-model-output",
            ErrorKind::UpstreamUnavailable => "upstream-unavailable",
            ErrorKind::ConfigMissing => "config-missing",
            ErrorKind::EditRejected => "edit-rejected",
        }
    }

    pub fn category(&self) -> &'static str {
        match self {
            ErrorKind::InvalidRequest | ErrorKind::MethodNotAllowed | ErrorKind::EditRejected => {
                "client_error"
            }
            ErrorKind::InvalidModelOutput | ErrorKind::UpstreamUnavailable => "upstream_error",
            ErrorKind::ConfigMissing => "server_error",
        }
    }

    /// Whether re-issuing the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorKind::InvalidModelOutput | ErrorKind::UpstreamUnavailable
        )
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorKind::InvalidRequest => StatusCode::BAD_REQUEST,
            ErrorKind::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ErrorKind::InvalidModelOutput | ErrorKind::UpstreamUnavailable => {
                StatusCode::BAD_GATEWAY
            }
            ErrorKind::ConfigMissing => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorKind::EditRejected => StatusCode::UNPROCESSABLE_ENTITY,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("method not allowed")]
    MethodNotAllowed,

    #[error("model output rejected: {0}")]
    InvalidModelOutput(#[from] CanonicalizationError),

    #[error("classifier unavailable: {0}")]
    UpstreamUnavailable(#[from] ClassifierError),

    #[error("missing configuration: {0}")]
    ConfigMissing(String),

    #[error("edit rejected: {0}")]
    EditRejected(#[from] EditError),
}

impl ServiceError {
    pub fn invalid_request(message: impl Into<String>) -> Self {
        ServiceError::InvalidRequest(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ServiceError::InvalidRequest(_) => ErrorKind::InvalidRequest,
            ServiceError::MethodNotAllowed => ErrorKind::MethodNotAllowed,
            ServiceError::InvalidModelOutput(_) => ErrorKind::InvalidModelOutput,
            ServiceError::UpstreamUnavailable(_) => ErrorKind::UpstreamUnavailable,
            ServiceError::ConfigMissing(_) => ErrorKind::ConfigMissing,
            ServiceError::EditRejected(_) => ErrorKind::EditRejected,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        self.kind().status_code()
    }

    /// Label recorded in `canonicalize_requests_total{outcome}`. Validation
    /// failures report their specific reason.
    pub fn outcome_label(&self) -> String {
        match self {
            ServiceError::InvalidModelOutput(err) => err.reason().to_string(),
            other => other.kind().code().to_string(),
        }
    }

    /// Structured detail for the error envelope, when there is any.
    pub fn details(&self) -> Option<Value> {
        match self {
            ServiceError::InvalidModelOutput(err) => {
                let mut details = json!({ "reason": err.reason() });
                if let CanonicalizationError::MissingCoverage { missing, expected } = err {
                    details["missing"] = json!(missing);
                    details["expected"] = json!(expected);
                }
                Some(details)
            }
            ServiceError::UpstreamUnavailable(err) => Some(json!({ "cause": err.cause() })),
            _ => None,
        }
    }
}

impl From<SourceValuesError> for ServiceError {
    fn from(err: SourceValuesError) -> Self {
        ServiceError::InvalidRequest(err.to_string())
    }
}
