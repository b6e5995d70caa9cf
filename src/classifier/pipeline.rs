use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use super::{ClassificationPrompt, Classifier, ClassifierError};
use crate::canonical::{
    CanonicalizationError, CanonicalizationResult, CanonicalizationValidator, ModelOutput,
};
use crate::error::ServiceError;
use crate::metrics::METRICS;
use crate::sanitize::{RawValue, SourceValues};

/// Body of `POST /api/canonicalize`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalizeRequest {
    pub column_name: String,
    pub values: Vec<RawValue>,
}

/// Canonicalize one metadata column: sanitize the values, ask the
/// classifier for a mapping, and accept it only if it validates.
///
/// The classifier call is bounded by `timeout`; on timeout the attempt is
/// discarded. Nothing is retried here.
pub async fn canonicalize_column(
    classifier: &dyn Classifier,
    validator: &CanonicalizationValidator,
    request: &CanonicalizeRequest,
    timeout: Duration,
) -> Result<CanonicalizationResult, ServiceError> {
    let column = request.column_name.trim();
    if column.is_empty() {
        return Err(ServiceError::invalid_request("columnName must not be empty"));
    }

    let source = SourceValues::from_raw(
        &request.values,
        validator.sanitizer(),
        validator.limits().max_values,
    )?;
    let prompt = ClassificationPrompt::build(column, &source);

    let started = Instant::now();
    let answer = tokio::time::timeout(timeout, classifier.classify(&prompt)).await;
    let elapsed = started.elapsed();
    METRICS.observe_classifier(elapsed);

    let text = match answer {
        Ok(reply) => reply?,
        Err(_) => return Err(ClassifierError::Timeout { after: timeout }.into()),
    };
    debug!(
        column,
        values = source.len(),
        elapsed_ms = elapsed.as_millis() as u64,
        "classifier answered"
    );

    let output = parse_model_output(&text)?;
    validator.validate_model_output(&output, &source).map_err(|err| {
        warn!(column, reason = %err.reason(), error = %err, "rejected classifier mapping");
        ServiceError::from(err)
    })
}

/// Parse classifier text as JSON, tolerating surrounding prose or a Markdown
/// code fence by falling back to the outermost `{...}` span. Repeated object
/// keys are kept for the validator to reject.
pub fn parse_model_output(text: &str) -> Result<ModelOutput, CanonicalizationError> {
    let trimmed = text.trim();
    if let Ok(output) = ModelOutput::from_json(trimmed) {
        return Ok(output);
    }

    let span = match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if start < end => &trimmed[start..=end],
        _ => {
            return Err(CanonicalizationError::malformed(
                "classifier output contains no JSON object",
            ));
        }
    };
    ModelOutput::from_json(span).map_err(|err| {
        CanonicalizationError::malformed(format!("classifier output is not valid JSON: {err}"))
    })
}
