//! HTTP surface.
//!
//! Every JSON endpoint answers with one of two envelopes:
//! `{ok: true, requestId, result}` or
//! `{ok: false, requestId, error, code, details?}`.

use anyhow::Result;
use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{Instrument, info_span, warn};
use uuid::Uuid;

use crate::canonical::{CanonicalizationResult, CanonicalizationValidator};
use crate::classifier::{CanonicalizeRequest, Classifier, HttpClassifier, canonicalize_column};
use crate::config::ServiceConfig;
use crate::editor::{EditAction, GroupEditor, check_partition};
use crate::error::ServiceError;
use crate::factors::{Experiment, ExtractedFactors, OverrideMap, ResolvedFactors};
use crate::grouping::{Group, GroupingOption, RecipeGenerator};
use crate::health;
use crate::ids::ExperimentId;
use crate::metrics::{METRICS, OUTCOME_OK, RequestTimer};

pub const CANONICALIZE_PATH: &str = "/api/canonicalize";
pub const GROUPING_OPTIONS_PATH: &str = "/api/grouping/options";
pub const GROUPING_EDIT_PATH: &str = "/api/grouping/edit";

/// Shared, read-only service state. Handlers never mutate it.
pub struct AppState {
    config: Arc<ServiceConfig>,
    classifier: Option<Arc<dyn Classifier>>,
    validator: CanonicalizationValidator,
    generator: RecipeGenerator,
    editor: GroupEditor,
}

impl AppState {
    fn new(config: ServiceConfig, classifier: Option<Arc<dyn Classifier>>) -> Self {
        let validator = CanonicalizationValidator::new(config.limits);
        let generator = RecipeGenerator::new(config.binning());
        let editor = GroupEditor::new(config.edit_policy);
        Self {
            config: Arc::new(config),
            classifier,
            validator,
            generator,
            editor,
        }
    }

    /// Build the HTTP classifier when a credential is configured.
    pub fn from_config(config: ServiceConfig) -> Result<Self> {
        let settings = &config.classifier;
        let classifier = match settings.api_key.as_deref() {
            Some(key) => {
                let http = HttpClassifier::new(
                    settings.endpoint.as_str(),
                    settings.model.as_str(),
                    key,
                    settings.timeout,
                )?;
                Some(Arc::new(http) as Arc<dyn Classifier>)
            }
            None => {
                warn!("no classifier credential configured; canonicalization requests will fail");
                None
            }
        };
        Ok(Self::new(config, classifier))
    }

    pub fn with_classifier(config: ServiceConfig, classifier: Arc<dyn Classifier>) -> Self {
        Self::new(config, Some(classifier))
    }

    /// State with no classifier, as when the credential is absent.
    pub fn without_classifier(config: ServiceConfig) -> Self {
        Self::new(config, None)
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn has_classifier(&self) -> bool {
        self.classifier.is_some()
    }

    pub async fn canonicalize(
        &self,
        request: &CanonicalizeRequest,
    ) -> Result<CanonicalizationResult, ServiceError> {
        let classifier = self.classifier.as_deref().ok_or_else(|| {
            ServiceError::ConfigMissing("classifier credential (FACTOR_CANON_API_KEY)".into())
        })?;
        canonicalize_column(
            classifier,
            &self.validator,
            request,
            self.config.classifier.timeout,
        )
        .await
    }

    pub fn grouping_options(
        &self,
        request: &GroupingOptionsRequest,
    ) -> Result<GroupingOptionsResult, ServiceError> {
        if request
            .experiments
            .iter()
            .any(|experiment| experiment.experiment_id.is_blank())
        {
            return Err(ServiceError::invalid_request(
                "experimentId must not be empty",
            ));
        }
        let ids: Vec<ExperimentId> = request
            .experiments
            .iter()
            .map(|experiment| experiment.experiment_id.clone())
            .collect();

        let names = ResolvedFactors::factor_names_from(&ids, &request.factors, &request.overrides);
        let resolved = ResolvedFactors::build(&ids, &request.factors, &request.overrides, &names);
        let available_factors = resolved.available_factor_names();
        let options = self.generator.generate(&ids, &resolved, &available_factors);

        Ok(GroupingOptionsResult {
            available_factors,
            options,
        })
    }

    pub fn edit_groups(&self, request: &EditRequest) -> Result<EditResponse, ServiceError> {
        check_partition(&request.groups)
            .map_err(|err| ServiceError::invalid_request(format!("groups: {err}")))?;
        let groups = self.editor.apply(&request.groups, &request.action)?;
        Ok(EditResponse { groups })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupingOptionsRequest {
    pub experiments: Vec<Experiment>,
    #[serde(default)]
    pub factors: ExtractedFactors,
    #[serde(default)]
    pub overrides: OverrideMap,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupingOptionsResult {
    pub available_factors: Vec<String>,
    pub options: Vec<GroupingOption>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EditRequest {
    pub groups: Vec<Group>,
    pub action: EditAction,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EditResponse {
    pub groups: Vec<Group>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Success<T> {
    ok: bool,
    request_id: String,
    result: T,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Failure {
    ok: bool,
    request_id: String,
    error: String,
    code: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Value>,
}

fn respond<T: Serialize>(request_id: &str, result: Result<T, ServiceError>) -> Response {
    match result {
        Ok(result) => Json(Success {
            ok: true,
            request_id: request_id.to_string(),
            result,
        })
        .into_response(),
        Err(err) => failure(request_id, &err),
    }
}

fn failure(request_id: &str, err: &ServiceError) -> Response {
    let kind = err.kind();
    if kind.status_code().is_server_error() {
        warn!(code = kind.code(), category = kind.category(), error = %err, "request failed");
    } else {
        tracing::debug!(code = kind.code(), error = %err, "request refused");
    }
    let body = Failure {
        ok: false,
        request_id: request_id.to_string(),
        error: err.to_string(),
        code: kind.code(),
        details: err.details(),
    };
    (kind.status_code(), Json(body)).into_response()
}

fn rejected(rejection: JsonRejection) -> ServiceError {
    ServiceError::invalid_request(rejection.body_text())
}

async fn canonicalize_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<CanonicalizeRequest>, JsonRejection>,
) -> Response {
    let request_id = Uuid::new_v4().to_string();
    let span = info_span!("canonicalize", request_id = %request_id);
    async move {
        let _timer = RequestTimer::start(CANONICALIZE_PATH);
        let result = match payload {
            Ok(Json(request)) => state.canonicalize(&request).await,
            Err(rejection) => Err(rejected(rejection)),
        };
        let outcome = match &result {
            Ok(_) => OUTCOME_OK.to_string(),
            Err(err) => err.outcome_label(),
        };
        METRICS.record_canonicalize(&outcome);
        respond(&request_id, result)
    }
    .instrument(span)
    .await
}

async fn grouping_options_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<GroupingOptionsRequest>, JsonRejection>,
) -> Response {
    let request_id = Uuid::new_v4().to_string();
    let span = info_span!("grouping_options", request_id = %request_id);
    async move {
        let _timer = RequestTimer::start(GROUPING_OPTIONS_PATH);
        METRICS.record_grouping("options");
        let result = payload
            .map_err(rejected)
            .and_then(|Json(request)| state.grouping_options(&request));
        respond(&request_id, result)
    }
    .instrument(span)
    .await
}

async fn grouping_edit_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<EditRequest>, JsonRejection>,
) -> Response {
    let request_id = Uuid::new_v4().to_string();
    let span = info_span!("grouping_edit", request_id = %request_id);
    async move {
        let _timer = RequestTimer::start(GROUPING_EDIT_PATH);
        let result = payload.map_err(rejected).and_then(|Json(request)| {
            METRICS.record_grouping(request.action.operation());
            state.edit_groups(&request)
        });
        respond(&request_id, result)
    }
    .instrument(span)
    .await
}

async fn method_not_allowed() -> Response {
    failure(&Uuid::new_v4().to_string(), &ServiceError::MethodNotAllowed)
}

async fn metrics_handler() -> impl IntoResponse {
    (
        StatusCode::OK,
        [(
            header::CONTENT_TYPE,
            "application/openmetrics-text; version=1.0.0; charset=utf-8",
        )],
        METRICS.encode(),
    )
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(CANONICALIZE_PATH, post(canonicalize_handler))
        .route(GROUPING_OPTIONS_PATH, post(grouping_options_handler))
        .route(GROUPING_EDIT_PATH, post(grouping_edit_handler))
        .route("/health", get(health::health_handler))
        .route("/metrics", get(metrics_handler))
        .method_not_allowed_fallback(method_not_allowed)
        .with_state(state)
}

/// Resolves on Ctrl+C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received Ctrl+C"),
        _ = terminate => tracing::info!("received SIGTERM"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn assert_send<T: Send>(_: &T) {}

    #[test]
    fn handler_futures_are_send() {
        let state = Arc::new(AppState::without_classifier(ServiceConfig::default()));
        let options: GroupingOptionsRequest =
            serde_json::from_value(json!({"experiments": [{"experimentId": "e1"}]})).unwrap();
        let edit: EditRequest = serde_json::from_value(json!({
            "groups": [],
            "action": {"type": "create", "name": "Outliers"}
        }))
        .unwrap();
        let canonicalize = CanonicalizeRequest {
            column_name: "catalyst".to_string(),
            values: Vec::new(),
        };

        assert_send(&grouping_options_handler(State(state.clone()), Ok(Json(options))));
        assert_send(&grouping_edit_handler(State(state.clone()), Ok(Json(edit))));
        assert_send(&canonicalize_handler(State(state), Ok(Json(canonicalize))));
    }
}
