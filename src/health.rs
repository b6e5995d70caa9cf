use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::SystemTime;

use crate::server::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    /// Serving, but some capability is unavailable.
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    pub fn status_code(&self) -> StatusCode {
        match self {
            HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
            HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub component: String,
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub timestamp: i64,
    pub version: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub components: Vec<ComponentHealth>,
}

impl IntoResponse for HealthResponse {
    fn into_response(self) -> Response {
        let status = self.status.status_code();
        (status, Json(self)).into_response()
    }
}

impl HealthResponse {
    pub fn check(state: &AppState) -> Self {
        let classifier = if state.has_classifier() {
            ComponentHealth {
                component: "classifier".to_string(),
                status: HealthStatus::Healthy,
                error: None,
            }
        } else {
            ComponentHealth {
                component: "classifier".to_string(),
                status: HealthStatus::Degraded,
                error: Some("no classifier credential configured".to_string()),
            }
        };
        Self {
            status: classifier.status,
            timestamp: now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            components: vec![classifier],
        }
    }
}

fn now() -> i64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

/// Liveness plus a report on the classifier credential. A missing credential
/// degrades the service but does not take it down; grouping still works.
pub async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    HealthResponse::check(&state)
}
