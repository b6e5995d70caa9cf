pub mod canonical;
pub mod classifier;
pub mod config;
pub mod editor;
pub mod error;
pub mod factors;
pub mod grouping;
pub mod health;
pub mod ids;
pub mod logging;
pub mod metrics;
pub mod sanitize;
pub mod server;

pub use canonical::{
    CanonLimits, CanonicalMapping, CanonicalizationError, CanonicalizationResult,
    CanonicalizationValidator, FailureReason,
};
pub use classifier::{Classifier, ClassifierError, ScriptedClassifier};
pub use config::{CliArgs, ServiceConfig};
pub use editor::{EditAction, EditError, EditPolicy, GroupEditor};
pub use error::{ErrorKind, ServiceError};
pub use factors::{FactorScalar, FactorValue, ResolvedFactors, resolve};
pub use grouping::{Group, GroupingOption, Recipe, RecipeGenerator, TemperatureBinning};
pub use ids::{ExperimentId, GroupId};
pub use logging::{LoggingConfig, init_logging};
pub use sanitize::{RawValue, SourceValues, ValueSanitizer, sanitize};
pub use server::{AppState, router};

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::net::TcpListener;

pub async fn run_server(config: ServiceConfig) -> Result<()> {
    let bind_addr = config.http_bind_address;
    let state = Arc::new(AppState::from_config(config)?);

    tracing::info!(
        classifier = state.has_classifier(),
        edit_policy = ?state.config().edit_policy,
        temperature_binning = ?state.config().temperature_binning,
        "starting factor-canon service",
    );

    let listener = TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    let actual_addr = listener.local_addr()?;
    tracing::info!(bind = %actual_addr, "listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(server::shutdown_signal())
        .await
        .context("http server failed")?;

    tracing::info!("server stopped");
    Ok(())
}
