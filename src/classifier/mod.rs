//! The external classification capability.
//!
//! The classifier is injected as a [`Classifier`] trait object so the
//! pipeline can be driven by [`HttpClassifier`] in production and by
//! [`ScriptedClassifier`] in tests. Its answers are never trusted; see
//! [`crate::canonical::validator`].

pub mod http;
pub mod pipeline;
pub mod prompt;
pub mod scripted;

pub use http::HttpClassifier;
pub use pipeline::{CanonicalizeRequest, canonicalize_column, parse_model_output};
pub use prompt::ClassificationPrompt;
pub use scripted::{ScriptedClassifier, ScriptedReply};

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("classifier did not answer within {}s", .after.as_secs_f64())]
    Timeout { after: Duration },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("classifier returned HTTP {status}: {body}")]
    UpstreamStatus { status: u16, body: String },

    #[error("classifier returned no content")]
    EmptyResponse,
}

impl ClassifierError {
    /// Short machine-readable cause, used in response details and metrics.
    pub fn cause(&self) -> &'static str {
        match self {
            ClassifierError::Timeout { .. } => "timeout",
            ClassifierError::Transport(_) => "transport",
            ClassifierError::UpstreamStatus { .. } => "upstream-status",
            ClassifierError::EmptyResponse => "empty-response",
        }
    }

    /// Map a client error; `timeout` is the bound the client was built with.
    pub fn from_reqwest(err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            ClassifierError::Timeout { after: timeout }
        } else {
            ClassifierError::Transport(err.to_string())
        }
    }
}

/// Turns a prompt into raw model text.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, prompt: &ClassificationPrompt) -> Result<String, ClassifierError>;
}
