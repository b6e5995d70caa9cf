use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::time::Duration;

use super::{ClassificationPrompt, Classifier, ClassifierError};

const MAX_ERROR_BODY_CHARS: usize = 500;

/// Classifier backed by an OpenAI-compatible chat-completions endpoint.
pub struct HttpClassifier {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
    timeout: Duration,
}

impl HttpClassifier {
    /// `timeout` bounds the HTTP exchange; the pipeline applies its own bound
    /// on top of it.
    pub fn new(
        endpoint: impl Into<String>,
        model: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build classifier HTTP client")?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            model: model.into(),
            api_key: api_key.into(),
            timeout,
        })
    }
}

#[async_trait]
impl Classifier for HttpClassifier {
    async fn classify(&self, prompt: &ClassificationPrompt) -> Result<String, ClassifierError> {
        let body = json!({
            "model": self.model,
            "temperature": 0,
            "response_format": {"type": "json_object"},
            "messages": [
                {"role": "system", "content": prompt.system},
                {"role": "user", "content": prompt.user},
            ],
        });

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|err| ClassifierError::from_reqwest(err, self.timeout))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ClassifierError::UpstreamStatus {
                status: status.as_u16(),
                body: text.chars().take(MAX_ERROR_BODY_CHARS).collect(),
            });
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|err| ClassifierError::from_reqwest(err, self.timeout))?;
        payload
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|content| !content.is_empty())
            .map(str::to_string)
            .ok_or(ClassifierError::EmptyResponse)
    }
}
