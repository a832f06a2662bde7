//! OpenAI-compatible embeddings backend.
//!
//! Works with any server exposing `POST {base_url}/embeddings`: OpenAI,
//! Ollama, vLLM, text-embeddings-inference and similar.

use std::time::Duration;

use async_trait::async_trait;
use flint_config::EmbeddingsConfig;
use flint_core::{BackendError, EmbeddingBackend};
use serde::Deserialize;
use tracing::debug;

/// Embeds text over HTTP, one input per request.
pub struct OpenAiCompatEmbedder {
    base_url: String,
    model: String,
    api_key: Option<String>,
    timeout: Duration,
    client: reqwest::Client,
}

impl OpenAiCompatEmbedder {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BackendError::Unavailable(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key,
            timeout,
            client,
        })
    }

    pub fn from_config(config: &EmbeddingsConfig) -> Result<Self, BackendError> {
        Self::new(
            config.base_url.clone(),
            config.model.clone(),
            config.api_key.clone(),
            config.timeout(),
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn map_send_error(&self, e: reqwest::Error) -> BackendError {
        if e.is_timeout() {
            BackendError::Timeout(self.timeout)
        } else {
            BackendError::Unavailable(e.to_string())
        }
    }
}

/// Classify a non-success HTTP status.
///
/// Server-side failures and rate limiting are outages the caller may wait
/// out; anything else means the request itself was wrong.
fn status_error(status: u16, body: &str) -> BackendError {
    if status >= 500 || status == 429 {
        BackendError::Unavailable(format!("HTTP {status}: {body}"))
    } else {
        BackendError::InvalidResponse(format!("HTTP {status}: {body}"))
    }
}

/// Extract the first embedding from a response body.
fn parse_embedding(body: &str) -> Result<Vec<f32>, BackendError> {
    let response: EmbeddingApiResponse = serde_json::from_str(body).map_err(|e| {
        BackendError::InvalidResponse(format!("Failed to parse embedding response: {e}"))
    })?;
    response
        .data
        .into_iter()
        .next()
        .map(|d| d.embedding)
        .ok_or_else(|| BackendError::InvalidResponse("Embedding response has no data".into()))
}

#[async_trait]
impl EmbeddingBackend for OpenAiCompatEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, BackendError> {
        let url = format!("{}/embeddings", self.base_url);
        let body = serde_json::json!({
            "model": self.model,
            "input": [text],
            "encoding_format": "float",
        });

        debug!(model = %self.model, chars = text.len(), "Sending embedding request");

        let mut request = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response = request.send().await.map_err(|e| self.map_send_error(e))?;

        let status = response.status().as_u16();
        let text = response.text().await.map_err(|e| self.map_send_error(e))?;
        if !(200..300).contains(&status) {
            return Err(status_error(status, &text));
        }
        parse_embedding(&text)
    }
}

#[derive(Debug, Deserialize)]
struct EmbeddingApiResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}
