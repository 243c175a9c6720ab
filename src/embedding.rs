//! Embedding service implementations.
//!
//! - **[`OpenAiEmbedder`]**: `POST {base}/embeddings` on any OpenAI-compatible API.
//! - **[`OllamaEmbedder`]**: `POST {url}/api/embed` on a local Ollama instance.
//! - **[`DisabledEmbedder`]**: always fails; used when embeddings are not configured.
//!
//! Use [`create_embedder`] to pick one from the configuration:
//!
//! ```rust,no_run
//! # use docent::config::{EmbeddingConfig, Provider};
//! # use docent::embedding::create_embedder;
//! let config = EmbeddingConfig {
//!     provider: Provider::Disabled,
//!     ..EmbeddingConfig::default()
//! };
//! let embedder = create_embedder(&config).unwrap();
//! assert_eq!(embedder.model_name(), "disabled");
//! ```

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use docent_core::embedding::Embedder;
use docent_core::error::EmbedError;
use serde::Deserialize;
use tracing::debug;

use crate::config::{EmbeddingConfig, Provider};
use crate::http::{build_client, endpoint, send_with_retry, SendFailure};

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const OLLAMA_BASE_URL: &str = "http://localhost:11434";

/// Environment variable holding the OpenAI API key.
pub const OPENAI_API_KEY_VAR: &str = "OPENAI_API_KEY";

impl From<SendFailure> for EmbedError {
    fn from(failure: SendFailure) -> Self {
        match failure {
            SendFailure::Network(msg) => EmbedError::Request(msg),
            SendFailure::Status { status, body } => EmbedError::Status { status, body },
        }
    }
}

// ============ Disabled ============

pub struct DisabledEmbedder;

#[async_trait]
impl Embedder for DisabledEmbedder {
    fn model_name(&self) -> &str {
        "disabled"
    }

    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        Err(EmbedError::Disabled)
    }
}

// ============ OpenAI ============

/// Embedder for the OpenAI embeddings API (or a compatible server).
pub struct OpenAiEmbedder {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    max_retries: u32,
}

#[derive(Deserialize)]
struct OpenAiEmbeddingResponse {
    data: Vec<OpenAiEmbedding>,
}

#[derive(Deserialize)]
struct OpenAiEmbedding {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

impl OpenAiEmbedder {
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            max_retries: 0,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        let url = endpoint(&self.base_url, "embeddings");
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });
        debug!(%url, inputs = texts.len(), "requesting embeddings");

        let response = send_with_retry("openai embeddings", self.max_retries, || {
            self.client
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(&body)
        })
        .await?;

        let parsed: OpenAiEmbeddingResponse = response
            .json()
            .await
            .map_err(|e| EmbedError::InvalidResponse(e.to_string()))?;
        Ok(order_by_index(parsed.data))
    }
}

/// The API may return items out of order; `index` is authoritative.
fn order_by_index(mut data: Vec<OpenAiEmbedding>) -> Vec<Vec<f32>> {
    data.sort_by_key(|item| item.index);
    data.into_iter().map(|item| item.embedding).collect()
}

// ============ Ollama ============

/// Embedder for a local Ollama instance. Requires an embedding model to be
/// pulled (e.g. `ollama pull nomic-embed-text`).
pub struct OllamaEmbedder {
    client: reqwest::Client,
    base_url: String,
    model: String,
    max_retries: u32,
}

#[derive(Deserialize)]
struct OllamaEmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

impl OllamaEmbedder {
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            model: model.into(),
            max_retries: 0,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        let url = endpoint(&self.base_url, "api/embed");
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let response = send_with_retry("ollama embeddings", self.max_retries, || {
            self.client.post(&url).json(&body)
        })
        .await
        .map_err(|failure| match failure {
            SendFailure::Network(msg) => EmbedError::Request(format!(
                "{msg} (is Ollama running at {}?)",
                self.base_url
            )),
            other => other.into(),
        })?;

        let parsed: OllamaEmbedResponse = response
            .json()
            .await
            .map_err(|e| EmbedError::InvalidResponse(e.to_string()))?;
        Ok(parsed.embeddings)
    }
}

// ============ Selection ============

/// Instantiate the embedder named by `config.provider`.
///
/// The OpenAI provider reads its key from `OPENAI_API_KEY`.
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    tracing::debug!(
        provider = config.provider.as_str(),
        model = %config.model_or_default(),
        "creating embedder"
    );
    match config.provider {
        Provider::Disabled => Ok(Arc::new(DisabledEmbedder)),
        Provider::OpenAi => {
            let api_key = std::env::var(OPENAI_API_KEY_VAR)
                .with_context(|| format!("{OPENAI_API_KEY_VAR} environment variable not set"))?;
            let client = build_client(config.timeout_secs)?;
            let base = config.url.as_deref().unwrap_or(OPENAI_BASE_URL);
            Ok(Arc::new(
                OpenAiEmbedder::new(client, base, api_key, config.model_or_default())
                    .with_max_retries(config.max_retries),
            ))
        }
        Provider::Ollama => {
            let client = build_client(config.timeout_secs)?;
            let base = config.url.as_deref().unwrap_or(OLLAMA_BASE_URL);
            Ok(Arc::new(
                OllamaEmbedder::new(client, base, config.model_or_default())
                    .with_max_retries(config.max_retries),
            ))
        }
    }
}
