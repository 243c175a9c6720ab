//! TOML configuration.
//!
//! Every section is optional; a missing file section falls back to the
//! defaults below, so `docent` runs without any configuration at all.
//!
//! ```toml
//! [chunking]
//! max_chars = 4000
//!
//! [retrieval]
//! k = 3
//! metric = "cosine"
//!
//! [embedding]
//! provider = "openai"
//! model = "text-embedding-3-small"
//!
//! [completion]
//! provider = "openai"
//! model = "gpt-3.5-turbo"
//!
//! [chat]
//! max_history_turns = 40
//!
//! [ingest]
//! on_error = "abort"
//! ```

use anyhow::{Context, Result};
use docent_core::chunk::DEFAULT_MAX_CHARS;
use docent_core::index::Metric;
use docent_core::search::DEFAULT_K;
use docent_core::session::{PromptTemplate, SessionOptions};
use docent_core::transcript::MIN_HISTORY_TURNS;
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub completion: CompletionConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chars: default_max_chars(),
        }
    }
}

fn default_max_chars() -> usize {
    DEFAULT_MAX_CHARS
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_k")]
    pub k: usize,
    #[serde(default)]
    pub metric: Metric,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            k: default_k(),
            metric: Metric::default(),
        }
    }
}

fn default_k() -> usize {
    DEFAULT_K
}

/// Which remote service backs embeddings or completions.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[default]
    OpenAi,
    Ollama,
    Disabled,
}

impl Provider {
    pub fn as_str(self) -> &'static str {
        match self {
            Provider::OpenAi => "openai",
            Provider::Ollama => "ollama",
            Provider::Disabled => "disabled",
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default)]
    pub provider: Provider,
    #[serde(default)]
    pub model: Option<String>,
    /// Base URL; defaults per provider.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default)]
    pub max_retries: u32,
    #[serde(default = "default_embed_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: Provider::default(),
            model: None,
            url: None,
            batch_size: default_batch_size(),
            max_retries: 0,
            timeout_secs: default_embed_timeout_secs(),
        }
    }
}

impl EmbeddingConfig {
    pub fn model_or_default(&self) -> String {
        self.model.clone().unwrap_or_else(|| {
            match self.provider {
                Provider::Ollama => "nomic-embed-text",
                _ => "text-embedding-ada-002",
            }
            .to_string()
        })
    }
}

fn default_batch_size() -> usize {
    64
}
fn default_embed_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct CompletionConfig {
    #[serde(default)]
    pub provider: Provider,
    #[serde(default = "default_completion_model")]
    pub model: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub temperature: Option<f32>,
    /// Retries for opening the stream; a stream that fails midway is never retried.
    #[serde(default)]
    pub max_retries: u32,
    #[serde(default = "default_completion_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            provider: Provider::default(),
            model: default_completion_model(),
            url: None,
            temperature: None,
            max_retries: 0,
            timeout_secs: default_completion_timeout_secs(),
        }
    }
}

fn default_completion_model() -> String {
    "gpt-3.5-turbo".to_string()
}
fn default_completion_timeout_secs() -> u64 {
    120
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatConfig {
    #[serde(default = "default_max_history_turns")]
    pub max_history_turns: usize,
    #[serde(default)]
    pub system_template: Option<String>,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            max_history_turns: default_max_history_turns(),
            system_template: None,
        }
    }
}

fn default_max_history_turns() -> usize {
    40
}

/// What to do with a document that fails extraction.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum OnError {
    /// Fail the whole batch.
    #[default]
    Abort,
    /// Log and leave the document out.
    Skip,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    #[serde(default)]
    pub on_error: OnError,
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            on_error: OnError::default(),
            max_file_bytes: default_max_file_bytes(),
        }
    }
}

fn default_max_file_bytes() -> u64 {
    50 * 1024 * 1024
}

impl Config {
    /// Parse and validate a TOML string.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).context("Failed to parse config file")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunking.max_chars == 0 {
            anyhow::bail!("chunking.max_chars must be > 0");
        }
        if self.retrieval.k == 0 {
            anyhow::bail!("retrieval.k must be >= 1");
        }
        if self.embedding.batch_size == 0 {
            anyhow::bail!("embedding.batch_size must be > 0");
        }
        if self.chat.max_history_turns < MIN_HISTORY_TURNS {
            anyhow::bail!("chat.max_history_turns must be >= {}", MIN_HISTORY_TURNS);
        }
        if let Some(t) = self.completion.temperature {
            if !(0.0..=2.0).contains(&t) {
                anyhow::bail!("completion.temperature must be in [0.0, 2.0]");
            }
        }
        self.prompt_template()?;
        Ok(())
    }

    /// The configured system template, or the built-in one.
    pub fn prompt_template(&self) -> Result<PromptTemplate> {
        match &self.chat.system_template {
            Some(t) => PromptTemplate::new(t.as_str()).context("Invalid chat.system_template"),
            None => Ok(PromptTemplate::default()),
        }
    }

    pub fn session_options(&self) -> Result<SessionOptions> {
        Ok(SessionOptions {
            k: self.retrieval.k,
            template: self.prompt_template()?,
            max_history_turns: Some(self.chat.max_history_turns),
        })
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    Config::from_toml(&content)
}

/// Load `path` if given, otherwise use defaults.
pub fn load_or_default(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(p) => load_config(p),
        None => Ok(Config::default()),
    }
}
