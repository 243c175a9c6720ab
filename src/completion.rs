//! Streaming chat-completion providers.
//!
//! Both providers send the full transcript and read the answer
//! incrementally from a line-oriented response body:
//!
//! | Provider | Endpoint | Framing | End-of-stream |
//! |----------|----------|---------|---------------|
//! | [`OpenAiChat`] | `POST {base}/chat/completions` | server-sent events, `data: {json}` | `data: [DONE]` |
//! | [`OllamaChat`] | `POST {url}/api/chat` | newline-delimited JSON | `"done": true` |
//!
//! A body that ends before its end-of-stream signal yields
//! [`CompletionError::Truncated`], so a dropped connection is never
//! mistaken for a complete answer.

use std::collections::VecDeque;
use std::fmt::Display;
use std::pin::Pin;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use docent_core::completion::{CompletionModel, FragmentStream};
use docent_core::error::CompletionError;
use docent_core::transcript::Turn;
use futures::stream::{self, Stream, StreamExt};
use serde::Deserialize;
use tracing::debug;

use crate::config::{CompletionConfig, Provider};
use crate::embedding::{OLLAMA_BASE_URL, OPENAI_API_KEY_VAR, OPENAI_BASE_URL};
use crate::http::{build_client, endpoint, send_with_retry, SendFailure};

impl From<SendFailure> for CompletionError {
    fn from(failure: SendFailure) -> Self {
        match failure {
            SendFailure::Network(msg) => CompletionError::Request(msg),
            SendFailure::Status { status, body } => CompletionError::Status { status, body },
        }
    }
}

/// What one line of a response body means.
#[derive(Debug)]
pub enum LineEvent {
    Fragment(String),
    /// Keep-alives, comments, and role-only deltas.
    Skip,
    /// End of stream, possibly carrying a last fragment.
    Done(Option<String>),
    Error(CompletionError),
}

struct LineDecoder<S> {
    body: Pin<Box<S>>,
    buf: Vec<u8>,
    pending: VecDeque<Result<String, CompletionError>>,
    parse: fn(&str) -> LineEvent,
    finished: bool,
}

impl<S, B, E> LineDecoder<S>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: Display,
{
    async fn next_item(&mut self) -> Option<Result<String, CompletionError>> {
        loop {
            if let Some(item) = self.pending.pop_front() {
                return Some(item);
            }
            if self.finished {
                return None;
            }
            match self.body.next().await {
                Some(Ok(bytes)) => {
                    self.buf.extend_from_slice(bytes.as_ref());
                    while !self.finished {
                        let Some(pos) = self.buf.iter().position(|b| *b == b'\n') else {
                            break;
                        };
                        let line: Vec<u8> = self.buf.drain(..=pos).collect();
                        self.feed(&line);
                    }
                }
                Some(Err(e)) => {
                    self.pending
                        .push_back(Err(CompletionError::Request(e.to_string())));
                    self.finished = true;
                }
                None => {
                    if !self.buf.is_empty() {
                        let rest = std::mem::take(&mut self.buf);
                        self.feed(&rest);
                    }
                    if !self.finished {
                        self.pending.push_back(Err(CompletionError::Truncated));
                        self.finished = true;
                    }
                }
            }
        }
    }

    fn feed(&mut self, raw: &[u8]) {
        let line = String::from_utf8_lossy(raw);
        match (self.parse)(line.trim_end_matches(['\r', '\n'])) {
            LineEvent::Fragment(text) => self.pending.push_back(Ok(text)),
            LineEvent::Skip => {}
            LineEvent::Done(last) => {
                if let Some(text) = last {
                    self.pending.push_back(Ok(text));
                }
                self.finished = true;
            }
            LineEvent::Error(err) => {
                self.pending.push_back(Err(err));
                self.finished = true;
            }
        }
    }
}

/// Turn a chunked response body into a fragment stream, one `parse` call
/// per line.
pub fn decode_lines<S, B, E>(body: S, parse: fn(&str) -> LineEvent) -> FragmentStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Display + Send + 'static,
{
    let decoder = LineDecoder {
        body: Box::pin(body),
        buf: Vec::new(),
        pending: VecDeque::new(),
        parse,
        finished: false,
    };
    stream::unfold(decoder, |mut decoder| async move {
        decoder.next_item().await.map(|item| (item, decoder))
    })
    .boxed()
}

fn messages(turns: &[Turn]) -> Vec<serde_json::Value> {
    turns
        .iter()
        .map(|t| serde_json::json!({ "role": t.role.as_str(), "content": t.content }))
        .collect()
}

// ============ OpenAI ============

#[derive(Deserialize)]
struct SseChunk {
    #[serde(default)]
    choices: Vec<SseChoice>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct SseChoice {
    #[serde(default)]
    delta: SseDelta,
}

#[derive(Deserialize, Default)]
struct SseDelta {
    #[serde(default)]
    content: Option<String>,
}

/// Parse one server-sent-events line of an OpenAI chat stream.
pub fn parse_sse_line(line: &str) -> LineEvent {
    let line = line.trim();
    let Some(data) = line.strip_prefix("data:") else {
        // Blank separators, `:` comments and `event:` fields.
        return LineEvent::Skip;
    };
    let data = data.trim_start();
    if data == "[DONE]" {
        return LineEvent::Done(None);
    }
    match serde_json::from_str::<SseChunk>(data) {
        Ok(SseChunk {
            error: Some(error), ..
        }) => LineEvent::Error(CompletionError::Stream(error.to_string())),
        Ok(chunk) => match chunk.choices.into_iter().next().and_then(|c| c.delta.content) {
            Some(text) if !text.is_empty() => LineEvent::Fragment(text),
            _ => LineEvent::Skip,
        },
        Err(e) => LineEvent::Error(CompletionError::Stream(format!("{e}: {data}"))),
    }
}

/// Streaming chat completions from the OpenAI API (or a compatible server).
pub struct OpenAiChat {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: Option<f32>,
    max_retries: u32,
}

impl OpenAiChat {
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
            temperature: None,
            max_retries: 0,
        }
    }

    pub fn with_temperature(mut self, temperature: Option<f32>) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }
}

#[async_trait]
impl CompletionModel for OpenAiChat {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn stream(&self, turns: &[Turn]) -> Result<FragmentStream, CompletionError> {
        let url = endpoint(&self.base_url, "chat/completions");
        let mut body = serde_json::json!({
            "model": self.model,
            "messages": messages(turns),
            "stream": true,
        });
        if let Some(t) = self.temperature {
            body["temperature"] = serde_json::json!(t);
        }
        debug!(%url, turns = turns.len(), "opening chat stream");

        let response = send_with_retry("openai chat", self.max_retries, || {
            self.client
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(&body)
        })
        .await?;
        Ok(decode_lines(response.bytes_stream(), parse_sse_line))
    }
}

// ============ Ollama ============

#[derive(Deserialize)]
struct OllamaChatLine {
    #[serde(default)]
    message: Option<OllamaMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
struct OllamaMessage {
    #[serde(default)]
    content: String,
}

/// Parse one newline-delimited JSON line of an Ollama chat stream.
pub fn parse_ndjson_line(line: &str) -> LineEvent {
    let line = line.trim();
    if line.is_empty() {
        return LineEvent::Skip;
    }
    match serde_json::from_str::<OllamaChatLine>(line) {
        Ok(OllamaChatLine {
            error: Some(error), ..
        }) => LineEvent::Error(CompletionError::Stream(error)),
        Ok(parsed) => {
            let text = parsed
                .message
                .map(|m| m.content)
                .filter(|c| !c.is_empty());
            match (parsed.done, text) {
                (true, last) => LineEvent::Done(last),
                (false, Some(text)) => LineEvent::Fragment(text),
                (false, None) => LineEvent::Skip,
            }
        }
        Err(e) => LineEvent::Error(CompletionError::Stream(format!("{e}: {line}"))),
    }
}

/// Streaming chat from a local Ollama instance.
pub struct OllamaChat {
    client: reqwest::Client,
    base_url: String,
    model: String,
    temperature: Option<f32>,
    max_retries: u32,
}

impl OllamaChat {
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            model: model.into(),
            temperature: None,
            max_retries: 0,
        }
    }

    pub fn with_temperature(mut self, temperature: Option<f32>) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }
}

#[async_trait]
impl CompletionModel for OllamaChat {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn stream(&self, turns: &[Turn]) -> Result<FragmentStream, CompletionError> {
        let url = endpoint(&self.base_url, "api/chat");
        let mut body = serde_json::json!({
            "model": self.model,
            "messages": messages(turns),
            "stream": true,
        });
        if let Some(t) = self.temperature {
            body["options"] = serde_json::json!({ "temperature": t });
        }

        let response = send_with_retry("ollama chat", self.max_retries, || {
            self.client.post(&url).json(&body)
        })
        .await?;
        Ok(decode_lines(response.bytes_stream(), parse_ndjson_line))
    }
}

// ============ Disabled ============

pub struct DisabledChat;

#[async_trait]
impl CompletionModel for DisabledChat {
    fn model_name(&self) -> &str {
        "disabled"
    }

    async fn stream(&self, _turns: &[Turn]) -> Result<FragmentStream, CompletionError> {
        Err(CompletionError::Disabled)
    }
}

/// Instantiate the completion model named by `config.provider`.
pub fn create_completion_model(config: &CompletionConfig) -> Result<Arc<dyn CompletionModel>> {
    tracing::debug!(
        provider = config.provider.as_str(),
        model = %config.model,
        "creating completion model"
    );
    match config.provider {
        Provider::Disabled => Ok(Arc::new(DisabledChat)),
        Provider::OpenAi => {
            let api_key = std::env::var(OPENAI_API_KEY_VAR)
                .with_context(|| format!("{OPENAI_API_KEY_VAR} environment variable not set"))?;
            let client = build_client(config.timeout_secs)?;
            let base = config.url.as_deref().unwrap_or(OPENAI_BASE_URL);
            Ok(Arc::new(
                OpenAiChat::new(client, base, api_key, config.model.as_str())
                    .with_temperature(config.temperature)
                    .with_max_retries(config.max_retries),
            ))
        }
        Provider::Ollama => {
            let client = build_client(config.timeout_secs)?;
            let base = config.url.as_deref().unwrap_or(OLLAMA_BASE_URL);
            Ok(Arc::new(
                OllamaChat::new(client, base, config.model.as_str())
                    .with_temperature(config.temperature)
                    .with_max_retries(config.max_retries),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Body = stream::Iter<std::vec::IntoIter<Result<Vec<u8>, String>>>;

    fn body(parts: &[&str]) -> Body {
        stream::iter(
            parts
                .iter()
                .map(|p| Ok(p.as_bytes().to_vec()))
                .collect::<Vec<_>>(),
        )
    }

    async fn collect(stream: FragmentStream) -> Vec<Result<String, CompletionError>> {
        stream.collect().await
    }

    fn texts(items: &[Result<String, CompletionError>]) -> Vec<&str> {
        items
            .iter()
            .filter_map(|i| i.as_ref().ok().map(String::as_str))
            .collect()
    }

    #[tokio::test]
    async fn sse_fragments_in_order_until_done() {
        let items = collect(decode_lines(
            body(&[
                "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
                "data: {\"choices\":[{\"delta\":{\"content\":\"Par\"}}]}\n\ndata: {\"choices\":[{\"del",
                "ta\":{\"content\":\"is\"}}]}\n\n",
                ": keep-alive\n\ndata: [DONE]\n\n",
                "data: {\"choices\":[{\"delta\":{\"content\":\"ignored\"}}]}\n\n",
            ]),
            parse_sse_line,
        ))
        .await;
        assert_eq!(texts(&items), vec!["Par", "is"]);
        assert!(items.iter().all(|i| i.is_ok()));
    }

    #[tokio::test]
    async fn sse_body_without_done_is_truncated() {
        let items = collect(decode_lines(
            body(&["data: {\"choices\":[{\"delta\":{\"content\":\"Half\"}}]}\n\n"]),
            parse_sse_line,
        ))
        .await;
        assert_eq!(texts(&items), vec!["Half"]);
        assert!(matches!(items.last(), Some(Err(CompletionError::Truncated))));
    }

    #[tokio::test]
    async fn sse_error_payload_ends_stream() {
        let items = collect(decode_lines(
            body(&["data: {\"error\":{\"message\":\"overloaded\"}}\n\ndata: [DONE]\n"]),
            parse_sse_line,
        ))
        .await;
        assert_eq!(items.len(), 1);
        match &items[0] {
            Err(CompletionError::Stream(msg)) => assert!(msg.contains("overloaded")),
            other => panic!("unexpected item: {other:?}"),
        }
    }

    #[tokio::test]
    async fn ndjson_final_line_without_newline_is_processed() {
        let items = collect(decode_lines(
            body(&[
                "{\"message\":{\"role\":\"assistant\",\"content\":\"Hel\"},\"done\":false}\n",
                "{\"message\":{\"role\":\"assistant\",\"content\":\"lo\"},\"done\":false}\n",
                "{\"message\":{\"role\":\"assistant\",\"content\":\"\"},\"done\":true}",
            ]),
            parse_ndjson_line,
        ))
        .await;
        assert_eq!(texts(&items), vec!["Hel", "lo"]);
        assert!(items.iter().all(|i| i.is_ok()));
    }

    #[tokio::test]
    async fn transport_error_is_reported() {
        let broken: Body = stream::iter(vec![
            Ok(b"{\"message\":{\"content\":\"a\"},\"done\":false}\n".to_vec()),
            Err("connection reset".to_string()),
        ]);
        let items = collect(decode_lines(broken, parse_ndjson_line)).await;
        assert_eq!(texts(&items), vec!["a"]);
        match items.last() {
            Some(Err(CompletionError::Request(msg))) => assert!(msg.contains("connection reset")),
            other => panic!("unexpected item: {other:?}"),
        }
    }

    #[test]
    fn sse_lines_are_classified() {
        assert!(matches!(parse_sse_line(""), LineEvent::Skip));
        assert!(matches!(parse_sse_line("event: message"), LineEvent::Skip));
        assert!(matches!(parse_sse_line("data: [DONE]"), LineEvent::Done(None)));
        assert!(matches!(parse_sse_line("data: not json"), LineEvent::Error(_)));
    }

    #[test]
    fn ndjson_error_field_is_an_error() {
        assert!(matches!(
            parse_ndjson_line("{\"error\":\"model not found\"}"),
            LineEvent::Error(CompletionError::Stream(_))
        ));
    }

    #[tokio::test]
    async fn disabled_chat_fails_to_open() {
        let err = DisabledChat.stream(&[]).await.err().unwrap();
        assert!(matches!(err, CompletionError::Disabled));
    }
}
