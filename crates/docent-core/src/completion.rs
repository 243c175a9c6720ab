//! Streaming completion contract.
//!
//! A [`CompletionModel`] turns a transcript into a [`FragmentStream`]: a
//! sequence of text fragments that ends when the stream yields `None`
//! (the end-of-stream signal) or an error. [`accumulate`] folds the stream
//! into the final answer while forwarding every fragment to a
//! [`FragmentSink`] for incremental display. The sink can stop the stream
//! early, which drops it and cancels the underlying request.

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;

use crate::error::CompletionError;
use crate::transcript::{CompletionStatus, Turn};

/// Incremental text fragments from a completion service.
pub type FragmentStream = BoxStream<'static, Result<String, CompletionError>>;

/// A chat-completion service that streams its answer.
#[async_trait]
pub trait CompletionModel: Send + Sync {
    /// Returns the model identifier (e.g. `"gpt-3.5-turbo"`).
    fn model_name(&self) -> &str;

    /// Open a streaming completion with `turns` as the conversation.
    async fn stream(&self, turns: &[Turn]) -> Result<FragmentStream, CompletionError>;
}

/// Returned by a sink after each fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkControl {
    Continue,
    /// Cancel the stream; the text so far becomes an incomplete answer.
    Stop,
}

/// Receives each fragment as it arrives, plus everything received so far.
pub trait FragmentSink {
    fn on_fragment(&mut self, fragment: &str, accumulated: &str) -> SinkControl;
}

impl<F> FragmentSink for F
where
    F: FnMut(&str, &str) -> SinkControl,
{
    fn on_fragment(&mut self, fragment: &str, accumulated: &str) -> SinkControl {
        self(fragment, accumulated)
    }
}

/// A sink that discards fragments.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl FragmentSink for NullSink {
    fn on_fragment(&mut self, _fragment: &str, _accumulated: &str) -> SinkControl {
        SinkControl::Continue
    }
}

/// How a stream finished.
#[derive(Debug, Clone)]
pub enum StreamEnd {
    Finished,
    Failed(CompletionError),
    Cancelled,
}

/// Result of folding a [`FragmentStream`].
#[derive(Debug, Clone)]
pub struct StreamOutcome {
    /// Concatenation of every fragment, untrimmed.
    pub text: String,
    pub end: StreamEnd,
}

impl StreamOutcome {
    /// The stored answer: the concatenation trimmed of surrounding whitespace.
    pub fn answer(&self) -> &str {
        self.text.trim()
    }

    pub fn status(&self) -> CompletionStatus {
        match self.end {
            StreamEnd::Finished => CompletionStatus::Complete,
            StreamEnd::Failed(_) | StreamEnd::Cancelled => CompletionStatus::Incomplete,
        }
    }
}

/// Fold `stream` into a single string, forwarding each fragment to `sink`.
///
/// Errors do not discard what was already received.
pub async fn accumulate(mut stream: FragmentStream, sink: &mut dyn FragmentSink) -> StreamOutcome {
    let mut text = String::new();
    while let Some(item) = stream.next().await {
        match item {
            Ok(fragment) => {
                if fragment.is_empty() {
                    continue;
                }
                text.push_str(&fragment);
                if sink.on_fragment(&fragment, &text) == SinkControl::Stop {
                    return StreamOutcome {
                        text,
                        end: StreamEnd::Cancelled,
                    };
                }
            }
            Err(err) => {
                return StreamOutcome {
                    text,
                    end: StreamEnd::Failed(err),
                };
            }
        }
    }
    StreamOutcome {
        text,
        end: StreamEnd::Finished,
    }
}
