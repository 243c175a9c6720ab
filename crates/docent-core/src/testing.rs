//! Test doubles shared by the unit tests in this crate.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};

use crate::completion::{CompletionModel, FragmentStream};
use crate::embedding::Embedder;
use crate::error::{CompletionError, EmbedError};
use crate::transcript::Turn;

/// Embeds texts by exact lookup; unknown texts are an error.
pub(crate) struct TableEmbedder {
    table: HashMap<String, Vec<f32>>,
    calls: AtomicUsize,
    truncate: bool,
}

impl TableEmbedder {
    pub(crate) fn new(entries: &[(&str, Vec<f32>)]) -> Self {
        Self {
            table: entries
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
            calls: AtomicUsize::new(0),
            truncate: false,
        }
    }

    /// Drop the last vector of every response.
    pub(crate) fn truncating(mut self) -> Self {
        self.truncate = true;
        self
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Embedder for TableEmbedder {
    fn model_name(&self) -> &str {
        "table"
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut out = texts
            .iter()
            .map(|t| {
                self.table
                    .get(t)
                    .cloned()
                    .ok_or_else(|| EmbedError::InvalidResponse(format!("no vector for {t:?}")))
            })
            .collect::<Result<Vec<_>, _>>()?;
        if self.truncate {
            out.pop();
        }
        Ok(out)
    }
}

/// One scripted stream item.
#[derive(Clone)]
pub(crate) enum Script {
    Text(&'static str),
    Fail(CompletionError),
}

/// Completion model that replays a script and records every request.
pub(crate) struct ScriptedModel {
    script: Vec<Script>,
    open_error: Option<CompletionError>,
    pub(crate) requests: Mutex<Vec<Vec<Turn>>>,
}

impl ScriptedModel {
    pub(crate) fn new(script: Vec<Script>) -> Self {
        Self {
            script,
            open_error: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn texts(fragments: &[&'static str]) -> Self {
        Self::new(fragments.iter().copied().map(Script::Text).collect())
    }

    pub(crate) fn failing_to_open(err: CompletionError) -> Self {
        let mut model = Self::new(Vec::new());
        model.open_error = Some(err);
        model
    }

    pub(crate) fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub(crate) fn last_request(&self) -> Vec<Turn> {
        self.requests.lock().unwrap().last().cloned().unwrap_or_default()
    }
}

#[async_trait]
impl CompletionModel for ScriptedModel {
    fn model_name(&self) -> &str {
        "scripted"
    }

    async fn stream(&self, turns: &[Turn]) -> Result<FragmentStream, CompletionError> {
        self.requests.lock().unwrap().push(turns.to_vec());
        if let Some(err) = &self.open_error {
            return Err(err.clone());
        }
        let items: Vec<Result<String, CompletionError>> = self
            .script
            .iter()
            .map(|s| match s {
                Script::Text(t) => Ok(t.to_string()),
                Script::Fail(e) => Err(e.clone()),
            })
            .collect();
        Ok(stream::iter(items).boxed())
    }
}
