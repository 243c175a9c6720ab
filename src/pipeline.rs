//! Build pipeline: documents → text → chunks → vector index.
//!
//! ```text
//! Document ─▶ extract + normalize ─▶ chunk_text ─▶ IndexBuilder ─▶ Retriever
//! ```
//!
//! An upload batch either produces a complete index or fails; there is no
//! partially built index. Extraction failures follow the configured
//! [`OnError`] policy: `abort` fails the batch on the first bad document,
//! `skip` logs it and carries on (a batch where every document fails is
//! still an error).

use std::collections::HashSet;
use std::sync::Arc;

use docent_core::chunk::chunk_text;
use docent_core::embedding::Embedder;
use docent_core::error::{ExtractionError, IndexBuildError};
use docent_core::index::IndexBuilder;
use docent_core::models::{Chunk, Document};
use docent_core::search::Retriever;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::{Config, OnError};
use crate::extract::extract;
use crate::progress::{BuildProgressEvent, BuildProgressReporter};

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("no documents to index")]
    EmptyBatch,

    #[error("document '{0}' appears more than once in the batch")]
    DuplicateDocument(String),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error("all {0} documents failed extraction")]
    AllFailed(usize),

    #[error("index build failed: {0}")]
    Index(#[from] IndexBuildError),
}

/// Summary of a successful build.
#[derive(Debug, Default)]
pub struct BuildReport {
    pub documents: usize,
    pub chunks: usize,
    /// Documents left out under the `skip` policy.
    pub skipped: Vec<ExtractionError>,
}

/// Turns an upload batch into a [`Retriever`].
#[derive(Debug, Clone, Copy)]
pub struct IndexPipeline {
    max_chars: usize,
    on_error: OnError,
    builder: IndexBuilder,
}

impl IndexPipeline {
    pub fn new(max_chars: usize, on_error: OnError, builder: IndexBuilder) -> Self {
        Self {
            max_chars,
            on_error,
            builder,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.chunking.max_chars,
            config.ingest.on_error,
            IndexBuilder::new(config.embedding.batch_size, config.retrieval.metric),
        )
    }

    /// Extract and chunk every document, without embedding.
    pub fn chunk_documents(
        &self,
        documents: &[Document],
        progress: &dyn BuildProgressReporter,
    ) -> Result<(Vec<Chunk>, BuildReport), BuildError> {
        if documents.is_empty() {
            return Err(BuildError::EmptyBatch);
        }
        let mut seen = HashSet::new();
        for doc in documents {
            if !seen.insert(doc.name.as_str()) {
                return Err(BuildError::DuplicateDocument(doc.name.clone()));
            }
        }

        let total = documents.len() as u64;
        let mut chunks = Vec::new();
        let mut report = BuildReport::default();

        for (i, doc) in documents.iter().enumerate() {
            progress.report(BuildProgressEvent::Extracting {
                document: doc.name.clone(),
                n: i as u64 + 1,
                total,
            });
            let text = match extract(doc) {
                Ok(text) => text,
                Err(err) => match self.on_error {
                    OnError::Abort => return Err(err.into()),
                    OnError::Skip => {
                        warn!(document = %doc.name, error = %err, "skipping document");
                        report.skipped.push(err);
                        continue;
                    }
                },
            };
            let doc_chunks = chunk_text(&text, &doc.name, self.max_chars);
            info!(
                document = %doc.name,
                kind = %doc.mime_kind,
                chars = text.chars().count(),
                chunks = doc_chunks.len(),
                "extracted"
            );
            report.documents += 1;
            chunks.extend(doc_chunks);
        }

        if report.documents == 0 {
            return Err(BuildError::AllFailed(documents.len()));
        }
        report.chunks = chunks.len();
        progress.report(BuildProgressEvent::Chunked {
            chunks: chunks.len() as u64,
        });
        Ok((chunks, report))
    }

    /// Build a retriever over `documents`.
    pub async fn build(
        &self,
        documents: &[Document],
        embedder: Arc<dyn Embedder>,
        progress: &dyn BuildProgressReporter,
    ) -> Result<(Retriever, BuildReport), BuildError> {
        let (chunks, report) = self.chunk_documents(documents, progress)?;

        let index = self
            .builder
            .build_with_progress(chunks, embedder.as_ref(), |n, total| {
                progress.report(BuildProgressEvent::Embedding {
                    n: n as u64,
                    total: total as u64,
                })
            })
            .await?;

        progress.report(BuildProgressEvent::Ready {
            documents: report.documents as u64,
            chunks: report.chunks as u64,
        });
        info!(
            documents = report.documents,
            chunks = report.chunks,
            skipped = report.skipped.len(),
            model = embedder.model_name(),
            "index built"
        );
        Ok((Retriever::new(index, embedder), report))
    }
}
