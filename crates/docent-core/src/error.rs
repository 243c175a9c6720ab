//! Error taxonomy for the build and query phases.
//!
//! | Error | Raised by | Effect |
//! |-------|-----------|--------|
//! | [`ExtractionError`] | text extraction | aborts the batch (or skips the document) |
//! | [`IndexBuildError`] | [`IndexBuilder`](crate::index::IndexBuilder) | no index is produced |
//! | [`RetrievalError`] | [`Retriever`](crate::search::Retriever) | the turn fails before the transcript changes |
//! | [`CompletionError`] | completion streams | partial answer is kept and tagged incomplete |

use thiserror::Error;

/// Failure reported by an [`Embedder`](crate::embedding::Embedder).
#[derive(Debug, Error)]
pub enum EmbedError {
    #[error("embedding request failed: {0}")]
    Request(String),

    #[error("embedding service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid embedding response: {0}")]
    InvalidResponse(String),

    #[error("embedding provider is disabled")]
    Disabled,
}

/// Why a single document could not be turned into text.
#[derive(Debug, Error)]
pub enum ExtractFailure {
    #[error("unsupported content type: {0}")]
    UnsupportedContentType(String),

    #[error("text is not valid UTF-8: {0}")]
    InvalidUtf8(String),

    #[error("PDF extraction failed: {0}")]
    Pdf(String),

    #[error("OOXML extraction failed: {0}")]
    Ooxml(String),
}

/// Extraction failure tagged with the offending document's name.
#[derive(Debug, Error)]
#[error("failed to extract '{document}': {kind}")]
pub struct ExtractionError {
    pub document: String,
    #[source]
    pub kind: ExtractFailure,
}

impl ExtractionError {
    pub fn new(document: impl Into<String>, kind: ExtractFailure) -> Self {
        Self {
            document: document.into(),
            kind,
        }
    }
}

#[derive(Debug, Error)]
pub enum IndexBuildError {
    #[error("embedding failed for chunks {start}..{end}: {source}")]
    Embedding {
        start: usize,
        end: usize,
        #[source]
        source: EmbedError,
    },

    #[error("embedding service returned {got} vectors for {expected} inputs")]
    CountMismatch { expected: usize, got: usize },

    #[error("vector {position} has {got} dimensions, expected {expected}")]
    DimensionMismatch {
        position: usize,
        expected: usize,
        got: usize,
    },

    #[error("embedding service returned an empty vector at position {0}")]
    EmptyVector(usize),
}

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("query embedding failed: {0}")]
    Embedding(#[from] EmbedError),

    #[error("query vector has {got} dimensions, index has {expected}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("embedding service returned no vector for the query")]
    MissingVector,
}

/// Failure while opening or reading a completion stream.
#[derive(Debug, Clone, Error)]
pub enum CompletionError {
    #[error("completion request failed: {0}")]
    Request(String),

    #[error("completion service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed completion stream: {0}")]
    Stream(String),

    #[error("completion stream ended before the end-of-stream signal")]
    Truncated,

    #[error("completion provider is disabled")]
    Disabled,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("system template is missing the {{{0}}} placeholder")]
    MissingPlaceholder(&'static str),
}
