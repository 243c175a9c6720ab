//! Core data models: uploaded documents and the chunks cut from them.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Content type for plain text uploads.
pub const MIME_TEXT: &str = "text/plain";
/// Content type for PDF uploads.
pub const MIME_PDF: &str = "application/pdf";
/// Registered content type for Word (OOXML) documents.
pub const MIME_DOCX: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

/// Page number recorded on a chunk when page boundaries are unavailable.
pub const DEFAULT_PAGE: u32 = 1;

/// The kinds of document the extractor understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MimeKind {
    Text,
    Pdf,
    Docx,
}

impl MimeKind {
    /// Parse a MIME content type, ignoring parameters such as `; charset=utf-8`.
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        match essence.as_str() {
            MIME_TEXT | "text/markdown" => Some(Self::Text),
            MIME_PDF => Some(Self::Pdf),
            MIME_DOCX => Some(Self::Docx),
            _ => None,
        }
    }

    /// Map a file extension (without the dot, any case) to a kind.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "txt" | "text" | "md" | "markdown" => Some(Self::Text),
            "pdf" => Some(Self::Pdf),
            "docx" => Some(Self::Docx),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }

    pub fn content_type(self) -> &'static str {
        match self {
            Self::Text => MIME_TEXT,
            Self::Pdf => MIME_PDF,
            Self::Docx => MIME_DOCX,
        }
    }
}

impl fmt::Display for MimeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.content_type())
    }
}

/// A raw uploaded artifact. Consumed once by extraction.
#[derive(Debug, Clone)]
pub struct Document {
    /// Display name, unique within an upload batch.
    pub name: String,
    pub mime_kind: MimeKind,
    pub raw_bytes: Vec<u8>,
}

impl Document {
    pub fn new(
        name: impl Into<String>,
        mime_kind: MimeKind,
        raw_bytes: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            name: name.into(),
            mime_kind,
            raw_bytes: raw_bytes.into(),
        }
    }
}

/// A bounded segment of a document's normalized text: the unit of retrieval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Chunk {
    pub content: String,
    /// Name of the originating [`Document`].
    pub source_name: String,
    /// Position within the document, starting at 0.
    pub chunk_index: usize,
    pub page: u32,
    /// SHA-256 of `content`, hex encoded.
    pub hash: String,
}

impl Chunk {
    pub fn new(source_name: &str, chunk_index: usize, content: impl Into<String>) -> Self {
        let content = content.into();
        let mut hasher = Sha256::new();
        hasher.update(content.as_bytes());
        let hash = format!("{:x}", hasher.finalize());

        Self {
            content,
            source_name: source_name.to_string(),
            chunk_index,
            page: DEFAULT_PAGE,
            hash,
        }
    }

    /// Short provenance label, `"{page}-{chunk_index}"`.
    pub fn source_label(&self) -> String {
        format!("{}-{}", self.page, self.chunk_index)
    }

    /// Length of the content in characters.
    pub fn char_len(&self) -> usize {
        self.content.chars().count()
    }
}
