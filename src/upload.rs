//! Reading an upload batch from the filesystem.
//!
//! Files are read whole into [`Document`]s. Directories are walked
//! recursively; inside a directory, files with an unrecognised extension
//! are skipped with a warning, while a file named explicitly must have a
//! supported extension.

use anyhow::{bail, Context, Result};
use docent_core::models::{Document, MimeKind};
use std::path::{Path, PathBuf};
use tracing::warn;
use walkdir::WalkDir;

/// Load every document under `paths`, in argument order. Directory
/// contents are sorted by path.
pub fn load_documents(paths: &[PathBuf], max_file_bytes: u64) -> Result<Vec<Document>> {
    let mut documents = Vec::new();

    for path in paths {
        if !path.exists() {
            bail!("Path does not exist: {}", path.display());
        }
        if path.is_dir() {
            documents.extend(load_directory(path, max_file_bytes)?);
            continue;
        }
        let Some(kind) = MimeKind::from_path(path) else {
            bail!(
                "Unsupported file type: {} (expected .txt, .md, .pdf or .docx)",
                path.display()
            );
        };
        documents.push(read_document(path, kind, max_file_bytes)?);
    }

    Ok(documents)
}

fn load_directory(root: &Path, max_file_bytes: u64) -> Result<Vec<Document>> {
    let mut documents = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        match MimeKind::from_path(path) {
            Some(kind) => documents.push(read_document(path, kind, max_file_bytes)?),
            None => warn!(path = %path.display(), "skipping file with unsupported extension"),
        }
    }
    Ok(documents)
}

fn read_document(path: &Path, kind: MimeKind, max_file_bytes: u64) -> Result<Document> {
    let metadata = std::fs::metadata(path)
        .with_context(|| format!("Failed to stat {}", path.display()))?;
    if metadata.len() > max_file_bytes {
        bail!(
            "{} is {} bytes, over the {} byte limit (ingest.max_file_bytes)",
            path.display(),
            metadata.len(),
            max_file_bytes
        );
    }
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(Document::new(path.display().to_string(), kind, bytes))
}
