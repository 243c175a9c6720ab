//! Non-interactive commands for looking at what the pipeline produces:
//! `docent extract`, `docent chunk` and `docent search`.

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use docent_core::models::Chunk;

use crate::config::Config;
use crate::embedding::create_embedder;
use crate::extract::extract;
use crate::pipeline::IndexPipeline;
use crate::progress::{BuildProgressReporter, SilentProgress};
use crate::upload::load_documents;

/// Print the normalized text of every document under `path`.
pub fn run_extract(config: &Config, path: PathBuf) -> Result<()> {
    let documents = load_documents(&[path], config.ingest.max_file_bytes)?;
    let mut out = std::io::stdout().lock();
    for doc in &documents {
        let text = extract(doc)?;
        if documents.len() > 1 {
            writeln!(out, "==> {} <==", doc.name)?;
        }
        writeln!(out, "{}", text)?;
    }
    Ok(())
}

/// Print the chunks of every document under `path`. No network access.
pub fn run_chunk(config: &Config, path: PathBuf, max_chars: Option<usize>) -> Result<()> {
    let mut config = config.clone();
    if let Some(max_chars) = max_chars {
        config.chunking.max_chars = max_chars;
    }
    config.validate()?;

    let documents = load_documents(&[path], config.ingest.max_file_bytes)?;
    let (chunks, report) =
        IndexPipeline::from_config(&config).chunk_documents(&documents, &SilentProgress)?;

    let mut out = std::io::stdout().lock();
    for chunk in &chunks {
        write_chunk(&mut out, chunk, None)?;
    }
    writeln!(
        out,
        "{} chunks from {} documents (max {} chars)",
        report.chunks, report.documents, config.chunking.max_chars
    )?;
    Ok(())
}

/// Index `files` and print the top `k` chunks for `query` with scores.
pub async fn run_search(
    config: &Config,
    query: &str,
    files: Vec<PathBuf>,
    k: Option<usize>,
    progress: Box<dyn BuildProgressReporter>,
) -> Result<()> {
    let k = k.unwrap_or(config.retrieval.k).max(1);
    let documents = load_documents(&files, config.ingest.max_file_bytes)?;
    let embedder = create_embedder(&config.embedding)?;
    let (retriever, _) = IndexPipeline::from_config(config)
        .build(&documents, embedder, progress.as_ref())
        .await?;

    let results = retriever
        .search_scored(query, k)
        .await
        .context("Search failed")?;

    let mut out = std::io::stdout().lock();
    if results.is_empty() {
        writeln!(out, "No results.")?;
    }
    for (rank, scored) in results.iter().enumerate() {
        write!(out, "{}. ", rank + 1)?;
        write_chunk(&mut out, &scored.chunk, Some(scored.score))?;
    }
    Ok(())
}

fn write_chunk(out: &mut impl Write, chunk: &Chunk, score: Option<f32>) -> Result<()> {
    match score {
        Some(score) => writeln!(
            out,
            "[{:.4}] {} #{} ({} chars)",
            score,
            chunk.source_name,
            chunk.source_label(),
            chunk.char_len()
        )?,
        None => writeln!(
            out,
            "--- {} #{} ({} chars)",
            chunk.source_name,
            chunk.source_label(),
            chunk.char_len()
        )?,
    }
    writeln!(out, "{}\n", chunk.content)?;
    Ok(())
}
