//! Query-time retrieval and context assembly.
//!
//! A [`Retriever`] pairs a [`VectorIndex`] with the [`Embedder`] that built
//! it. Queries are embedded with that same embedder and ranked by the
//! index's metric. The conversation loop depends only on the
//! [`ChunkSearch`] trait, so any retrieval backend can be plugged in.

use std::sync::Arc;

use async_trait::async_trait;

use crate::embedding::Embedder;
use crate::error::RetrievalError;
use crate::index::VectorIndex;
use crate::models::Chunk;

/// Number of chunks retrieved per question unless configured otherwise.
pub const DEFAULT_K: usize = 3;

/// Anything that can return the chunks most relevant to a query.
#[async_trait]
pub trait ChunkSearch: Send + Sync {
    /// Up to `k` chunks, most relevant first.
    async fn search(&self, query: &str, k: usize) -> Result<Vec<Chunk>, RetrievalError>;

    /// Number of searchable chunks.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A retrieved chunk and its similarity score.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

/// Embedding-similarity retrieval over a [`VectorIndex`].
pub struct Retriever {
    index: Box<dyn VectorIndex>,
    embedder: Arc<dyn Embedder>,
}

impl Retriever {
    /// `embedder` must be the one the index was built with.
    pub fn new(index: impl VectorIndex + 'static, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            index: Box::new(index),
            embedder,
        }
    }

    pub fn index(&self) -> &dyn VectorIndex {
        self.index.as_ref()
    }

    /// Ranked chunks with scores. An empty index returns nothing without
    /// contacting the embedding service.
    pub async fn search_scored(
        &self,
        query: &str,
        k: usize,
    ) -> Result<Vec<ScoredChunk>, RetrievalError> {
        let Some(dims) = self.index.dims() else {
            return Ok(Vec::new());
        };
        if k == 0 {
            return Ok(Vec::new());
        }

        let query_vec = self
            .embedder
            .embed(&[query.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or(RetrievalError::MissingVector)?;
        if query_vec.len() != dims {
            return Err(RetrievalError::DimensionMismatch {
                expected: dims,
                got: query_vec.len(),
            });
        }

        Ok(self
            .index
            .nearest(&query_vec, k)
            .into_iter()
            .map(|hit| ScoredChunk {
                chunk: hit.chunk.clone(),
                score: hit.score,
            })
            .collect())
    }
}

#[async_trait]
impl ChunkSearch for Retriever {
    async fn search(&self, query: &str, k: usize) -> Result<Vec<Chunk>, RetrievalError> {
        Ok(self
            .search_scored(query, k)
            .await?
            .into_iter()
            .map(|scored| scored.chunk)
            .collect())
    }

    fn len(&self) -> usize {
        self.index.len()
    }
}

/// Join chunk contents in ranked order, one newline between each.
pub fn assemble_context(chunks: &[Chunk]) -> String {
    chunks
        .iter()
        .map(|c| c.content.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EmbedError;
    use crate::index::{FlatIndex, Metric};
    use crate::testing::TableEmbedder;

    fn retriever(entries: &[(&str, Vec<f32>)], queries: &[(&str, Vec<f32>)]) -> Retriever {
        let pairs = entries
            .iter()
            .enumerate()
            .map(|(i, (text, v))| (Chunk::new("doc", i, *text), v.clone()))
            .collect();
        let index = FlatIndex::from_entries(pairs, Metric::Cosine).unwrap();
        let mut table: Vec<(&str, Vec<f32>)> = entries.to_vec();
        table.extend_from_slice(queries);
        Retriever::new(index, Arc::new(TableEmbedder::new(&table)))
    }

    #[tokio::test]
    async fn returns_closest_chunk() {
        let r = retriever(
            &[
                ("C1", vec![1.0, 0.0, 0.0]),
                ("C2", vec![0.0, 1.0, 0.0]),
                ("C3", vec![0.0, 0.0, 1.0]),
            ],
            &[("query", vec![0.1, 0.9, 0.2])],
        );
        let hits = r.search("query", 1).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].content, "C2");
        assert_eq!(hits[0].chunk_index, 1);
    }

    #[tokio::test]
    async fn returns_at_most_k_in_rank_order() {
        let r = retriever(
            &[
                ("far", vec![0.0, 1.0]),
                ("near", vec![1.0, 0.1]),
                ("middle", vec![1.0, 1.0]),
            ],
            &[("q", vec![1.0, 0.0])],
        );
        let scored = r.search_scored("q", 2).await.unwrap();
        let names: Vec<&str> = scored.iter().map(|s| s.chunk.content.as_str()).collect();
        assert_eq!(names, vec!["near", "middle"]);
        assert!(scored[0].score > scored[1].score);
    }

    #[tokio::test]
    async fn empty_index_returns_empty_without_embedding() {
        let embedder = Arc::new(TableEmbedder::new(&[]));
        let r = Retriever::new(FlatIndex::empty(Metric::Cosine), embedder.clone());
        let hits = r.search("anything", 3).await.unwrap();
        assert!(hits.is_empty());
        assert!(r.is_empty());
        assert_eq!(embedder.calls(), 0);
    }

    #[tokio::test]
    async fn dimension_mismatch_is_an_error() {
        let r = retriever(&[("a", vec![1.0, 0.0])], &[("q", vec![1.0, 0.0, 0.0])]);
        let err = r.search("q", 1).await.unwrap_err();
        assert!(matches!(
            err,
            RetrievalError::DimensionMismatch {
                expected: 2,
                got: 3
            }
        ));
    }

    #[tokio::test]
    async fn embedding_failure_is_an_error() {
        let r = retriever(&[("a", vec![1.0])], &[]);
        let err = r.search("unknown query", 1).await.unwrap_err();
        assert!(matches!(
            err,
            RetrievalError::Embedding(EmbedError::InvalidResponse(_))
        ));
    }

    #[test]
    fn context_joins_with_newlines() {
        let chunks = vec![
            Chunk::new("a", 0, "first"),
            Chunk::new("a", 1, "second"),
            Chunk::new("b", 0, "first"),
        ];
        assert_eq!(assemble_context(&chunks), "first\nsecond\nfirst");
        assert_eq!(assemble_context(&[]), "");
    }
}
