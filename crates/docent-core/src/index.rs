//! Immutable vector index over embedded chunks.
//!
//! [`VectorIndex`] is the seam between retrieval and the vector store.
//! [`FlatIndex`] is the bundled implementation: exact brute-force k-NN
//! over every stored vector, which is plenty for a single session's
//! uploads.
//!
//! An index is built once per upload batch by [`IndexBuilder`] and never
//! mutated afterwards; a new batch produces a new index.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::embedding::{cosine_similarity, l2_distance, Embedder};
use crate::error::IndexBuildError;
use crate::models::Chunk;

/// Distance metric used to rank chunks. Must match what the embedding
/// model was trained for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    #[default]
    Cosine,
    L2,
}

impl Metric {
    /// Similarity score where larger is closer. For L2 this is the negated
    /// distance.
    pub fn score(self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            Metric::Cosine => cosine_similarity(a, b),
            Metric::L2 => -l2_distance(a, b),
        }
    }
}

/// A chunk returned from a nearest-neighbour query.
#[derive(Debug, Clone, Copy)]
pub struct Hit<'a> {
    pub chunk: &'a Chunk,
    /// Larger is more similar (see [`Metric::score`]).
    pub score: f32,
}

/// Read-only k-nearest-neighbour search over embedded chunks.
pub trait VectorIndex: Send + Sync {
    /// Number of stored chunks.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Dimension shared by every stored vector; `None` for an empty index.
    fn dims(&self) -> Option<usize>;

    /// Up to `k` chunks ordered by descending similarity to `query`.
    /// Ties keep insertion order.
    fn nearest(&self, query: &[f32], k: usize) -> Vec<Hit<'_>>;
}

struct Entry {
    chunk: Chunk,
    vector: Vec<f32>,
}

/// Exact brute-force index.
pub struct FlatIndex {
    entries: Vec<Entry>,
    dims: Option<usize>,
    metric: Metric,
}

impl FlatIndex {
    pub fn empty(metric: Metric) -> Self {
        Self {
            entries: Vec::new(),
            dims: None,
            metric,
        }
    }

    /// Build from (chunk, vector) pairs. Every vector must be non-empty and
    /// share one dimension.
    pub fn from_entries(
        pairs: Vec<(Chunk, Vec<f32>)>,
        metric: Metric,
    ) -> Result<Self, IndexBuildError> {
        let mut dims = None;
        let mut entries = Vec::with_capacity(pairs.len());

        for (position, (chunk, vector)) in pairs.into_iter().enumerate() {
            if vector.is_empty() {
                return Err(IndexBuildError::EmptyVector(position));
            }
            match dims {
                None => dims = Some(vector.len()),
                Some(expected) if expected != vector.len() => {
                    return Err(IndexBuildError::DimensionMismatch {
                        position,
                        expected,
                        got: vector.len(),
                    });
                }
                Some(_) => {}
            }
            entries.push(Entry { chunk, vector });
        }

        Ok(Self {
            entries,
            dims,
            metric,
        })
    }

    /// Stored chunks in insertion order.
    pub fn chunks(&self) -> impl Iterator<Item = &Chunk> {
        self.entries.iter().map(|e| &e.chunk)
    }
}

impl VectorIndex for FlatIndex {
    fn len(&self) -> usize {
        self.entries.len()
    }

    fn dims(&self) -> Option<usize> {
        self.dims
    }

    fn nearest(&self, query: &[f32], k: usize) -> Vec<Hit<'_>> {
        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, e)| (i, self.metric.score(query, &e.vector)))
            .collect();

        // NaN scores sort last; equal scores keep insertion order.
        scored.sort_by(|(ia, a), (ib, b)| match (a.is_nan(), b.is_nan()) {
            (false, false) => b.total_cmp(a).then(ia.cmp(ib)),
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            (true, true) => ia.cmp(ib),
        });
        scored.truncate(k);

        scored
            .into_iter()
            .map(|(i, score)| Hit {
                chunk: &self.entries[i].chunk,
                score,
            })
            .collect()
    }
}

/// Embeds chunks in batches and loads them into a [`FlatIndex`].
#[derive(Debug, Clone, Copy)]
pub struct IndexBuilder {
    batch_size: usize,
    metric: Metric,
}

impl IndexBuilder {
    /// A `batch_size` of 0 is treated as 1.
    pub fn new(batch_size: usize, metric: Metric) -> Self {
        Self {
            batch_size: batch_size.max(1),
            metric,
        }
    }

    /// Build an index. All-or-nothing: the first failing batch aborts the
    /// build and no partial index is returned.
    pub async fn build(
        &self,
        chunks: Vec<Chunk>,
        embedder: &dyn Embedder,
    ) -> Result<FlatIndex, IndexBuildError> {
        self.build_with_progress(chunks, embedder, |_, _| {}).await
    }

    /// Like [`build`](Self::build), calling `on_batch(embedded, total)`
    /// after each batch.
    pub async fn build_with_progress<F>(
        &self,
        chunks: Vec<Chunk>,
        embedder: &dyn Embedder,
        mut on_batch: F,
    ) -> Result<FlatIndex, IndexBuildError>
    where
        F: FnMut(usize, usize),
    {
        let total = chunks.len();
        let mut vectors: Vec<Vec<f32>> = Vec::with_capacity(total);

        for (batch_no, batch) in chunks.chunks(self.batch_size).enumerate() {
            let start = batch_no * self.batch_size;
            let texts: Vec<String> = batch.iter().map(|c| c.content.clone()).collect();
            let embedded =
                embedder
                    .embed(&texts)
                    .await
                    .map_err(|source| IndexBuildError::Embedding {
                        start,
                        end: start + batch.len(),
                        source,
                    })?;
            if embedded.len() != batch.len() {
                return Err(IndexBuildError::CountMismatch {
                    expected: batch.len(),
                    got: embedded.len(),
                });
            }
            vectors.extend(embedded);
            on_batch(vectors.len(), total);
        }

        FlatIndex::from_entries(chunks.into_iter().zip(vectors).collect(), self.metric)
    }
}
