//! # Docent Core
//!
//! Runtime-free logic for Docent: data models, text normalization,
//! chunking, the vector index and retrieval algorithm, and the
//! retrieval-augmented conversation loop.
//!
//! This crate performs no file or network I/O. Embedding and completion
//! services are reached through the [`embedding::Embedder`] and
//! [`completion::CompletionModel`] traits; the `docent` application crate
//! supplies HTTP implementations.
//!
//! ## Data Flow
//!
//! ```text
//! Document ─▶ normalize ─▶ chunk ─▶ IndexBuilder ─▶ Retriever
//!                                                      │
//!                              Session::respond ◀──────┘
//!                                    │
//!                        CompletionModel::stream ─▶ FragmentSink
//! ```

pub mod chunk;
pub mod completion;
pub mod embedding;
pub mod error;
pub mod index;
pub mod models;
pub mod normalize;
pub mod search;
pub mod session;
pub mod transcript;

#[cfg(test)]
mod testing;
