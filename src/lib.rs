//! # Docent
//!
//! Chat with your documents. Docent extracts text from uploaded files
//! (plain text, PDF, DOCX), splits it into chunks, embeds the chunks into
//! an in-memory vector index, and answers questions with a language model
//! grounded in the chunks most similar to each question. Answers stream
//! back as they are generated.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────────┐   ┌─────────────┐
//! │   upload    │──▶│ extract + chunk  │──▶│ vector index│
//! │ txt/pdf/docx│   │  (pipeline)      │   │ (embedding) │
//! └─────────────┘   └──────────────────┘   └──────┬──────┘
//!                                                 │ top-k
//!                   ┌──────────────────┐   ┌──────▼──────┐
//!                   │  stdout stream   │◀──│   session   │
//!                   │   (chat REPL)    │   │ (completion)│
//!                   └──────────────────┘   └─────────────┘
//! ```
//!
//! The retrieval and conversation logic lives in `docent-core`; this
//! crate adds file handling, the HTTP providers, configuration and the CLI.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`upload`] | Reading files and directories into documents |
//! | [`extract`] | Text extraction for txt, PDF, DOCX |
//! | [`pipeline`] | Documents → chunks → index |
//! | [`embedding`] | OpenAI and Ollama embedders |
//! | [`completion`] | OpenAI and Ollama streaming chat |
//! | [`chat`] | Interactive and one-shot question answering |
//! | [`inspect`] | `extract`, `chunk` and `search` commands |
//! | [`progress`] | Build progress on stderr |

pub mod chat;
pub mod completion;
pub mod config;
pub mod embedding;
pub mod extract;
mod http;
pub mod inspect;
pub mod pipeline;
pub mod progress;
pub mod upload;
