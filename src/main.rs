//! # Docent CLI (`docent`)
//!
//! ## Usage
//!
//! ```bash
//! docent [--config docent.toml] <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docent chat [PATH…]` | Index documents and chat about them |
//! | `docent ask "<question>" --file PATH…` | Answer one question and exit |
//! | `docent extract PATH` | Print the normalized text of a document |
//! | `docent chunk PATH` | Print the chunks of a document |
//! | `docent search "<query>" --file PATH…` | Print the best-matching chunks |
//!
//! ## Examples
//!
//! ```bash
//! export OPENAI_API_KEY=...
//! docent chat ./handbook.pdf ./notes/
//! docent ask "What is the refund policy?" --file policy.docx
//! docent chunk report.pdf --max-chars 1000
//! ```
//!
//! Logs go to stderr; set `RUST_LOG` (e.g. `RUST_LOG=docent=debug`) or
//! pass `--verbose`.

use anyhow::Result;
use clap::{Parser, Subcommand};
use docent::config::load_or_default;
use docent::progress::ProgressMode;
use docent::{chat, inspect};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Docent: chat with your documents.
#[derive(Parser)]
#[command(
    name = "docent",
    about = "Docent: chat with your documents",
    version,
    long_about = "Docent extracts text from plain text, PDF and DOCX files, indexes it with \
    vector embeddings, and answers questions with a language model grounded in the most \
    relevant passages."
)]
struct Cli {
    /// Path to configuration file (TOML). Built-in defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log debug output to stderr.
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat interactively about a set of documents.
    ///
    /// Documents given here are indexed before the first prompt; more can
    /// be added with `/upload PATH…` inside the session.
    Chat {
        /// Files or directories to index.
        paths: Vec<PathBuf>,
    },

    /// Answer a single question about some documents.
    Ask {
        question: String,

        /// Files or directories to index.
        #[arg(long = "file", short, required = true)]
        files: Vec<PathBuf>,
    },

    /// Print the normalized text extracted from a document.
    Extract { path: PathBuf },

    /// Print the chunks a document is split into. No network access.
    Chunk {
        path: PathBuf,

        /// Override `chunking.max_chars`.
        #[arg(long)]
        max_chars: Option<usize>,
    },

    /// Print the chunks most similar to a query, with scores.
    Search {
        query: String,

        /// Files or directories to index.
        #[arg(long = "file", short, required = true)]
        files: Vec<PathBuf>,

        /// Number of results (default: `retrieval.k`).
        #[arg(short)]
        k: Option<usize>,
    },
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("docent=debug,docent_core=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let cfg = load_or_default(cli.config.as_deref())?;
    let progress = ProgressMode::default_for_tty();

    match cli.command {
        Commands::Chat { paths } => {
            chat::run_chat(cfg, paths, progress.reporter()).await?;
        }
        Commands::Ask { question, files } => {
            chat::run_ask(cfg, &question, files, progress.reporter()).await?;
        }
        Commands::Extract { path } => {
            inspect::run_extract(&cfg, path)?;
        }
        Commands::Chunk { path, max_chars } => {
            inspect::run_chunk(&cfg, path, max_chars)?;
        }
        Commands::Search { query, files, k } => {
            inspect::run_search(&cfg, &query, files, k, progress.reporter()).await?;
        }
    }

    Ok(())
}
