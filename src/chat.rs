//! Interactive chat over uploaded documents.
//!
//! Questions are read one line at a time from stdin and answers are
//! streamed to stdout as they arrive. Lines starting with `/` are
//! commands:
//!
//! | Command | Effect |
//! |---------|--------|
//! | `/upload PATH…` | index a new batch, replacing the current index |
//! | `/reset` | start a fresh conversation, keeping the index |
//! | `/history` | print the conversation so far |
//! | `/quit` | exit |

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Result};
use docent_core::completion::{CompletionModel, FragmentSink, SinkControl};
use docent_core::session::{Reply, Session};
use docent_core::transcript::{CompletionStatus, Role};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use crate::completion::{create_completion_model, DisabledChat};
use crate::config::Config;
use crate::embedding::create_embedder;
use crate::pipeline::{BuildReport, IndexPipeline};
use crate::progress::BuildProgressReporter;
use crate::upload::load_documents;

/// Writes each fragment to stdout as soon as it arrives.
pub struct TerminalSink<W: Write> {
    out: W,
}

impl<W: Write> TerminalSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }
}

impl<W: Write> FragmentSink for TerminalSink<W> {
    fn on_fragment(&mut self, fragment: &str, _accumulated: &str) -> SinkControl {
        if self.out.write_all(fragment.as_bytes()).is_err() || self.out.flush().is_err() {
            // Nobody is reading any more.
            return SinkControl::Stop;
        }
        SinkControl::Continue
    }
}

/// A session plus the services and settings it is driven with.
pub struct ChatApp {
    config: Config,
    session: Session,
    model: Option<Arc<dyn CompletionModel>>,
    progress: Box<dyn BuildProgressReporter>,
}

impl ChatApp {
    pub fn new(config: Config, progress: Box<dyn BuildProgressReporter>) -> Result<Self> {
        let session = Session::new(config.session_options()?);
        Ok(Self {
            config,
            session,
            model: None,
            progress,
        })
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Index `paths`, replacing the current index. On failure the session
    /// is left idle.
    pub async fn upload(&mut self, paths: &[PathBuf]) -> Result<BuildReport> {
        match self.build(paths).await {
            Ok(report) => Ok(report),
            Err(err) => {
                self.session.clear_index();
                Err(err)
            }
        }
    }

    async fn build(&mut self, paths: &[PathBuf]) -> Result<BuildReport> {
        let documents = load_documents(paths, self.config.ingest.max_file_bytes)?;
        let embedder = create_embedder(&self.config.embedding)?;
        let pipeline = IndexPipeline::from_config(&self.config);
        let (retriever, report) = pipeline
            .build(&documents, embedder, self.progress.as_ref())
            .await?;
        self.session.load_index(retriever);
        Ok(report)
    }

    /// The completion model, created on first use so an idle session
    /// needs no credentials.
    fn model(&mut self) -> Result<Arc<dyn CompletionModel>> {
        if let Some(model) = &self.model {
            return Ok(Arc::clone(model));
        }
        let model = create_completion_model(&self.config.completion)?;
        self.model = Some(Arc::clone(&model));
        Ok(model)
    }

    /// Answer one question, streaming into `sink`.
    pub async fn ask(&mut self, question: &str, sink: &mut dyn FragmentSink) -> Result<Reply> {
        let model: Arc<dyn CompletionModel> = if self.session.is_ready() {
            self.model()?
        } else {
            Arc::new(DisabledChat)
        };
        let reply = self.session.respond(question, model.as_ref(), sink).await?;
        Ok(reply)
    }

    pub fn reset(&mut self) {
        self.session.reset();
    }
}

/// Run the interactive loop until `/quit` or end of input.
pub async fn run_chat(
    config: Config,
    paths: Vec<PathBuf>,
    progress: Box<dyn BuildProgressReporter>,
) -> Result<()> {
    let mut app = ChatApp::new(config, progress)?;

    if !paths.is_empty() {
        report_upload(app.upload(&paths).await);
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        eprint!("> ");
        let _ = std::io::stderr().flush();
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(command) = line.strip_prefix('/') {
            let mut parts = command.split_whitespace();
            match parts.next().unwrap_or_default() {
                "quit" | "exit" => break,
                "reset" => {
                    app.reset();
                    eprintln!("Conversation cleared.");
                }
                "history" => print_history(&app)?,
                "upload" => {
                    let paths: Vec<PathBuf> = parts.map(PathBuf::from).collect();
                    if paths.is_empty() {
                        eprintln!("Usage: /upload PATH...");
                    } else {
                        report_upload(app.upload(&paths).await);
                    }
                }
                other => eprintln!("Unknown command: /{other}"),
            }
            continue;
        }

        let mut sink = TerminalSink::new(std::io::stdout());
        match app.ask(line, &mut sink).await {
            Ok(Reply::NoDocuments) => println!("{}", Reply::NoDocuments.text()),
            Ok(Reply::Answer(answer)) => {
                println!();
                if let Some(notice) = answer.notice {
                    eprintln!("[answer incomplete: {notice}]");
                } else if answer.status == CompletionStatus::Incomplete {
                    eprintln!("[answer cancelled]");
                }
            }
            Err(err) => eprintln!("Error: {err:#}"),
        }
    }

    Ok(())
}

/// Build an index over `files`, answer `question` once, and exit.
pub async fn run_ask(
    config: Config,
    question: &str,
    files: Vec<PathBuf>,
    progress: Box<dyn BuildProgressReporter>,
) -> Result<()> {
    let mut app = ChatApp::new(config, progress)?;
    app.upload(&files).await?;

    let mut sink = TerminalSink::new(std::io::stdout());
    let reply = app.ask(question, &mut sink).await?;
    println!();

    if let Reply::Answer(answer) = reply {
        info!(sources = answer.sources.len(), "answered");
        if let Some(notice) = answer.notice {
            bail!("answer incomplete: {notice}");
        }
    }
    Ok(())
}

fn report_upload(result: Result<BuildReport>) {
    match result {
        Ok(report) => {
            for skipped in &report.skipped {
                warn!(error = %skipped, "document skipped");
                eprintln!("Skipped {}: {}", skipped.document, skipped.kind);
            }
            eprintln!(
                "Indexed {} documents ({} chunks). Ask a question.",
                report.documents, report.chunks
            );
        }
        Err(err) => eprintln!("Upload failed: {err:#}"),
    }
}

fn print_history(app: &ChatApp) -> Result<()> {
    let mut out = std::io::stdout().lock();
    for turn in app.session().transcript().history() {
        let marker = match (turn.role, turn.status) {
            (Role::Assistant, CompletionStatus::Incomplete) => " (incomplete)",
            _ => "",
        };
        writeln!(out, "{}{}: {}", turn.role.as_str(), marker, turn.content)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Provider;
    use crate::progress::SilentProgress;
    use docent_core::session::NO_DOCUMENTS_NOTICE;

    fn offline_config() -> Config {
        let mut config = Config::default();
        config.embedding.provider = Provider::Disabled;
        config.completion.provider = Provider::Disabled;
        config
    }

    #[test]
    fn terminal_sink_writes_fragments() {
        let mut buf = Vec::new();
        {
            let mut sink = TerminalSink::new(&mut buf);
            assert_eq!(sink.on_fragment("Hel", "Hel"), SinkControl::Continue);
            assert_eq!(sink.on_fragment("lo", "Hello"), SinkControl::Continue);
        }
        assert_eq!(buf, b"Hello");
    }

    #[tokio::test]
    async fn idle_app_answers_with_notice() {
        let mut app = ChatApp::new(offline_config(), Box::new(SilentProgress)).unwrap();
        let mut buf = Vec::new();
        let reply = app
            .ask("anything?", &mut TerminalSink::new(&mut buf))
            .await
            .unwrap();
        assert_eq!(reply.text(), NO_DOCUMENTS_NOTICE);
        assert!(buf.is_empty());
        assert!(app.session().transcript().is_empty());
    }

    #[tokio::test]
    async fn failed_upload_leaves_session_idle() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "Some notes.").unwrap();

        let mut app = ChatApp::new(offline_config(), Box::new(SilentProgress)).unwrap();
        let err = app.upload(&[path]).await.unwrap_err();
        assert!(format!("{err:#}").contains("disabled"));
        assert!(!app.session().is_ready());
    }
}
