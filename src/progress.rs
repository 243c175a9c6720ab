//! Index build progress reporting.
//!
//! Reports what the build pipeline is doing (extracting, chunking,
//! embedding) so users see how much is left before they can ask questions.
//! Progress is emitted on **stderr** so stdout stays reserved for answers.

use std::io::Write;

/// A single progress event during an index build.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BuildProgressEvent {
    /// Extracting text from document `n` of `total`.
    Extracting { document: String, n: u64, total: u64 },
    /// Chunking finished for the batch.
    Chunked { chunks: u64 },
    /// `n` of `total` chunks embedded so far.
    Embedding { n: u64, total: u64 },
    /// Index ready.
    Ready { documents: u64, chunks: u64 },
}

/// Receives build progress events.
pub trait BuildProgressReporter: Send + Sync {
    fn report(&self, event: BuildProgressEvent);
}

/// Human-friendly progress on stderr: "embedding  1,234 / 5,000 chunks".
pub struct StderrProgress;

impl BuildProgressReporter for StderrProgress {
    fn report(&self, event: BuildProgressEvent) {
        let line = match &event {
            BuildProgressEvent::Extracting { document, n, total } => {
                format!("extracting  {} / {}  {}\n", n, total, document)
            }
            BuildProgressEvent::Chunked { chunks } => {
                format!("chunked  {} chunks\n", format_number(*chunks))
            }
            BuildProgressEvent::Embedding { n, total } => {
                format!(
                    "embedding  {} / {} chunks\n",
                    format_number(*n),
                    format_number(*total)
                )
            }
            BuildProgressEvent::Ready { documents, chunks } => {
                format!(
                    "ready  {} documents, {} chunks\n",
                    format_number(*documents),
                    format_number(*chunks)
                )
            }
        };
        let mut stderr = std::io::stderr().lock();
        let _ = stderr.write_all(line.as_bytes());
        let _ = stderr.flush();
    }
}

/// No-op reporter for scripted commands and tests.
pub struct SilentProgress;

impl BuildProgressReporter for SilentProgress {
    fn report(&self, _event: BuildProgressEvent) {}
}

/// Whether build progress is shown.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
}

impl ProgressMode {
    /// Human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Box<dyn BuildProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(SilentProgress),
            ProgressMode::Human => Box::new(StderrProgress),
        }
    }
}

pub fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}
