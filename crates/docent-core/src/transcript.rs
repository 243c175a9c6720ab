//! Role-tagged conversation history with a reserved system slot.
//!
//! Slot 0 of a [`Transcript`] always holds the current system instruction.
//! It is overwritten on every question rather than appended, so the model
//! only ever sees the context retrieved for the latest question. The
//! fields are private; the invariant holds by construction.

use serde::{Deserialize, Serialize};

/// Content of the system turn before the first question is asked.
pub const PLACEHOLDER_SYSTEM: &str = "none";

/// Smallest history limit: one question and its answer.
pub const MIN_HISTORY_TURNS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// Whether an assistant answer arrived in full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompletionStatus {
    #[default]
    Complete,
    /// The stream failed or was cancelled; the content is a prefix of the
    /// intended answer.
    Incomplete,
}

/// One conversation turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
    #[serde(default)]
    pub status: CompletionStatus,
}

impl Turn {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
            status: CompletionStatus::Complete,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            status: CompletionStatus::Complete,
        }
    }

    pub fn assistant(content: impl Into<String>, status: CompletionStatus) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            status,
        }
    }
}

/// Ordered conversation history. Exactly one system turn, at position 0.
///
/// With a history limit, the oldest user/assistant turns are dropped once
/// the limit is exceeded, and the retained history always starts with a
/// user turn.
#[derive(Debug, Clone)]
pub struct Transcript {
    turns: Vec<Turn>,
    max_history: Option<usize>,
}

impl Default for Transcript {
    fn default() -> Self {
        Self::new()
    }
}

impl Transcript {
    /// An unbounded transcript holding only the placeholder system turn.
    pub fn new() -> Self {
        Self {
            turns: vec![Turn::system(PLACEHOLDER_SYSTEM)],
            max_history: None,
        }
    }

    /// Keep at most `max_history` non-system turns. The limit is raised to
    /// two so the latest question and its answer always fit.
    pub fn with_max_history(max_history: usize) -> Self {
        Self {
            turns: vec![Turn::system(PLACEHOLDER_SYSTEM)],
            max_history: Some(max_history.max(MIN_HISTORY_TURNS)),
        }
    }

    /// Overwrite slot 0.
    pub fn set_system(&mut self, content: impl Into<String>) {
        self.turns[0] = Turn::system(content);
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.turns.push(Turn::user(content));
        self.enforce_limit();
    }

    pub fn push_assistant(&mut self, content: impl Into<String>, status: CompletionStatus) {
        self.turns.push(Turn::assistant(content, status));
        self.enforce_limit();
    }

    /// Every turn, system turn first. This is what the model is sent.
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn system(&self) -> &Turn {
        &self.turns[0]
    }

    /// User and assistant turns, oldest first.
    pub fn history(&self) -> &[Turn] {
        &self.turns[1..]
    }

    pub fn last(&self) -> Option<&Turn> {
        self.history().last()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// True when no question has been recorded yet.
    pub fn is_empty(&self) -> bool {
        self.turns.len() == 1
    }

    /// Drop all history and restore the placeholder system turn.
    pub fn clear(&mut self) {
        self.turns.truncate(1);
        self.turns[0] = Turn::system(PLACEHOLDER_SYSTEM);
    }

    fn enforce_limit(&mut self) {
        let Some(max) = self.max_history else {
            return;
        };
        // The turn just pushed is never evicted.
        while self.turns.len() > 2
            && (self.turns.len() - 1 > max || self.turns[1].role != Role::User)
        {
            self.turns.remove(1);
        }
    }
}
