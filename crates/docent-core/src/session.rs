//! The retrieval-augmented conversation loop.
//!
//! A [`Session`] owns the transcript and, once documents have been
//! indexed, a retriever. It is either **idle** (no index: questions get a
//! fixed notice and the model is never called) or **ready** (questions are
//! answered from retrieved context).
//!
//! # Turn sequence (ready)
//!
//! 1. Retrieve the top-k chunks for the question.
//! 2. Join them into a context string.
//! 3. Render the system template with `{context}` and `{question}`.
//! 4. Overwrite transcript slot 0 with that system turn.
//! 5. Append the question as a user turn.
//! 6. Stream a completion over the whole transcript into the sink.
//! 7. Append the trimmed answer as an assistant turn, tagged incomplete if
//!    the stream failed or was cancelled.

use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::completion::{accumulate, CompletionModel, FragmentSink, StreamEnd, StreamOutcome};
use crate::error::{CompletionError, RetrievalError, TemplateError};
use crate::models::Chunk;
use crate::search::{assemble_context, ChunkSearch, DEFAULT_K};
use crate::transcript::{CompletionStatus, Transcript};

/// Answer given while no documents have been indexed.
pub const NO_DOCUMENTS_NOTICE: &str = "No documents processed. Please upload documents.";

/// Default system instruction.
pub const DEFAULT_SYSTEM_TEMPLATE: &str = "\
Welcome to the Assistant!

I am here to assist you with answering questions based on the content of the provided documents.
Here are some ways you can interact with me:

1. Document-Based Question Answering (QA):
   - Ask me any question related to the document content, and I will provide responses based on the information within.

2. Section-Specific Queries:
   - Reference key phrases or topics from the document for specific details.

3. Clarifications:
   - Ask for explanations or clarifications on terms or any part of the document.

Important: All my responses will be based on the document content provided.

Context: {context}

User Question: {question}
";

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{(context|question)\}").expect("placeholder pattern is valid"));

/// System-instruction template with `{context}` and `{question}` slots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    template: String,
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self {
            template: DEFAULT_SYSTEM_TEMPLATE.to_string(),
        }
    }
}

impl PromptTemplate {
    /// Both placeholders must be present.
    pub fn new(template: impl Into<String>) -> Result<Self, TemplateError> {
        let template = template.into();
        for name in ["context", "question"] {
            if !template.contains(&format!("{{{name}}}")) {
                return Err(TemplateError::MissingPlaceholder(name));
            }
        }
        Ok(Self { template })
    }

    /// Substitute both placeholders in a single pass, so braces inside the
    /// context or question are left alone.
    pub fn render(&self, context: &str, question: &str) -> String {
        PLACEHOLDER
            .replace_all(&self.template, |caps: &Captures| match &caps[1] {
                "context" => context.to_string(),
                _ => question.to_string(),
            })
            .into_owned()
    }

    pub fn as_str(&self) -> &str {
        &self.template
    }
}

/// Tunables for a [`Session`].
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Chunks retrieved per question.
    pub k: usize,
    pub template: PromptTemplate,
    /// Limit on user/assistant turns kept in the transcript.
    pub max_history_turns: Option<usize>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            k: DEFAULT_K,
            template: PromptTemplate::default(),
            max_history_turns: None,
        }
    }
}

/// A grounded answer.
#[derive(Debug, Clone)]
pub struct Answer {
    /// Final text, trimmed. Possibly empty when the stream failed early.
    pub text: String,
    pub status: CompletionStatus,
    /// Why the answer is incomplete, when it failed rather than being
    /// cancelled.
    pub notice: Option<CompletionError>,
    /// Retrieved chunks in rank order.
    pub sources: Vec<Chunk>,
    /// The context string injected into the system turn.
    pub context: String,
}

/// Outcome of [`Session::respond`].
#[derive(Debug, Clone)]
pub enum Reply {
    /// The session is idle; nothing was sent to the model.
    NoDocuments,
    Answer(Answer),
}

impl Reply {
    /// Text to show the user.
    pub fn text(&self) -> &str {
        match self {
            Reply::NoDocuments => NO_DOCUMENTS_NOTICE,
            Reply::Answer(answer) => &answer.text,
        }
    }

    pub fn answer(&self) -> Option<&Answer> {
        match self {
            Reply::NoDocuments => None,
            Reply::Answer(answer) => Some(answer),
        }
    }
}

/// A single interactive conversation and its current index.
pub struct Session {
    transcript: Transcript,
    retriever: Option<Box<dyn ChunkSearch>>,
    options: SessionOptions,
}

impl Default for Session {
    fn default() -> Self {
        Self::new(SessionOptions::default())
    }
}

impl Session {
    pub fn new(options: SessionOptions) -> Self {
        Self {
            transcript: new_transcript(&options),
            retriever: None,
            options,
        }
    }

    /// Enter the ready state, replacing any previous index.
    pub fn load_index(&mut self, retriever: impl ChunkSearch + 'static) {
        self.retriever = Some(Box::new(retriever));
    }

    /// Return to the idle state.
    pub fn clear_index(&mut self) {
        self.retriever = None;
    }

    pub fn is_ready(&self) -> bool {
        self.retriever.is_some()
    }

    /// Number of indexed chunks, if ready.
    pub fn indexed_chunks(&self) -> Option<usize> {
        self.retriever.as_ref().map(|r| r.len())
    }

    /// Start a fresh transcript; the index is kept.
    pub fn reset(&mut self) {
        self.transcript = new_transcript(&self.options);
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    /// Answer `question`, streaming fragments into `sink`.
    ///
    /// Retrieval failures are returned as errors and leave the transcript
    /// untouched. Completion failures are not errors: the partial answer is
    /// recorded and reported through [`Answer::notice`].
    pub async fn respond(
        &mut self,
        question: &str,
        model: &dyn CompletionModel,
        sink: &mut dyn FragmentSink,
    ) -> Result<Reply, RetrievalError> {
        let Some(retriever) = self.retriever.as_ref() else {
            return Ok(Reply::NoDocuments);
        };

        let sources = retriever.search(question, self.options.k).await?;
        let context = assemble_context(&sources);
        let instruction = self.options.template.render(&context, question);

        self.transcript.set_system(instruction);
        self.transcript.push_user(question);

        let outcome = match model.stream(self.transcript.turns()).await {
            Ok(stream) => accumulate(stream, sink).await,
            Err(err) => StreamOutcome {
                text: String::new(),
                end: StreamEnd::Failed(err),
            },
        };

        let text = outcome.answer().to_string();
        let status = outcome.status();
        self.transcript.push_assistant(text.clone(), status);

        let notice = match outcome.end {
            StreamEnd::Failed(err) => Some(err),
            StreamEnd::Finished | StreamEnd::Cancelled => None,
        };

        Ok(Reply::Answer(Answer {
            text,
            status,
            notice,
            sources,
            context,
        }))
    }
}

fn new_transcript(options: &SessionOptions) -> Transcript {
    match options.max_history_turns {
        Some(max) => Transcript::with_max_history(max),
        None => Transcript::new(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::completion::{NullSink, SinkControl};
    use crate::index::{FlatIndex, Metric};
    use crate::search::Retriever;
    use crate::testing::{Script, ScriptedModel, TableEmbedder};
    use crate::transcript::Role;

    const PARIS: &str = "Paris is the capital of France.";
    const QUESTION: &str = "What is the capital of France?";

    fn paris_retriever() -> Retriever {
        let embedder = Arc::new(TableEmbedder::new(&[
            (PARIS, vec![1.0, 0.0]),
            ("Bananas are yellow.", vec![0.0, 1.0]),
            (QUESTION, vec![0.9, 0.1]),
            ("Second question?", vec![0.2, 0.8]),
        ]));
        let pairs = vec![
            (Chunk::new("facts.txt", 0, PARIS), vec![1.0, 0.0]),
            (Chunk::new("facts.txt", 1, "Bananas are yellow."), vec![0.0, 1.0]),
        ];
        let index = FlatIndex::from_entries(pairs, Metric::Cosine).unwrap();
        Retriever::new(index, embedder)
    }

    fn ready_session(k: usize) -> Session {
        let mut session = Session::new(SessionOptions {
            k,
            ..SessionOptions::default()
        });
        session.load_index(paris_retriever());
        session
    }

    #[test]
    fn template_renders_both_placeholders_once() {
        let t = PromptTemplate::new("C={context} Q={question}").unwrap();
        assert_eq!(t.render("ctx with {question}", "why?"), "C=ctx with {question} Q=why?");
    }

    #[test]
    fn template_requires_placeholders() {
        assert_eq!(
            PromptTemplate::new("only {context}"),
            Err(TemplateError::MissingPlaceholder("question"))
        );
        assert_eq!(
            PromptTemplate::new("only {question}"),
            Err(TemplateError::MissingPlaceholder("context"))
        );
        assert!(PromptTemplate::new(DEFAULT_SYSTEM_TEMPLATE).is_ok());
    }

    #[tokio::test]
    async fn idle_session_never_calls_the_model() {
        let mut session = Session::default();
        let model = ScriptedModel::texts(&["should not be used"]);
        let reply = session.respond(QUESTION, &model, &mut NullSink).await.unwrap();

        assert!(matches!(reply, Reply::NoDocuments));
        assert_eq!(reply.text(), NO_DOCUMENTS_NOTICE);
        assert_eq!(model.request_count(), 0);
        assert!(session.transcript().is_empty());
    }

    #[tokio::test]
    async fn grounded_answer_uses_retrieved_context() {
        let mut session = ready_session(1);
        let model = ScriptedModel::texts(&[" The capital", " is Paris. "]);
        let mut shown = String::new();
        let mut sink = |fragment: &str, _: &str| {
            shown.push_str(fragment);
            SinkControl::Continue
        };
        let reply = session.respond(QUESTION, &model, &mut sink).await.unwrap();

        let answer = reply.answer().unwrap();
        assert_eq!(answer.text, "The capital is Paris.");
        assert_eq!(answer.status, CompletionStatus::Complete);
        assert!(answer.notice.is_none());
        assert_eq!(answer.context, PARIS);
        assert_eq!(answer.sources.len(), 1);
        assert_eq!(shown, " The capital is Paris. ");

        let sent = model.last_request();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].role, Role::System);
        assert!(sent[0].content.contains(PARIS));
        assert!(sent[0].content.contains(&format!("User Question: {QUESTION}")));
        assert_eq!(sent[1].role, Role::User);
        assert_eq!(sent[1].content, QUESTION);

        let history = session.transcript().history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].role, Role::Assistant);
        assert_eq!(history[1].content, "The capital is Paris.");
    }

    #[tokio::test]
    async fn exactly_one_system_turn_after_many_questions() {
        let mut session = ready_session(2);
        let model = ScriptedModel::texts(&["ok"]);
        for question in [QUESTION, "Second question?", QUESTION] {
            session.respond(question, &model, &mut NullSink).await.unwrap();
            let turns = session.transcript().turns();
            assert_eq!(turns[0].role, Role::System);
            assert_eq!(turns.iter().filter(|t| t.role == Role::System).count(), 1);
        }
        assert_eq!(session.transcript().history().len(), 6);
        // The model sees the whole conversation on the last call.
        assert_eq!(model.last_request().len(), 6);
    }

    #[tokio::test]
    async fn mid_stream_failure_keeps_partial_answer() {
        let mut session = ready_session(1);
        let model = ScriptedModel::new(vec![
            Script::Text("Paris"),
            Script::Text(" is"),
            Script::Fail(CompletionError::Truncated),
        ]);
        let reply = session.respond(QUESTION, &model, &mut NullSink).await.unwrap();
        let answer = reply.answer().unwrap();

        assert_eq!(answer.text, "Paris is");
        assert_eq!(answer.status, CompletionStatus::Incomplete);
        assert!(matches!(answer.notice, Some(CompletionError::Truncated)));
        let last = session.transcript().last().unwrap();
        assert_eq!(last.content, "Paris is");
        assert_eq!(last.status, CompletionStatus::Incomplete);
    }

    #[tokio::test]
    async fn failure_to_open_records_empty_incomplete_answer() {
        let mut session = ready_session(1);
        let model = ScriptedModel::failing_to_open(CompletionError::Status {
            status: 401,
            body: "bad key".into(),
        });
        let reply = session.respond(QUESTION, &model, &mut NullSink).await.unwrap();
        let answer = reply.answer().unwrap();

        assert_eq!(answer.text, "");
        assert_eq!(answer.status, CompletionStatus::Incomplete);
        assert!(matches!(
            answer.notice,
            Some(CompletionError::Status { status: 401, .. })
        ));
        assert_eq!(session.transcript().history().len(), 2);
    }

    #[tokio::test]
    async fn cancelled_stream_is_incomplete_without_notice() {
        let mut session = ready_session(1);
        let model = ScriptedModel::texts(&["one", "two", "three"]);
        let mut sink = |_: &str, _: &str| SinkControl::Stop;
        let reply = session.respond(QUESTION, &model, &mut sink).await.unwrap();
        let answer = reply.answer().unwrap();
        assert_eq!(answer.text, "one");
        assert_eq!(answer.status, CompletionStatus::Incomplete);
        assert!(answer.notice.is_none());
    }

    #[tokio::test]
    async fn retrieval_failure_leaves_transcript_untouched() {
        let mut session = ready_session(1);
        let model = ScriptedModel::texts(&["unused"]);
        let err = session
            .respond("a question the embedder does not know", &model, &mut NullSink)
            .await
            .unwrap_err();
        assert!(matches!(err, RetrievalError::Embedding(_)));
        assert!(session.transcript().is_empty());
        assert_eq!(model.request_count(), 0);
    }

    #[tokio::test]
    async fn clearing_the_index_returns_to_idle() {
        let mut session = ready_session(1);
        assert!(session.is_ready());
        assert_eq!(session.indexed_chunks(), Some(2));
        session.clear_index();
        assert!(!session.is_ready());
        let model = ScriptedModel::texts(&["unused"]);
        let reply = session.respond(QUESTION, &model, &mut NullSink).await.unwrap();
        assert!(matches!(reply, Reply::NoDocuments));
    }

    #[tokio::test]
    async fn history_limit_applies_to_session_transcript() {
        let mut session = Session::new(SessionOptions {
            k: 1,
            max_history_turns: Some(2),
            ..SessionOptions::default()
        });
        session.load_index(paris_retriever());
        let model = ScriptedModel::texts(&["answer"]);
        session.respond(QUESTION, &model, &mut NullSink).await.unwrap();
        session.respond("Second question?", &model, &mut NullSink).await.unwrap();

        let history = session.transcript().history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].content, "Second question?");
        assert!(session.transcript().system().content.contains("Bananas are yellow."));
    }

    #[tokio::test]
    async fn zero_history_limit_still_sends_and_records_the_exchange() {
        let mut session = Session::new(SessionOptions {
            k: 1,
            max_history_turns: Some(0),
            ..SessionOptions::default()
        });
        assert_eq!(session.options().max_history_turns, Some(0));
        session.load_index(paris_retriever());
        let model = ScriptedModel::texts(&["Paris."]);
        session.respond(QUESTION, &model, &mut NullSink).await.unwrap();

        let sent: Vec<Role> = model.last_request().iter().map(|t| t.role).collect();
        assert_eq!(sent, vec![Role::System, Role::User]);
        let history = session.transcript().history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].content, QUESTION);
        assert_eq!(history[1].content, "Paris.");
    }

    #[tokio::test]
    async fn reset_keeps_the_index() {
        let mut session = ready_session(1);
        let model = ScriptedModel::texts(&["x"]);
        session.respond(QUESTION, &model, &mut NullSink).await.unwrap();
        session.reset();
        assert!(session.transcript().is_empty());
        assert!(session.is_ready());
    }
}
