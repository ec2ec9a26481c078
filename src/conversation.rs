//! Conversation state reduction.
//!
//! A [`Conversation`] is an ordered list of [`Message`] records folded from
//! decoded [`StreamEvent`]s. Reduction is deterministic: applying the same
//! ordered event list from the same initial state always produces the same
//! final state, which keeps every transition unit-testable without any I/O.
//!
//! Messages are owned exclusively by the conversation; consumers render
//! snapshots read-only. Events are routed by the [`MessageId`] captured at
//! submission time, never by "last message", so unrelated mutations cannot
//! corrupt an in-flight answer.

use crate::stream::events::{AgentStep, Reference, StepStatus, StreamEvent};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Fixed user-facing text injected when a stream fails mid-flight. Partial
/// content is fully overwritten, not appended to.
pub const STREAM_ERROR_MESSAGE: &str =
    "エラーが発生しました。しばらくしてからもう一度お試しください。";

/// How many prior turns are sent back to the server as context.
pub const HISTORY_WINDOW: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageId(Uuid);

impl MessageId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

/// Lifecycle of a streamed assistant message. No transition leaves
/// `Complete` or `Errored`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamPhase {
    /// Created, no tokens yet.
    Pending,
    /// Events arriving; content may stay empty while only steps occur.
    Streaming,
    /// Terminal received or stream ended.
    Complete,
    /// The decoder or transport failed.
    Errored,
}

/// User feedback on an answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rating {
    Good,
    Bad,
}

/// One turn of the conversation, user or assistant.
#[derive(Debug, Clone)]
pub struct Message {
    pub id: MessageId,
    pub role: MessageRole,
    pub content: String,
    pub steps: Vec<AgentStep>,
    pub downloads: Vec<String>,
    pub timestamp: DateTime<Utc>,
    pub chat_id: Option<String>,
    pub references: Vec<Reference>,
    pub avg_similarity: Option<f64>,
    pub followups: Vec<String>,
    pub feedback: Option<Rating>,
    pub phase: StreamPhase,
}

impl Message {
    fn new(role: MessageRole, content: String, phase: StreamPhase) -> Self {
        Self {
            id: MessageId::new(),
            role,
            content,
            steps: Vec::new(),
            downloads: Vec::new(),
            timestamp: Utc::now(),
            chat_id: None,
            references: Vec::new(),
            avg_similarity: None,
            followups: Vec::new(),
            feedback: None,
            phase,
        }
    }

    /// Still accepting events?
    pub fn is_open(&self) -> bool {
        matches!(self.phase, StreamPhase::Pending | StreamPhase::Streaming)
    }
}

/// One `{role, content}` pair of the request-body history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryTurn {
    pub role: MessageRole,
    pub content: String,
}

/// Ordered message list plus the reduction rules that mutate it.
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn message(&self, id: MessageId) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }

    /// Push an immutable user message and its paired empty assistant message.
    /// Returns the assistant id; every event of the stream is applied to it.
    pub fn begin_exchange(&mut self, question: &str) -> MessageId {
        self.messages.push(Message::new(
            MessageRole::User,
            question.trim().to_string(),
            StreamPhase::Complete,
        ));
        let assistant = Message::new(MessageRole::Assistant, String::new(), StreamPhase::Pending);
        let id = assistant.id;
        self.messages.push(assistant);
        id
    }

    /// Apply one decoded event to the message captured at submission time.
    /// Events addressed to an unknown or already-closed message are ignored.
    pub fn apply(&mut self, id: MessageId, event: &StreamEvent) {
        let Some(message) = self.messages.iter_mut().find(|m| m.id == id) else {
            return;
        };
        if !message.is_open() {
            return;
        }

        match event {
            StreamEvent::Token { text } => {
                message.content.push_str(text);
                message.phase = StreamPhase::Streaming;
            }
            StreamEvent::Step(step) => {
                apply_step(&mut message.steps, step);
                message.phase = StreamPhase::Streaming;
            }
            StreamEvent::Download { filename } => {
                message.downloads.push(filename.clone());
                message.phase = StreamPhase::Streaming;
            }
            StreamEvent::Terminal(outcome) => {
                if !outcome.chat_id.is_empty() {
                    message.chat_id = Some(outcome.chat_id.clone());
                }
                message.references = outcome.references.clone();
                message.avg_similarity = outcome.avg_similarity;
                message.followups = outcome.followups.clone();
                message.phase = StreamPhase::Complete;
            }
        }
    }

    /// Mark a stream that ended without a terminal frame (admin agent, or a
    /// server that closed early) as complete.
    pub fn complete(&mut self, id: MessageId) {
        if let Some(message) = self.messages.iter_mut().find(|m| m.id == id) {
            if message.is_open() {
                message.phase = StreamPhase::Complete;
            }
        }
    }

    /// Error-overwrite: whatever partial content accumulated is replaced by
    /// the fixed error string, and the message closes as `Errored`.
    pub fn fail(&mut self, id: MessageId) {
        if let Some(message) = self.messages.iter_mut().find(|m| m.id == id) {
            if message.is_open() {
                message.content = STREAM_ERROR_MESSAGE.to_string();
                message.phase = StreamPhase::Errored;
            }
        }
    }

    pub fn record_feedback(&mut self, id: MessageId, rating: Rating) {
        if let Some(message) = self.messages.iter_mut().find(|m| m.id == id) {
            message.feedback = Some(rating);
        }
    }

    /// The context window sent with the next question: the last
    /// [`HISTORY_WINDOW`] turns that have content.
    pub fn history(&self) -> Vec<HistoryTurn> {
        let turns: Vec<HistoryTurn> = self
            .messages
            .iter()
            .filter(|m| !m.content.is_empty())
            .map(|m| HistoryTurn {
                role: m.role,
                content: m.content.clone(),
            })
            .collect();
        let skip = turns.len().saturating_sub(HISTORY_WINDOW);
        turns.into_iter().skip(skip).collect()
    }
}

/// Last-match step correlation.
///
/// `Running` entries append unconditionally (several tools can be in flight).
/// A `Done` entry replaces, in place, the *last* `Running` entry with the
/// same tool name; with no match it appends as a new entry rather than being
/// dropped. Position is preserved so the rendered timeline keeps its order.
fn apply_step(steps: &mut Vec<AgentStep>, step: &AgentStep) {
    match step.status {
        StepStatus::Running => steps.push(step.clone()),
        StepStatus::Done => {
            let idx = steps
                .iter()
                .rposition(|s| s.tool == step.tool && s.status == StepStatus::Running);
            match idx {
                Some(i) => steps[i] = step.clone(),
                None => steps.push(step.clone()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::events::ChatOutcome;

    fn running(tool: &str) -> StreamEvent {
        StreamEvent::Step(AgentStep {
            tool: tool.to_string(),
            status: StepStatus::Running,
            label: None,
            summary: None,
            input: None,
        })
    }

    fn done(tool: &str, summary: &str) -> StreamEvent {
        StreamEvent::Step(AgentStep {
            tool: tool.to_string(),
            status: StepStatus::Done,
            label: None,
            summary: Some(summary.to_string()),
            input: None,
        })
    }

    fn token(text: &str) -> StreamEvent {
        StreamEvent::Token {
            text: text.to_string(),
        }
    }

    #[test]
    fn tokens_accumulate_in_order() {
        let mut conv = Conversation::new();
        let id = conv.begin_exchange("有給休暇の残日数の確認方法は？");
        conv.apply(id, &token("休暇"));
        conv.apply(id, &token("は..."));
        assert_eq!(conv.message(id).unwrap().content, "休暇は...");
        assert_eq!(conv.message(id).unwrap().phase, StreamPhase::Streaming);
    }

    #[test]
    fn done_replaces_last_running_entry_in_place() {
        let mut conv = Conversation::new();
        let id = conv.begin_exchange("q");
        conv.apply(id, &running("search_knowledge"));
        conv.apply(id, &running("list_documents"));
        conv.apply(id, &done("search_knowledge", "3件参照"));

        let steps = &conv.message(id).unwrap().steps;
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].tool, "search_knowledge");
        assert_eq!(steps[0].status, StepStatus::Done);
        assert_eq!(steps[0].summary.as_deref(), Some("3件参照"));
        assert_eq!(steps[1].tool, "list_documents");
        assert_eq!(steps[1].status, StepStatus::Running);
    }

    #[test]
    fn repeated_same_tool_matches_backwards() {
        let mut conv = Conversation::new();
        let id = conv.begin_exchange("q");
        conv.apply(id, &running("search_knowledge"));
        conv.apply(id, &running("search_knowledge"));
        conv.apply(id, &done("search_knowledge", "later call"));

        let steps = &conv.message(id).unwrap().steps;
        assert_eq!(steps[0].status, StepStatus::Running);
        assert_eq!(steps[1].status, StepStatus::Done);
        assert_eq!(steps[1].summary.as_deref(), Some("later call"));
    }

    #[test]
    fn orphan_done_appends_instead_of_dropping() {
        let mut conv = Conversation::new();
        let id = conv.begin_exchange("q");
        conv.apply(id, &done("get_document_detail", "直接完了"));

        let steps = &conv.message(id).unwrap().steps;
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].status, StepStatus::Done);
    }

    #[test]
    fn terminal_merges_metadata_and_closes() {
        let mut conv = Conversation::new();
        let id = conv.begin_exchange("q");
        conv.apply(id, &token("答え"));
        conv.apply(
            id,
            &StreamEvent::Terminal(ChatOutcome {
                chat_id: "c1".to_string(),
                references: vec![Reference {
                    id: "d1".to_string(),
                    title: "規定.pdf".to_string(),
                    ..Default::default()
                }],
                avg_similarity: Some(0.82),
                followups: vec!["関連する質問？".to_string()],
            }),
        );

        let msg = conv.message(id).unwrap();
        assert_eq!(msg.phase, StreamPhase::Complete);
        assert_eq!(msg.chat_id.as_deref(), Some("c1"));
        assert_eq!(msg.references.len(), 1);
        assert_eq!(msg.avg_similarity, Some(0.82));
        assert_eq!(msg.followups.len(), 1);
        // Closed message ignores further events.
        conv.apply(id, &token("余分"));
        assert_eq!(conv.message(id).unwrap().content, "答え");
    }

    #[test]
    fn fail_overwrites_partial_content_exactly() {
        let mut conv = Conversation::new();
        let id = conv.begin_exchange("q");
        conv.apply(id, &token("a"));
        conv.apply(id, &token("b"));
        conv.apply(id, &token("c"));
        conv.fail(id);

        let msg = conv.message(id).unwrap();
        assert_eq!(msg.content, STREAM_ERROR_MESSAGE);
        assert_eq!(msg.phase, StreamPhase::Errored);
        // No transition out of Errored.
        conv.apply(id, &token("d"));
        conv.complete(id);
        assert_eq!(conv.message(id).unwrap().content, STREAM_ERROR_MESSAGE);
        assert_eq!(conv.message(id).unwrap().phase, StreamPhase::Errored);
    }

    #[test]
    fn replaying_the_same_events_is_deterministic() {
        let events = vec![
            running("search_knowledge"),
            token("休暇"),
            token("は..."),
            done("search_knowledge", "3件参照"),
        ];

        let run = || {
            let mut conv = Conversation::new();
            let id = conv.begin_exchange("q");
            for e in &events {
                conv.apply(id, e);
            }
            let m = conv.message(id).unwrap();
            (m.content.clone(), m.steps.clone())
        };

        assert_eq!(run(), run());
    }

    #[test]
    fn history_caps_at_window_and_skips_empty() {
        let mut conv = Conversation::new();
        for i in 0..8 {
            let id = conv.begin_exchange(&format!("q{i}"));
            if i < 7 {
                conv.apply(id, &token(&format!("a{i}")));
            }
            conv.complete(id);
        }
        // 8 user turns + 7 non-empty assistant turns = 15 with content.
        let history = conv.history();
        assert_eq!(history.len(), HISTORY_WINDOW);
        assert_eq!(history.first().unwrap().content, "a2");
        assert_eq!(history.last().unwrap().content, "q7");
        assert!(history.iter().all(|t| !t.content.is_empty()));
    }

    #[test]
    fn downloads_append_in_order() {
        let mut conv = Conversation::new();
        let id = conv.begin_exchange("手順書を作成して");
        conv.apply(
            id,
            &StreamEvent::Download {
                filename: "手順書.docx".to_string(),
            },
        );
        conv.apply(
            id,
            &StreamEvent::Download {
                filename: "別紙.xlsx".to_string(),
            },
        );
        assert_eq!(
            conv.message(id).unwrap().downloads,
            vec!["手順書.docx", "別紙.xlsx"]
        );
    }

    #[test]
    fn feedback_is_recorded_on_the_message() {
        let mut conv = Conversation::new();
        let id = conv.begin_exchange("q");
        conv.complete(id);
        conv.record_feedback(id, Rating::Good);
        assert_eq!(conv.message(id).unwrap().feedback, Some(Rating::Good));
    }
}
