//! Typed wire events.
//!
//! The wire format overloads a single JSON object with optional fields; a
//! frame is re-modelled as proper variants here, at the decoder boundary, so
//! nothing downstream ever touches a loosely-typed `serde_json::Value`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One decoded event from a chat or admin-agent stream.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Incremental text fragment to append to the in-flight answer.
    Token { text: String },
    /// Tool-invocation lifecycle marker.
    Step(AgentStep),
    /// A generated artifact is ready (admin agent only).
    Download { filename: String },
    /// Final metadata; the stream ends after this (end-user chat only).
    Terminal(ChatOutcome),
}

/// Lifecycle of one backend tool invocation.
///
/// There is no server-supplied correlation id: a `Done` marker is matched to
/// the most recent unmatched `Running` entry for the same tool name. Two
/// truly concurrent invocations of the identical tool are therefore
/// ambiguous; the wire protocol would need a step id to disambiguate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentStep {
    pub tool: String,
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Running,
    Done,
}

/// Terminal metadata of an end-user chat answer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatOutcome {
    #[serde(default)]
    pub chat_id: String,
    #[serde(default)]
    pub references: Vec<Reference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avg_similarity: Option<f64>,
    #[serde(default)]
    pub followups: Vec<String>,
}

/// Opaque citation metadata, passed through verbatim to the render layer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Reference {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub similarity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub excerpt: Option<String>,
}

/// Field-driven frame dispatcher.
///
/// One parsed frame may carry several of `step`, `token`, `download` and
/// `done` and then yields one event per present field, in that order. A
/// `chat_id` field without `done` is a side channel: the id is remembered and
/// folded into the eventual [`StreamEvent::Terminal`].
#[derive(Debug, Default)]
pub struct EventParser {
    chat_id: Option<String>,
}

impl EventParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dispatch(&mut self, frame: &Value) -> Vec<StreamEvent> {
        let mut events = Vec::new();

        if let Some(raw) = frame.get("step") {
            match serde_json::from_value::<AgentStep>(raw.clone()) {
                Ok(step) => events.push(StreamEvent::Step(step)),
                Err(e) => tracing::debug!(error = %e, "skipping malformed step field"),
            }
        }

        if let Some(text) = frame.get("token").and_then(Value::as_str) {
            events.push(StreamEvent::Token {
                text: text.to_string(),
            });
        }

        if let Some(filename) = frame
            .get("download")
            .and_then(|d| d.get("filename"))
            .and_then(Value::as_str)
        {
            events.push(StreamEvent::Download {
                filename: filename.to_string(),
            });
        }

        if frame.get("done").and_then(Value::as_bool).unwrap_or(false) {
            events.push(StreamEvent::Terminal(self.outcome_from(frame)));
        } else if let Some(id) = frame.get("chat_id").and_then(Value::as_str) {
            self.chat_id = Some(id.to_string());
        }

        events
    }

    /// Called at end of stream. A pending `chat_id` with no `done` frame
    /// still has to reach the message, exactly like the original client's
    /// generator return value did.
    pub fn finish(&mut self) -> Option<StreamEvent> {
        self.chat_id.take().map(|chat_id| {
            StreamEvent::Terminal(ChatOutcome {
                chat_id,
                ..ChatOutcome::default()
            })
        })
    }

    fn outcome_from(&mut self, frame: &Value) -> ChatOutcome {
        // The side channel is consumed either way, so EOF cannot produce a
        // second terminal after a done frame.
        let stored = self.chat_id.take();
        let chat_id = frame
            .get("chat_id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or(stored)
            .unwrap_or_default();
        let references = frame
            .get("references")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default();
        let followups = frame
            .get("followups")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default();
        ChatOutcome {
            chat_id,
            references,
            avg_similarity: frame.get("avg_similarity").and_then(Value::as_f64),
            followups,
        }
    }
}
