//! Single-flight stream driver for one chat panel.
//!
//! A [`ChatSession`] owns the conversation state of one panel (end-user chat
//! or admin document assistant), submits questions, and pumps the decoded
//! event stream into the reducer. At most one stream per session is
//! outstanding: submissions while a stream is in flight are no-ops. The gate
//! is client-side only; the server stays the source of truth for any
//! idempotency across tabs or processes.

use crate::client::{CancelHandle, FaqClient};
use crate::conversation::{Conversation, MessageId, Rating};
use crate::Result;
use futures::StreamExt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::Mutex;
use tracing::warn;

/// Which backend panel this session talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionKind {
    /// `POST /api/chat`, body `{question, conversation_history}`.
    EndUser,
    /// `POST /api/admin/agent/chat`, body `{message, conversation_history}`.
    AdminAgent,
}

/// What happened to one submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Stream ran to completion; the assistant message is closed.
    Completed(MessageId),
    /// Request or stream failed; the message carries the fixed error text.
    Failed(MessageId),
    /// Another stream was in flight; nothing was submitted.
    Busy,
    /// Blank input; nothing was submitted.
    Ignored,
}

/// Clears the in-flight flag on every exit path, including panics and
/// cancellation, so the gate cannot get stuck.
struct FlightGuard<'a>(&'a AtomicBool);

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct ChatSession {
    client: Arc<FaqClient>,
    kind: SessionKind,
    conversation: Mutex<Conversation>,
    in_flight: AtomicBool,
    cancel: StdMutex<Option<CancelHandle>>,
}

impl ChatSession {
    pub fn end_user(client: Arc<FaqClient>) -> Self {
        Self::new(client, SessionKind::EndUser)
    }

    pub fn admin_agent(client: Arc<FaqClient>) -> Self {
        Self::new(client, SessionKind::AdminAgent)
    }

    fn new(client: Arc<FaqClient>, kind: SessionKind) -> Self {
        Self {
            client,
            kind,
            conversation: Mutex::new(Conversation::new()),
            in_flight: AtomicBool::new(false),
            cancel: StdMutex::new(None),
        }
    }

    pub fn kind(&self) -> SessionKind {
        self.kind
    }

    pub fn is_loading(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Snapshot of the conversation for rendering.
    pub async fn conversation(&self) -> Conversation {
        self.conversation.lock().await.clone()
    }

    /// Submit a question (or a suggestion-chip click) and drive the stream to
    /// its end. Returns once the assistant message is closed.
    pub async fn submit(&self, text: &str) -> SubmitOutcome {
        let text = text.trim();
        if text.is_empty() {
            return SubmitOutcome::Ignored;
        }

        // The gate flips before the request starts and a drop guard clears
        // it on success, failure and cancellation alike.
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return SubmitOutcome::Busy;
        }
        let _guard = FlightGuard(&self.in_flight);

        let (id, history) = {
            let mut conversation = self.conversation.lock().await;
            // History reflects the turns before this exchange.
            let history = conversation.history();
            (conversation.begin_exchange(text), history)
        };

        let opened = match self.kind {
            SessionKind::EndUser => self.client.chat_stream_with_cancel(text, &history).await,
            SessionKind::AdminAgent => {
                self.client
                    .admin_agent_stream_with_cancel(text, &history)
                    .await
            }
        };

        let (mut events, cancel) = match opened {
            Ok(pair) => pair,
            Err(e) => {
                warn!(error = %e, "chat request failed");
                self.conversation.lock().await.fail(id);
                return SubmitOutcome::Failed(id);
            }
        };
        *self.cancel.lock().unwrap() = Some(cancel);

        let outcome = loop {
            match events.next().await {
                Some(Ok(event)) => {
                    self.conversation.lock().await.apply(id, &event);
                }
                Some(Err(e)) => {
                    warn!(error = %e, "stream failed mid-flight");
                    self.conversation.lock().await.fail(id);
                    break SubmitOutcome::Failed(id);
                }
                None => {
                    // Covers both a clean terminal and a cancelled stream.
                    self.conversation.lock().await.complete(id);
                    break SubmitOutcome::Completed(id);
                }
            }
        };

        self.cancel.lock().unwrap().take();
        outcome
    }

    /// Stop the in-flight stream, if any. The submission then completes with
    /// whatever content had accumulated.
    pub fn cancel_current(&self) {
        if let Some(handle) = self.cancel.lock().unwrap().as_ref() {
            handle.cancel();
        }
    }

    /// Send thumbs-up/down for an answered message and mirror it locally.
    /// Messages without a chat id (admin panel, errored streams) are skipped.
    pub async fn send_feedback(&self, id: MessageId, rating: Rating) -> Result<()> {
        let chat_id = {
            let conversation = self.conversation.lock().await;
            match conversation.message(id).and_then(|m| m.chat_id.clone()) {
                Some(chat_id) => chat_id,
                None => return Ok(()),
            }
        };
        self.client.send_feedback(&chat_id, rating).await?;
        self.conversation.lock().await.record_feedback(id, rating);
        Ok(())
    }

    /// Suggested questions for the empty panel; empty on failure.
    pub async fn suggestions(&self) -> Vec<String> {
        match self.client.suggestions().await {
            Ok(suggestions) => suggestions,
            Err(e) => {
                warn!(error = %e, "failed to fetch suggestions");
                Vec::new()
            }
        }
    }
}
