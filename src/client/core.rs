use crate::client::types::{cancel_pair, CancelHandle};
use crate::conversation::{HistoryTurn, Rating};
use crate::stream::decode::decode_events;
use crate::stream::events::StreamEvent;
use crate::transport::HttpTransport;
use crate::{BoxStream, Error, Result};
use bytes::Bytes;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

const CHAT_ENDPOINT: &str = "/api/chat";
const ADMIN_AGENT_ENDPOINT: &str = "/api/admin/agent/chat";
const FEEDBACK_ENDPOINT: &str = "/api/feedback";
const SUGGESTIONS_ENDPOINT: &str = "/api/chat/suggestions";

/// Client for the Tomoe FAQ backend.
///
/// Cheap to clone via [`Arc`]; one instance serves both the end-user chat
/// panel and the admin document assistant, which are otherwise fully
/// isolated consumers.
#[derive(Clone)]
pub struct FaqClient {
    pub(crate) transport: Arc<HttpTransport>,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    question: &'a str,
    conversation_history: &'a [HistoryTurn],
}

#[derive(Serialize)]
struct AdminChatRequest<'a> {
    message: &'a str,
    conversation_history: &'a [HistoryTurn],
}

#[derive(Serialize)]
struct FeedbackRequest<'a> {
    chat_id: &'a str,
    feedback: Rating,
}

#[derive(Deserialize)]
struct SuggestionsResponse {
    #[serde(default)]
    suggestions: Vec<String>,
}

impl FaqClient {
    /// Open an end-user chat stream.
    ///
    /// Single-attempt semantics: no retry happens inside the decoder; a
    /// caller that wants another answer issues a new request.
    pub async fn chat_stream(
        &self,
        question: &str,
        history: &[HistoryTurn],
    ) -> Result<BoxStream<'static, StreamEvent>> {
        let (stream, _cancel) = self.chat_stream_with_cancel(question, history).await?;
        Ok(stream)
    }

    /// Open an end-user chat stream plus a handle to stop it early.
    pub async fn chat_stream_with_cancel(
        &self,
        question: &str,
        history: &[HistoryTurn],
    ) -> Result<(BoxStream<'static, StreamEvent>, CancelHandle)> {
        info!(turns = history.len(), "opening chat stream");
        let body = ChatRequest {
            question,
            conversation_history: history,
        };
        let bytes = self.transport.post_stream(CHAT_ENDPOINT, &body).await?;
        Ok(Self::cancellable(decode_events(bytes)))
    }

    /// Open an admin document-assistant stream. Same framing as the chat
    /// stream, but frames may carry `download` and never carry `done`.
    pub async fn admin_agent_stream(
        &self,
        message: &str,
        history: &[HistoryTurn],
    ) -> Result<BoxStream<'static, StreamEvent>> {
        let (stream, _cancel) = self.admin_agent_stream_with_cancel(message, history).await?;
        Ok(stream)
    }

    pub async fn admin_agent_stream_with_cancel(
        &self,
        message: &str,
        history: &[HistoryTurn],
    ) -> Result<(BoxStream<'static, StreamEvent>, CancelHandle)> {
        info!(turns = history.len(), "opening admin agent stream");
        let body = AdminChatRequest {
            message,
            conversation_history: history,
        };
        let bytes = self
            .transport
            .post_stream(ADMIN_AGENT_ENDPOINT, &body)
            .await?;
        Ok(Self::cancellable(decode_events(bytes)))
    }

    fn cancellable(
        events: BoxStream<'static, StreamEvent>,
    ) -> (BoxStream<'static, StreamEvent>, CancelHandle) {
        let (handle, token) = cancel_pair();
        let stream = events.take_until(token.cancelled_owned());
        (Box::pin(stream), handle)
    }

    /// Report thumbs-up/down for an answered chat.
    pub async fn send_feedback(&self, chat_id: &str, rating: Rating) -> Result<()> {
        let body = FeedbackRequest {
            chat_id,
            feedback: rating,
        };
        let _: serde_json::Value = self.transport.post_json(FEEDBACK_ENDPOINT, &body).await?;
        Ok(())
    }

    /// Suggested questions for the empty chat panel.
    ///
    /// Degrades to an empty list on a non-2xx response; suggestions are
    /// decorative and must never block the panel.
    pub async fn suggestions(&self) -> Result<Vec<String>> {
        match self
            .transport
            .get_json::<SuggestionsResponse>(SUGGESTIONS_ENDPOINT)
            .await
        {
            Ok(resp) => Ok(resp.suggestions),
            Err(Error::Http { status, .. }) => {
                warn!(status, "suggestions unavailable, defaulting to empty");
                Ok(Vec::new())
            }
            Err(e) => Err(e),
        }
    }

    /// Fetch a generated artifact announced by a `download` event.
    /// The filename is percent-encoded as a single path segment.
    pub async fn download_generated(&self, filename: &str) -> Result<Bytes> {
        let url = self
            .transport
            .url_for(&["api", "admin", "agent", "download", filename])?;
        self.transport.get_bytes(url).await
    }

    /// Fetch the original file behind a citation.
    pub async fn download_document(&self, document_id: &str) -> Result<Bytes> {
        let url = self
            .transport
            .url_for(&["api", "documents", document_id, "download"])?;
        self.transport.get_bytes(url).await
    }
}
