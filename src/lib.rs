//! # tomoe-client
//!
//! Typed streaming client SDK for the Tomoe AI FAQ service.
//!
//! The Tomoe backend answers employee questions from an internal knowledge
//! base and streams its answers as newline-delimited `data: <json>` frames
//! over a one-shot POST response. This crate owns the client side of that
//! protocol end to end:
//!
//! - **Stream decoding**: [`stream`] turns the raw response body into a lazy
//!   sequence of typed [`StreamEvent`] values, tolerating malformed frames
//!   and arbitrary chunk boundaries.
//! - **Conversation state**: [`conversation`] folds events into an ordered
//!   message list with accumulating content, a tool-step timeline, and
//!   terminal metadata (citations, follow-ups, downloads).
//! - **Sessions**: [`session::ChatSession`] wires the two together behind a
//!   single-flight submission gate, for both the end-user chat panel and the
//!   admin document assistant.
//! - **REST wrappers**: feedback, question suggestions, and generated
//!   document downloads.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tomoe_client::FaqClientBuilder;
//! use tomoe_client::auth::StaticCredentials;
//! use tomoe_client::session::ChatSession;
//!
//! #[tokio::main]
//! async fn main() -> tomoe_client::Result<()> {
//!     let client = FaqClientBuilder::new()
//!         .base_url("https://faq.example.co.jp")
//!         .credentials(StaticCredentials::new("access-token"))
//!         .build()?;
//!
//!     let session = ChatSession::end_user(client.into());
//!     session.submit("有給休暇の残日数の確認方法は？").await;
//!
//!     let conversation = session.conversation().await;
//!     for message in conversation.messages() {
//!         println!("{:?}: {}", message.role, message.content);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`stream`] | SSE frame decoding and typed event dispatch |
//! | [`conversation`] | Pure message-state reduction |
//! | [`session`] | Single-flight stream driver per chat panel |
//! | [`client`] | `FaqClient` and its builder |
//! | [`transport`] | HTTP transport over `reqwest` |
//! | [`auth`] | Injected bearer-credential providers |

pub mod auth;
pub mod client;
pub mod conversation;
pub mod session;
pub mod stream;
pub mod transport;

// Re-export main types for convenience
pub use client::{CancelHandle, FaqClient, FaqClientBuilder};
pub use conversation::{Conversation, Message, MessageId, MessageRole, Rating, StreamPhase};
pub use session::{ChatSession, SessionKind, SubmitOutcome};
pub use stream::events::{AgentStep, ChatOutcome, Reference, StepStatus, StreamEvent};

use futures::Stream;
use std::pin::Pin;

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// A unified pinned, boxed stream that emits `Result<T>`
pub type BoxStream<'a, T> = Pin<Box<dyn Stream<Item = Result<T>> + Send + 'a>>;

/// Error type for the library
pub mod error;
pub use error::Error;
