//! Streaming protocol: frame decoding and typed event dispatch.
//!
//! The Tomoe backend streams chat answers as a one-shot POST response whose
//! body is a sequence of `data: <json>` lines (non-standard SSE: there is no
//! `EventSource`, the connection closes when the answer is complete).
//!
//! ```text
//! Raw Bytes → frame_lines → dispatch → StreamEvent
//!     │            │            │
//!   HTTP      line split,   token / step /
//!   body      `data: `      download / terminal
//!             prefix,
//!             JSON parse
//! ```
//!
//! Two leniency rules are load-bearing:
//! - bytes are buffered until a full `\n`-terminated line exists, so chunk
//!   boundaries (including mid-multibyte-character splits) never corrupt a
//!   frame, and
//! - a single malformed frame is skipped, never aborting the stream.

pub mod decode;
pub mod events;

pub use decode::{decode_events, frame_lines};
pub use events::{AgentStep, ChatOutcome, Reference, StepStatus, StreamEvent};
