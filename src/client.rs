//! Unified client interface for the Tomoe FAQ backend.
//!
//! Developer-friendly goal: keep the public surface small and predictable.
//! Implementation details are split into submodules under `src/client/`.

pub mod builder;
pub mod core;
pub mod types;

pub use builder::FaqClientBuilder;
pub use core::FaqClient;
pub use types::CancelHandle;
