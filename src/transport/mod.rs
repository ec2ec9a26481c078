//! HTTP transport layer.
//!
//! A thin wrapper around `reqwest` that owns the base URL, the shared client
//! with its pooling/timeout defaults, and bearer-token injection via the
//! [`CredentialProvider`](crate::auth::CredentialProvider) capability.

pub mod http;

pub use http::{HttpTransport, TransportError};
