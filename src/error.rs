use thiserror::Error;

/// Unified error type for the Tomoe client.
///
/// Frame-level failures (one malformed `data:` line) are deliberately *not*
/// represented here: the decoder skips them, because losing a single token or
/// step event is preferable to aborting an otherwise useful stream. Only
/// request-level and transport-level failures surface as errors.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Network transport error: {0}")]
    Transport(#[from] crate::transport::TransportError),

    /// Non-2xx response before any frame was decoded. Fail-fast: no frame
    /// parsing happens for these streams.
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl Error {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Error::Configuration(msg.into())
    }

    /// True when the failure happened before any event could be produced,
    /// i.e. the request as a whole failed rather than the stream mid-flight.
    pub fn is_request_level(&self) -> bool {
        matches!(self, Error::Http { .. } | Error::Configuration(_))
    }
}
