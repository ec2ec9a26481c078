use crate::auth::{self, CredentialProvider};
use crate::client::core::FaqClient;
use crate::transport::HttpTransport;
use crate::Result;
use std::sync::Arc;
use std::time::Duration;

/// Builder for creating clients with custom configuration.
///
/// Keep this surface area small and predictable: base URL, credentials,
/// timeout. Everything else has env-overridable defaults in the transport.
pub struct FaqClientBuilder {
    base_url: Option<String>,
    timeout: Option<Duration>,
    credentials: Arc<dyn CredentialProvider>,
}

impl FaqClientBuilder {
    pub fn new() -> Self {
        Self {
            base_url: None,
            timeout: None,
            credentials: auth::anonymous(),
        }
    }

    /// Backend base URL. Falls back to `TOMOE_API_URL`, then
    /// `http://localhost:8300`.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Overall request timeout, the only idle guard for long streams.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Inject the bearer-credential source. Default is anonymous.
    pub fn credentials(mut self, provider: impl CredentialProvider + 'static) -> Self {
        self.credentials = Arc::new(provider);
        self
    }

    pub fn credentials_arc(mut self, provider: Arc<dyn CredentialProvider>) -> Self {
        self.credentials = provider;
        self
    }

    /// Build the client.
    pub fn build(self) -> Result<FaqClient> {
        let transport = HttpTransport::new(self.base_url.as_deref(), self.timeout, self.credentials)?;
        Ok(FaqClient {
            transport: Arc::new(transport),
        })
    }
}

impl Default for FaqClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
