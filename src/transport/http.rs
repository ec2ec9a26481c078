use crate::auth::CredentialProvider;
use crate::{BoxStream, Error, Result};
use bytes::Bytes;
use futures::TryStreamExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::env;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

const DEFAULT_BASE_URL: &str = "http://localhost:8300";

/// How much of an error body to carry into the error message.
const ERROR_BODY_LIMIT: usize = 512;

pub struct HttpTransport {
    client: reqwest::Client,
    base_url: Url,
    credentials: Arc<dyn CredentialProvider>,
}

impl HttpTransport {
    pub fn new(
        base_url: Option<&str>,
        timeout: Option<Duration>,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Result<Self> {
        // Minimal production-friendly defaults (env-overridable).
        let timeout = timeout.unwrap_or_else(|| {
            Duration::from_secs(
                env::var("TOMOE_HTTP_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse::<u64>().ok())
                    .unwrap_or(120),
            )
        });

        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            // Streams may legitimately stay open for the full answer; the
            // overall timeout is the only idle guard the client imposes.
            .timeout(timeout)
            .pool_max_idle_per_host(8)
            .build()
            .map_err(|e| Error::Transport(TransportError::Other(e.to_string())))?;

        let base = base_url
            .map(str::to_string)
            .or_else(|| env::var("TOMOE_API_URL").ok())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let base_url = Url::parse(base.trim_end_matches('/'))
            .map_err(|e| Error::configuration(format!("invalid base URL {base:?}: {e}")))?;

        Ok(Self {
            client,
            base_url,
            credentials,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Build an absolute URL from path segments, percent-encoding each one.
    /// Used for endpoints that embed caller-supplied names (downloads).
    pub fn url_for(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        {
            let mut parts = url
                .path_segments_mut()
                .map_err(|_| Error::configuration("base URL cannot be a base"))?;
            parts.pop_if_empty();
            for segment in segments {
                parts.push(segment);
            }
        }
        Ok(url)
    }

    async fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.credentials.bearer_token().await {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    async fn fail_on_status(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let mut message = response.text().await.unwrap_or_default();
        // Truncate on a char boundary; Japanese error bodies are the norm
        // here and byte 512 can fall inside a multi-byte character.
        let mut end = ERROR_BODY_LIMIT.min(message.len());
        while !message.is_char_boundary(end) {
            end -= 1;
        }
        message.truncate(end);
        if message.is_empty() {
            message = status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string();
        }
        Err(Error::Http {
            status: status.as_u16(),
            message,
        })
    }

    /// POST a JSON body and return the raw response byte stream.
    ///
    /// Fails fast on non-2xx: no frame decoding ever starts for these.
    pub async fn post_stream(
        &self,
        path: &str,
        body: &impl Serialize,
    ) -> Result<BoxStream<'static, Bytes>> {
        let url = self.endpoint(path)?;
        let req = self
            .client
            .post(url.clone())
            .json(body)
            .header("accept", "text/event-stream");
        let req = self.authorize(req).await;

        let response = req
            .send()
            .await
            .map_err(|e| Error::Transport(TransportError::Http(e)))?;
        let response = Self::fail_on_status(response).await?;
        tracing::debug!(url = %url, "stream opened");

        let byte_stream = response
            .bytes_stream()
            .map_err(|e| Error::Transport(TransportError::Http(e)));
        Ok(Box::pin(byte_stream))
    }

    pub async fn post_json<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &impl Serialize,
    ) -> Result<T> {
        let req = self.client.post(self.endpoint(path)?).json(body);
        let req = self.authorize(req).await;
        let response = req
            .send()
            .await
            .map_err(|e| Error::Transport(TransportError::Http(e)))?;
        let response = Self::fail_on_status(response).await?;
        Self::decode_body(response).await
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let req = self.client.get(self.endpoint(path)?);
        let req = self.authorize(req).await;
        let response = req
            .send()
            .await
            .map_err(|e| Error::Transport(TransportError::Http(e)))?;
        let response = Self::fail_on_status(response).await?;
        Self::decode_body(response).await
    }

    /// Read the full body, then decode, so a 2xx response with a malformed
    /// body surfaces as [`Error::Serialization`] rather than a transport
    /// error.
    async fn decode_body<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let body = response
            .text()
            .await
            .map_err(|e| Error::Transport(TransportError::Http(e)))?;
        Ok(serde_json::from_str(&body)?)
    }

    /// GET a binary body (document / generated artifact downloads).
    pub async fn get_bytes(&self, url: Url) -> Result<Bytes> {
        let req = self.client.get(url);
        let req = self.authorize(req).await;
        let response = req
            .send()
            .await
            .map_err(|e| Error::Transport(TransportError::Http(e)))?;
        let response = Self::fail_on_status(response).await?;
        response
            .bytes()
            .await
            .map_err(|e| Error::Transport(TransportError::Http(e)))
    }

    /// Resolve a fixed endpoint path against the base URL. Goes through
    /// [`url_for`](Self::url_for) so a base URL with its own path prefix
    /// (e.g. behind a reverse proxy) keeps that prefix.
    fn endpoint(&self, path: &str) -> Result<Url> {
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        self.url_for(&segments)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Transport error: {0}")]
    Other(String),
}
