//! Bearer-credential providers.
//!
//! The original frontend read its access token from ambient browser storage.
//! Here the credential source is an explicit capability injected into the
//! transport at construction, so the core stays testable without any storage
//! shim and applications can plug in whatever store they use.

use async_trait::async_trait;
use std::sync::Arc;

/// Source of the bearer token sent as `Authorization: Bearer <token>`.
///
/// Returning `None` sends the request unauthenticated; the server answers 401
/// and the caller decides what to do with it (the SDK does not manage login).
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn bearer_token(&self) -> Option<String>;
}

/// Fixed token, typically obtained from a prior login call.
pub struct StaticCredentials {
    token: String,
}

impl StaticCredentials {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl CredentialProvider for StaticCredentials {
    async fn bearer_token(&self) -> Option<String> {
        Some(self.token.clone())
    }
}

/// Reads `TOMOE_ACCESS_TOKEN` on every request, so a token refreshed by an
/// outer process is picked up without rebuilding the client.
pub struct EnvCredentials;

#[async_trait]
impl CredentialProvider for EnvCredentials {
    async fn bearer_token(&self) -> Option<String> {
        std::env::var("TOMOE_ACCESS_TOKEN")
            .ok()
            .filter(|t| !t.is_empty())
    }
}

/// OS keyring lookup under the `tomoe` service.
pub struct KeyringCredentials {
    account: String,
}

impl KeyringCredentials {
    pub fn new(account: impl Into<String>) -> Self {
        Self {
            account: account.into(),
        }
    }
}

#[async_trait]
impl CredentialProvider for KeyringCredentials {
    async fn bearer_token(&self) -> Option<String> {
        let entry = keyring::Entry::new("tomoe", &self.account).ok()?;
        entry.get_password().ok()
    }
}

/// No credentials at all (public endpoints, local development).
pub struct AnonymousCredentials;

#[async_trait]
impl CredentialProvider for AnonymousCredentials {
    async fn bearer_token(&self) -> Option<String> {
        None
    }
}

pub fn anonymous() -> Arc<dyn CredentialProvider> {
    Arc::new(AnonymousCredentials)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_credentials_return_the_token() {
        let creds = StaticCredentials::new("tok-123");
        assert_eq!(creds.bearer_token().await.as_deref(), Some("tok-123"));
    }

    #[tokio::test]
    async fn anonymous_returns_none() {
        assert!(AnonymousCredentials.bearer_token().await.is_none());
    }
}
