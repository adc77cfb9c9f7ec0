//! Access token broker for the service identity.
//!
//! Exchanges a signed assertion for a bearer token at the OAuth2 token
//! endpoint and caches it in memory until shortly before it expires. The
//! cache is an [`ArcSwapOption`]: a refresh swaps in a whole new entry, so a
//! concurrent reader sees either the old token or the new one. Concurrent
//! misses may each fetch a token; the last store wins, which is harmless
//! because every token for the identity is equally valid.

use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use serde::Deserialize;

use crate::AuthResult;
use crate::config::{BrokerConfig, deadline_after};
use crate::credentials::{AssertionSigner, ServiceIdentity};
use crate::error::AuthError;

/// Longest lifetime a cached token is trusted for, whatever `expires_in` says.
pub const MAX_CACHED_TOKEN_LIFETIME: Duration = Duration::from_secs(24 * 3600);

/// OAuth2 grant type for JWT-bearer assertions (RFC 7523).
pub const JWT_BEARER_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Supplies bearer tokens for authenticated management calls.
#[async_trait]
pub trait AccessTokenSource: Send + Sync {
    /// Returns a currently valid bearer token.
    async fn access_token(&self) -> AuthResult<String>;
}

/// A fixed bearer token.
#[derive(Debug, Clone)]
pub struct StaticAccessToken(pub String);

#[async_trait]
impl AccessTokenSource for StaticAccessToken {
    async fn access_token(&self) -> AuthResult<String> {
        Ok(self.0.clone())
    }
}

/// A token together with the instant it must be refreshed.
#[derive(Debug)]
struct CachedAccessToken {
    token: String,
    expires_at: Instant,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    expires_in: Option<i64>,
}

/// Obtains and caches access tokens for the service identity.
pub struct AccessTokenBroker {
    http_client: reqwest::Client,
    signer: AssertionSigner,
    token_endpoint: String,
    audience: String,
    scope: String,
    refresh_margin: Duration,
    cache: ArcSwapOption<CachedAccessToken>,
}

impl AccessTokenBroker {
    /// Creates a broker posting to `token_endpoint`, which is also the
    /// assertion audience.
    #[must_use]
    pub fn new(
        http_client: reqwest::Client,
        identity: Arc<ServiceIdentity>,
        token_endpoint: impl Into<String>,
        config: &BrokerConfig,
    ) -> Self {
        let token_endpoint = token_endpoint.into();
        Self {
            http_client,
            signer: AssertionSigner::new(identity, config.assertion_lifetime),
            audience: token_endpoint.clone(),
            token_endpoint,
            scope: config.scope.clone(),
            refresh_margin: config.refresh_margin,
            cache: ArcSwapOption::empty(),
        }
    }

    /// Overrides the assertion audience (defaults to the token endpoint).
    #[must_use]
    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = audience.into();
        self
    }

    /// Returns a cached token, or fetches a new one if the cached token is
    /// missing or within the refresh margin of expiry.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Upstream`] if the token endpoint is unreachable,
    /// answers with a non-success status, or omits `access_token`.
    pub async fn get_access_token(&self) -> AuthResult<String> {
        if let Some(cached) = self.cache.load_full()
            && Instant::now() < cached.expires_at
        {
            tracing::trace!("Using cached service access token");
            return Ok(cached.token.clone());
        }

        tracing::debug!("Service access token missing or near expiry, requesting a new one");
        let fresh = self.request_token().await?;
        let token = fresh.token.clone();
        self.cache.store(Some(Arc::new(fresh)));
        Ok(token)
    }

    /// Drops the cached token so the next call fetches a new one.
    pub fn invalidate(&self) {
        self.cache.store(None);
        tracing::debug!("Invalidated cached service access token");
    }

    /// Returns `true` if a token is cached (fresh or not).
    #[must_use]
    pub fn has_cached_token(&self) -> bool {
        self.cache.load().is_some()
    }

    async fn request_token(&self) -> AuthResult<CachedAccessToken> {
        let assertion = self.signer.sign(&self.scope, &self.audience)?;

        let response = self
            .http_client
            .post(&self.token_endpoint)
            .form(&[
                ("grant_type", JWT_BEARER_GRANT_TYPE),
                ("assertion", assertion.as_str()),
            ])
            .send()
            .await
            .map_err(|e| {
                tracing::warn!("Token endpoint request failed: {}", e);
                AuthError::upstream_transport(format!("token endpoint: {e}"))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = status.as_u16(), "Token endpoint rejected the assertion");
            return Err(AuthError::upstream_status(
                status.as_u16(),
                format!("token endpoint: {}", truncate(&body)),
            ));
        }

        let body: TokenResponse = response.json().await.map_err(|e| {
            AuthError::upstream_protocol(status.as_u16(), format!("token response: {e}"))
        })?;

        let token = body
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                AuthError::upstream_protocol(
                    status.as_u16(),
                    "token response is missing access_token",
                )
            })?;

        let expires_in = body.expires_in.unwrap_or(0);
        let lifetime = Duration::from_secs(u64::try_from(expires_in).unwrap_or(0))
            .min(MAX_CACHED_TOKEN_LIFETIME)
            .saturating_sub(self.refresh_margin);

        tracing::debug!(expires_in, "Obtained service access token");

        Ok(CachedAccessToken {
            token,
            expires_at: deadline_after(lifetime),
        })
    }
}

impl std::fmt::Debug for AccessTokenBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessTokenBroker")
            .field("token_endpoint", &self.token_endpoint)
            .field("audience", &self.audience)
            .field("scope", &self.scope)
            .field("cached", &self.has_cached_token())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl AccessTokenSource for AccessTokenBroker {
    async fn access_token(&self) -> AuthResult<String> {
        self.get_access_token().await
    }
}

/// Shortens upstream bodies for error messages.
pub(crate) fn truncate(body: &str) -> &str {
    const LIMIT: usize = 512;
    if body.len() <= LIMIT {
        return body;
    }
    let mut end = LIMIT;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    &body[..end]
}
