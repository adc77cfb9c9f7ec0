//! Authenticated calls to the identity management API.
//!
//! - [`directory`] - user lookup, custom attributes and revocation
//! - [`session_cookie`] - exchanging identity tokens for session cookies
//!
//! Every request carries a bearer token from an [`AccessTokenSource`]. Calls
//! are never retried here; callers decide based on
//! [`AuthError::is_retryable`].

pub mod directory;
pub mod session_cookie;

use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::AuthResult;
use crate::credentials::AccessTokenSource;
use crate::credentials::broker::truncate;
use crate::error::AuthError;

pub use directory::{DirectoryClient, DirectoryUserRecord, UserDirectory};
pub use session_cookie::{MAX_SESSION_COOKIE_LIFETIME, MIN_SESSION_COOKIE_LIFETIME, SessionCookieIssuer};

/// Project-scoped handle on the management API.
#[derive(Clone)]
pub struct ManagementApi {
    http_client: reqwest::Client,
    base_url: String,
    project_id: String,
    tokens: Arc<dyn AccessTokenSource>,
}

impl ManagementApi {
    /// Creates a handle for `project_id` under `base_url`
    /// (e.g. `https://identitytoolkit.googleapis.com/v1`).
    #[must_use]
    pub fn new(
        http_client: reqwest::Client,
        base_url: impl Into<String>,
        project_id: impl Into<String>,
        tokens: Arc<dyn AccessTokenSource>,
    ) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            http_client,
            base_url,
            project_id: project_id.into(),
            tokens,
        }
    }

    /// The project requests are scoped to.
    #[must_use]
    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    /// Absolute URL of a project-relative action, e.g. `/accounts:lookup`
    /// or `:createSessionCookie`.
    fn url(&self, action: &str) -> String {
        format!("{}/projects/{}{}", self.base_url, self.project_id, action)
    }

    /// POSTs `body` as JSON to a project action and decodes the response.
    pub(crate) async fn post<B, R>(&self, action: &str, body: &B) -> AuthResult<R>
    where
        B: Serialize + Sync,
        R: DeserializeOwned,
    {
        let (_, response) = self.post_with_status(action, body).await?;
        Ok(response)
    }

    /// Like [`Self::post`], also returning the success status code.
    pub(crate) async fn post_with_status<B, R>(
        &self,
        action: &str,
        body: &B,
    ) -> AuthResult<(u16, R)>
    where
        B: Serialize + Sync,
        R: DeserializeOwned,
    {
        let token = self.tokens.access_token().await?;
        let url = self.url(action);

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(token)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(action, "Management API request failed: {}", e);
                AuthError::upstream_transport(format!("{action}: {e}"))
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            tracing::warn!(action, status = status.as_u16(), "Management API returned an error");
            return Err(AuthError::upstream_status(
                status.as_u16(),
                format!("{action}: {}", truncate(&text)),
            ));
        }

        let decoded = response.json::<R>().await.map_err(|e| {
            AuthError::upstream_protocol(status.as_u16(), format!("{action} response: {e}"))
        })?;
        Ok((status.as_u16(), decoded))
    }
}

impl std::fmt::Debug for ManagementApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagementApi")
            .field("base_url", &self.base_url)
            .field("project_id", &self.project_id)
            .finish_non_exhaustive()
    }
}

/// Rejects empty subject ids before any request is made.
pub(crate) fn require_subject(subject_id: &str) -> AuthResult<()> {
    if subject_id.trim().is_empty() {
        return Err(AuthError::invalid_argument("subject id must not be empty"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::StaticAccessToken;

    #[test]
    fn test_url_layout() {
        let api = ManagementApi::new(
            reqwest::Client::new(),
            "https://identitytoolkit.googleapis.com/v1/",
            "demo",
            Arc::new(StaticAccessToken("t".into())),
        );
        assert_eq!(
            api.url("/accounts:lookup"),
            "https://identitytoolkit.googleapis.com/v1/projects/demo/accounts:lookup"
        );
        assert_eq!(
            api.url(":createSessionCookie"),
            "https://identitytoolkit.googleapis.com/v1/projects/demo:createSessionCookie"
        );
    }

    #[test]
    fn test_require_subject() {
        assert!(require_subject("uid").is_ok());
        assert!(matches!(
            require_subject(" "),
            Err(AuthError::InvalidArgument { .. })
        ));
    }
}
