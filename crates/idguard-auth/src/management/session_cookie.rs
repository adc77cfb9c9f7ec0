//! Session cookie issuance.
//!
//! A verified identity token is exchanged for a longer-lived session cookie
//! through the `createSessionCookie` action.

use std::time::Duration;

use serde::Deserialize;
use serde_json::json;

use crate::AuthResult;
use crate::error::AuthError;
use crate::management::ManagementApi;

/// Shortest lifetime the platform accepts for a session cookie.
pub const MIN_SESSION_COOKIE_LIFETIME: Duration = Duration::from_secs(60);

/// Longest lifetime the platform accepts for a session cookie (14 days).
pub const MAX_SESSION_COOKIE_LIFETIME: Duration = Duration::from_secs(14 * 24 * 60 * 60);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateSessionCookieResponse {
    session_cookie: Option<String>,
}

/// Issues session cookies for the project.
#[derive(Debug, Clone)]
pub struct SessionCookieIssuer {
    api: ManagementApi,
}

impl SessionCookieIssuer {
    #[must_use]
    pub fn new(api: ManagementApi) -> Self {
        Self { api }
    }

    /// Exchanges `id_token` for a session cookie valid for `lifetime`,
    /// clamped to [`MIN_SESSION_COOKIE_LIFETIME`]..=[`MAX_SESSION_COOKIE_LIFETIME`].
    ///
    /// # Errors
    ///
    /// [`AuthError::InvalidArgument`] for an empty token; [`AuthError::Upstream`]
    /// for a failed call or a response without `sessionCookie`.
    pub async fn issue_session_cookie(&self, id_token: &str, lifetime: Duration) -> AuthResult<String> {
        if id_token.trim().is_empty() {
            return Err(AuthError::invalid_argument("identity token must not be empty"));
        }

        let lifetime = clamp_lifetime(lifetime);
        let (status, response): (u16, CreateSessionCookieResponse) = self
            .api
            .post_with_status(
                ":createSessionCookie",
                &json!({ "idToken": id_token, "validDuration": lifetime.as_secs() }),
            )
            .await?;

        let cookie = response
            .session_cookie
            .filter(|c| !c.is_empty())
            .ok_or_else(|| {
                AuthError::upstream_protocol(status, "response is missing sessionCookie")
            })?;

        tracing::debug!(lifetime_secs = lifetime.as_secs(), "Issued session cookie");
        Ok(cookie)
    }
}

fn clamp_lifetime(lifetime: Duration) -> Duration {
    lifetime.clamp(MIN_SESSION_COOKIE_LIFETIME, MAX_SESSION_COOKIE_LIFETIME)
}
