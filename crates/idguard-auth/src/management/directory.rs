//! User directory: account lookup, custom attributes and session revocation.

use async_trait::async_trait;
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value, json};
use time::OffsetDateTime;

use crate::AuthResult;
use crate::error::AuthError;
use crate::management::{ManagementApi, require_subject};

/// Serialized custom attributes may not exceed this many bytes.
pub const MAX_CUSTOM_ATTRIBUTES_SIZE: usize = 1000;

/// Claim names the platform sets itself and callers may not override.
const RESERVED_CLAIMS: &[&str] = &[
    "acr", "amr", "at_hash", "aud", "auth_time", "azp", "cnf", "c_hash", "exp", "firebase", "iat",
    "iss", "jti", "nbf", "nonce", "sub",
];

/// An account as stored by the identity provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryUserRecord {
    /// The user's subject id.
    pub local_id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub email_verified: bool,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub photo_url: Option<String>,
    /// Custom claims as an opaque JSON string.
    #[serde(default)]
    pub custom_attributes: Option<String>,
    /// Revocation watermark in seconds: tokens issued before it are revoked.
    #[serde(default, deserialize_with = "seconds")]
    pub valid_since: Option<i64>,
    #[serde(default)]
    pub disabled: bool,
}

/// Account lookups needed during verification.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Fetches the record for `subject_id`, or `None` if no such user exists.
    async fn lookup_user(&self, subject_id: &str) -> AuthResult<Option<DirectoryUserRecord>>;
}

#[derive(Debug, Deserialize)]
struct LookupResponse {
    #[serde(default)]
    users: Vec<DirectoryUserRecord>,
}

/// Client for the account endpoints of the management API.
#[derive(Debug, Clone)]
pub struct DirectoryClient {
    api: ManagementApi,
}

impl DirectoryClient {
    #[must_use]
    pub fn new(api: ManagementApi) -> Self {
        Self { api }
    }

    /// Looks up one user by subject id.
    ///
    /// # Errors
    ///
    /// [`AuthError::InvalidArgument`] for an empty id, [`AuthError::Upstream`]
    /// for transport or API failures.
    pub async fn lookup(&self, subject_id: &str) -> AuthResult<Option<DirectoryUserRecord>> {
        require_subject(subject_id)?;

        let response: LookupResponse = self
            .api
            .post("/accounts:lookup", &json!({ "localId": [subject_id] }))
            .await?;

        let record = response.users.into_iter().next();
        tracing::debug!(found = record.is_some(), "Directory lookup");
        Ok(record)
    }

    /// Replaces the user's custom attributes with `claims`.
    ///
    /// # Errors
    ///
    /// [`AuthError::InvalidArgument`] for an empty id, a reserved claim name
    /// or an oversized payload; [`AuthError::Upstream`] for API failures.
    pub async fn set_custom_attributes(
        &self,
        subject_id: &str,
        claims: &Map<String, Value>,
    ) -> AuthResult<()> {
        require_subject(subject_id)?;

        if let Some(reserved) = claims.keys().find(|k| RESERVED_CLAIMS.contains(&k.as_str())) {
            return Err(AuthError::invalid_argument(format!(
                "'{reserved}' is a reserved claim name"
            )));
        }

        let serialized = serde_json::to_string(claims)
            .map_err(|e| AuthError::internal(format!("serialize custom attributes: {e}")))?;
        if serialized.len() > MAX_CUSTOM_ATTRIBUTES_SIZE {
            return Err(AuthError::invalid_argument(format!(
                "custom attributes exceed {MAX_CUSTOM_ATTRIBUTES_SIZE} bytes"
            )));
        }

        let _: Value = self
            .api
            .post(
                "/accounts:update",
                &json!({ "localId": subject_id, "customAttributes": serialized }),
            )
            .await?;

        tracing::info!(claims = claims.len(), "Updated custom attributes");
        Ok(())
    }

    /// Revokes every session and refresh token of the user by moving the
    /// revocation watermark to now.
    ///
    /// # Errors
    ///
    /// [`AuthError::InvalidArgument`] for an empty id, [`AuthError::Upstream`]
    /// for API failures.
    pub async fn revoke_all(&self, subject_id: &str) -> AuthResult<()> {
        require_subject(subject_id)?;

        let now = OffsetDateTime::now_utc().unix_timestamp();
        let _: Value = self
            .api
            .post(
                "/accounts:update",
                &json!({ "localId": subject_id, "validSince": now.to_string() }),
            )
            .await?;

        tracing::info!(valid_since = now, "Revoked user sessions");
        Ok(())
    }
}

#[async_trait]
impl UserDirectory for DirectoryClient {
    async fn lookup_user(&self, subject_id: &str) -> AuthResult<Option<DirectoryUserRecord>> {
        self.lookup(subject_id).await
    }
}

/// Accepts seconds as either a JSON number or a decimal string.
fn seconds<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_i64()
            .map(Some)
            .ok_or_else(|| D::Error::custom("validSince is not an integer")),
        Some(Value::String(s)) => s
            .trim()
            .parse::<i64>()
            .map(Some)
            .map_err(|_| D::Error::custom(format!("validSince '{s}' is not a number"))),
        Some(other) => Err(D::Error::custom(format!(
            "validSince has unexpected type: {other}"
        ))),
    }
}
