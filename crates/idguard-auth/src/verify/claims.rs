//! Merging verified token claims with the directory record.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::management::DirectoryUserRecord;
use crate::token::jwt::TokenClaims;

/// The identity asserted by a verified token or cookie.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VerificationResult {
    /// The authenticated user's id (`sub`).
    pub subject_id: String,
    pub email: Option<String>,
    pub name: Option<String>,
    /// Application role; `None` is a valid, roleless identity.
    pub role: Option<String>,
    pub email_verified: bool,
    pub photo_url: Option<String>,
    /// `iat`, seconds since the epoch.
    pub issued_at: Option<i64>,
    /// `exp`, seconds since the epoch.
    pub expires_at: i64,
    /// `auth_time`, seconds since the epoch.
    pub auth_time: Option<i64>,
    /// Every claim of the token, including custom ones.
    pub claims: Map<String, Value>,
}

/// Builds the result for a token whose claims already passed validation.
///
/// Token claims win; directory fields fill the gaps. The role comes from the
/// `role` claim, else from `role` inside the record's custom attributes.
#[must_use]
pub fn resolve(
    subject_id: String,
    expires_at: i64,
    claims: TokenClaims,
    record: Option<&DirectoryUserRecord>,
) -> VerificationResult {
    let role = claims.role.clone().or_else(|| {
        record
            .and_then(|r| r.custom_attributes.as_deref())
            .and_then(role_from_custom_attributes)
    });

    VerificationResult {
        email: claims
            .email
            .clone()
            .or_else(|| record.and_then(|r| r.email.clone())),
        name: claims
            .name
            .clone()
            .or_else(|| record.and_then(|r| r.display_name.clone())),
        email_verified: claims
            .email_verified
            .or_else(|| record.map(|r| r.email_verified))
            .unwrap_or(false),
        photo_url: claims
            .picture
            .clone()
            .or_else(|| record.and_then(|r| r.photo_url.clone())),
        role,
        subject_id,
        issued_at: claims.issued_at,
        expires_at,
        auth_time: claims.auth_time,
        claims: claims.raw,
    }
}

/// Reads `role` from a custom-attributes JSON string.
fn role_from_custom_attributes(raw: &str) -> Option<String> {
    if raw.trim().is_empty() {
        return None;
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => map.get("role").and_then(Value::as_str).map(str::to_owned),
        Ok(_) => {
            tracing::warn!("Custom attributes are not a JSON object, ignoring");
            None
        }
        Err(e) => {
            tracing::warn!("Malformed custom attributes, ignoring: {}", e);
            None
        }
    }
}
