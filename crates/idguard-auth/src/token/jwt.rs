//! Compact JWS framing: header, claims and the three-segment token layout.
//!
//! Nothing here trusts a token. [`RawToken::split`] only checks shape, and
//! [`TokenClaims`] is a lenient view over the payload that claim validation
//! inspects afterwards.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::AuthResult;
use crate::error::AuthError;
use crate::token::base64url;
use crate::token::rs256::{RS256, Signer};

/// JOSE header of a compact JWS.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JwtHeader {
    /// Signing algorithm.
    pub alg: String,

    /// Media type, normally `JWT`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub typ: Option<String>,

    /// Key id of the signing key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,
}

impl JwtHeader {
    /// Header for an RS256 token, optionally naming its key.
    #[must_use]
    pub fn rs256(kid: Option<String>) -> Self {
        Self {
            alg: RS256.to_string(),
            typ: Some("JWT".to_string()),
            kid,
        }
    }
}

/// A token split into its three segments, not yet verified.
#[derive(Debug, Clone, Copy)]
pub struct RawToken<'a> {
    /// Base64url header segment.
    pub header: &'a str,
    /// Base64url payload segment.
    pub payload: &'a str,
    /// Base64url signature segment.
    pub signature: &'a str,
    signing_input: &'a str,
}

impl<'a> RawToken<'a> {
    /// Splits a compact token into exactly three dot-separated segments.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Format`] if the token does not have exactly three segments.
    pub fn split(token: &'a str) -> AuthResult<Self> {
        let mut parts = token.split('.');
        match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(header), Some(payload), Some(signature), None) => Ok(Self {
                header,
                payload,
                signature,
                signing_input: &token[..header.len() + 1 + payload.len()],
            }),
            _ => Err(AuthError::format(format!(
                "expected 3 dot-separated segments, found {}",
                token.split('.').count()
            ))),
        }
    }

    /// The bytes covered by the signature: `header.payload`.
    #[must_use]
    pub fn signing_input(&self) -> &'a [u8] {
        self.signing_input.as_bytes()
    }

    /// Decodes the header segment.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Format`] if the segment is not base64url JSON.
    pub fn decode_header(&self) -> AuthResult<JwtHeader> {
        base64url::decode_json(self.header)
            .map_err(|e| AuthError::format(format!("header: {e}")))
    }

    /// Decodes the signature segment to raw bytes.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Signature`]: a signature that cannot even be
    /// decoded is a signature that does not verify.
    pub fn decode_signature(&self) -> AuthResult<Vec<u8>> {
        base64url::decode(self.signature).map_err(|_| AuthError::Signature)
    }

    /// Decodes the payload segment into claims.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Format`] if the segment is not a base64url JSON object.
    pub fn decode_claims(&self) -> AuthResult<TokenClaims> {
        let value: Value = base64url::decode_json(self.payload)
            .map_err(|e| AuthError::format(format!("payload: {e}")))?;
        match value {
            Value::Object(map) => Ok(TokenClaims::from_map(map)),
            _ => Err(AuthError::format("payload is not a JSON object")),
        }
    }
}

/// Encodes `claims` under `header` and signs the result.
///
/// # Errors
///
/// Returns an error if serialization or signing fails, or if the header's
/// algorithm does not match the signer.
pub fn encode_token<T: Serialize>(
    header: &JwtHeader,
    claims: &T,
    signer: &dyn Signer,
) -> AuthResult<String> {
    if header.alg != signer.algorithm() {
        return Err(AuthError::internal(format!(
            "header alg {} does not match signer {}",
            header.alg,
            signer.algorithm()
        )));
    }
    let header_segment =
        base64url::encode_json(header).map_err(|e| AuthError::internal(e.to_string()))?;
    let payload_segment =
        base64url::encode_json(claims).map_err(|e| AuthError::internal(e.to_string()))?;
    let signing_input = format!("{header_segment}.{payload_segment}");
    let signature = signer.sign(&base64url::text_to_bytes(&signing_input))?;
    Ok(format!("{signing_input}.{}", base64url::encode(signature)))
}

/// The parsed, unvalidated payload of a token.
///
/// Known claims are extracted when they have the expected JSON type and left
/// `None` otherwise; `raw` keeps every claim for custom fields.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenClaims {
    /// `iss`.
    pub issuer: Option<String>,
    /// `aud` (string form only).
    pub audience: Option<String>,
    /// `sub`.
    pub subject: Option<String>,
    /// `iat`, seconds since the epoch.
    pub issued_at: Option<i64>,
    /// `exp`, seconds since the epoch.
    pub expires_at: Option<i64>,
    /// `auth_time`, seconds since the epoch.
    pub auth_time: Option<i64>,
    /// `email`.
    pub email: Option<String>,
    /// `email_verified`.
    pub email_verified: Option<bool>,
    /// `name`.
    pub name: Option<String>,
    /// `picture`.
    pub picture: Option<String>,
    /// `role` (custom claim).
    pub role: Option<String>,
    /// Every claim in the payload.
    pub raw: Map<String, Value>,
}

impl TokenClaims {
    /// Extracts known claims from a payload object.
    #[must_use]
    pub fn from_map(raw: Map<String, Value>) -> Self {
        let string = |name: &str| raw.get(name).and_then(Value::as_str).map(str::to_owned);
        let seconds = |name: &str| raw.get(name).and_then(numeric_date);

        Self {
            issuer: string("iss"),
            audience: string("aud"),
            subject: string("sub"),
            issued_at: seconds("iat"),
            expires_at: seconds("exp"),
            auth_time: seconds("auth_time"),
            email: string("email"),
            email_verified: raw.get("email_verified").and_then(Value::as_bool),
            name: string("name"),
            picture: string("picture"),
            role: string("role"),
            raw,
        }
    }
}

/// NumericDate per RFC 7519: any JSON number, truncated to whole seconds.
fn numeric_date(value: &Value) -> Option<i64> {
    value
        .as_i64()
        .or_else(|| value.as_f64().filter(|f| f.is_finite()).map(|f| f as i64))
}
