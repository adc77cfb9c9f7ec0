//! Self-signed JWT assertions for the OAuth2 JWT-bearer grant (RFC 7523).
//!
//! The assertion proves the service identity to the token endpoint:
//!
//! - `iss` and `sub`: the service account email
//! - `aud`: the token endpoint URL
//! - `scope`: the requested OAuth2 scopes
//! - `iat` / `exp`: now and now + lifetime

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::AuthResult;
use crate::config::signed_secs;
use crate::credentials::ServiceIdentity;
use crate::token::jwt::{JwtHeader, encode_token};

/// Claims of a JWT-bearer assertion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AssertionClaims {
    /// Issuer: the service account email.
    pub iss: String,
    /// Subject: the service account email.
    pub sub: String,
    /// Audience: the token endpoint URL.
    pub aud: String,
    /// Space-separated scopes.
    pub scope: String,
    /// Issued at (Unix timestamp).
    pub iat: i64,
    /// Expiration time (Unix timestamp).
    pub exp: i64,
}

/// Builds and signs assertions for one service identity.
#[derive(Debug, Clone)]
pub struct AssertionSigner {
    identity: Arc<ServiceIdentity>,
    lifetime: Duration,
}

impl AssertionSigner {
    /// Creates a signer whose assertions live for `lifetime`.
    #[must_use]
    pub fn new(identity: Arc<ServiceIdentity>, lifetime: Duration) -> Self {
        Self { identity, lifetime }
    }

    /// The identity assertions are issued for.
    #[must_use]
    pub fn identity(&self) -> &ServiceIdentity {
        &self.identity
    }

    /// Returns the claims of an assertion issued at `now`.
    #[must_use]
    pub fn claims(&self, scope: &str, audience: &str, now: i64) -> AssertionClaims {
        let email = self.identity.client_email().to_string();
        AssertionClaims {
            iss: email.clone(),
            sub: email,
            aud: audience.to_string(),
            scope: scope.to_string(),
            iat: now,
            exp: now.saturating_add(signed_secs(self.lifetime)),
        }
    }

    /// Signs an assertion for `scope`, addressed to `audience`.
    ///
    /// # Errors
    ///
    /// Returns an error if signing fails.
    pub fn sign(&self, scope: &str, audience: &str) -> AuthResult<String> {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let claims = self.claims(scope, audience, now);
        encode_token(&JwtHeader::rs256(None), &claims, self.identity.signer())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil;
    use crate::token::jwt::RawToken;
    use crate::token::rs256::{Rs256Verifier, Verifier};

    fn signer() -> AssertionSigner {
        AssertionSigner::new(
            Arc::new(testutil::service_identity()),
            Duration::from_secs(3600),
        )
    }

    #[test]
    fn test_claims_shape() {
        let claims = signer().claims("mgmt", "https://token.example/endpoint", 1_000);
        assert_eq!(claims.iss, testutil::CLIENT_EMAIL);
        assert_eq!(claims.sub, testutil::CLIENT_EMAIL);
        assert_eq!(claims.aud, "https://token.example/endpoint");
        assert_eq!(claims.scope, "mgmt");
        assert_eq!(claims.iat, 1_000);
        assert_eq!(claims.exp, 4_600);
    }

    #[test]
    fn test_long_lifetime_saturates_expiry() {
        let signer = AssertionSigner::new(
            Arc::new(testutil::service_identity()),
            Duration::from_secs(u64::MAX),
        );
        let claims = signer.claims("mgmt", "https://token.example/endpoint", 1_000);
        assert_eq!(claims.exp, i64::MAX);
    }

    #[test]
    fn test_signed_assertion_verifies() {
        let assertion = signer()
            .sign("mgmt", "https://token.example/endpoint")
            .unwrap();
        let raw = RawToken::split(&assertion).unwrap();

        let header = raw.decode_header().unwrap();
        assert_eq!(header.alg, "RS256");
        assert_eq!(header.typ.as_deref(), Some("JWT"));
        assert!(header.kid.is_none());

        let signature = raw.decode_signature().unwrap();
        assert!(Rs256Verifier.verify(
            &testutil::verification_key("any"),
            raw.signing_input(),
            &signature
        ));

        let claims = raw.decode_claims().unwrap();
        assert_eq!(claims.raw["scope"], "mgmt");
        assert_eq!(
            claims.expires_at.unwrap() - claims.issued_at.unwrap(),
            3600
        );
    }
}
