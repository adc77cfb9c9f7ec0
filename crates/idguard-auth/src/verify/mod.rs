//! Identity token and session cookie verification.
//!
//! Both token kinds run through one linear pipeline, parameterized by a
//! [`VerificationPolicy`]:
//!
//! 1. split into three segments
//! 2. header: `alg` must be `RS256` and `kid` present
//! 3. key lookup and RS256 signature check
//! 4. payload decode
//! 5. claims: `iss`, `aud`, `sub`, `exp`, `iat`
//! 6. directory consultation (revocation, disabled accounts, backfill)
//! 7. claim resolution into a [`VerificationResult`]
//!
//! No claim is looked at before the signature has verified.

pub mod claims;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use time::OffsetDateTime;

use crate::AuthResult;
use crate::config::{VerifierConfig, signed_secs};
use crate::error::AuthError;
use crate::jwks::KeyRing;
use crate::management::{DirectoryUserRecord, UserDirectory};
use crate::token::jwt::{RawToken, TokenClaims};
use crate::token::rs256::{RS256, Rs256Verifier, Verifier};

pub use claims::{VerificationResult, resolve};

/// Longest `sub` accepted, in characters.
pub const MAX_SUBJECT_LENGTH: usize = 128;

/// Issuer prefix of identity tokens; the project id follows.
pub const ID_TOKEN_ISSUER_PREFIX: &str = "https://securetoken.google.com/";

/// Issuer prefix of session cookies; the project id follows.
pub const SESSION_COOKIE_ISSUER_PREFIX: &str = "https://session.firebase.google.com/";

/// Which kind of credential a policy verifies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    IdToken,
    SessionCookie,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IdToken => write!(f, "ID token"),
            Self::SessionCookie => write!(f, "session cookie"),
        }
    }
}

/// What a token must look like to be accepted, and where its keys live.
#[derive(Debug, Clone)]
pub struct VerificationPolicy {
    pub kind: TokenKind,
    pub issuer: String,
    pub audience: String,
    pub require_iat: bool,
    pub keys: Arc<KeyRing>,
}

impl VerificationPolicy {
    /// Policy for identity tokens of `project_id`.
    #[must_use]
    pub fn id_token(project_id: &str, keys: Arc<KeyRing>) -> Self {
        Self {
            kind: TokenKind::IdToken,
            issuer: format!("{ID_TOKEN_ISSUER_PREFIX}{project_id}"),
            audience: project_id.to_string(),
            require_iat: true,
            keys,
        }
    }

    /// Policy for session cookies of `project_id`, addressed to `audience`.
    #[must_use]
    pub fn session_cookie(project_id: &str, audience: &str, keys: Arc<KeyRing>) -> Self {
        Self {
            kind: TokenKind::SessionCookie,
            issuer: format!("{SESSION_COOKIE_ISSUER_PREFIX}{project_id}"),
            audience: audience.to_string(),
            require_iat: true,
            keys,
        }
    }
}

/// Verifies identity tokens and session cookies.
pub struct TokenVerifier {
    id_tokens: VerificationPolicy,
    session_cookies: VerificationPolicy,
    directory: Arc<dyn UserDirectory>,
    signatures: Box<dyn Verifier>,
    clock_skew: Duration,
    backfill_from_directory: bool,
}

impl TokenVerifier {
    #[must_use]
    pub fn new(
        id_tokens: VerificationPolicy,
        session_cookies: VerificationPolicy,
        directory: Arc<dyn UserDirectory>,
        config: &VerifierConfig,
    ) -> Self {
        Self {
            id_tokens,
            session_cookies,
            directory,
            signatures: Box::new(Rs256Verifier),
            clock_skew: config.clock_skew,
            backfill_from_directory: config.backfill_from_directory,
        }
    }

    /// Verifies an identity token.
    ///
    /// # Errors
    ///
    /// Returns the [`AuthError`] of the first failing pipeline step.
    pub async fn verify_id_token(
        &self,
        token: &str,
        check_revoked: bool,
    ) -> AuthResult<VerificationResult> {
        self.verify(&self.id_tokens, token, check_revoked).await
    }

    /// Verifies a session cookie.
    ///
    /// # Errors
    ///
    /// Returns the [`AuthError`] of the first failing pipeline step.
    pub async fn verify_session_cookie(
        &self,
        cookie: &str,
        check_revoked: bool,
    ) -> AuthResult<VerificationResult> {
        self.verify(&self.session_cookies, cookie, check_revoked).await
    }

    /// Runs the full pipeline under `policy`.
    ///
    /// # Errors
    ///
    /// Returns the [`AuthError`] of the first failing pipeline step.
    pub async fn verify(
        &self,
        policy: &VerificationPolicy,
        token: &str,
        check_revoked: bool,
    ) -> AuthResult<VerificationResult> {
        let raw = RawToken::split(token)?;

        let header = raw.decode_header()?;
        if header.alg != RS256 {
            return Err(AuthError::unsupported_header(format!(
                "{} must be signed with {RS256}, got '{}'",
                policy.kind, header.alg
            )));
        }
        let kid = header
            .kid
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| {
                AuthError::unsupported_header(format!("{} has no 'kid' header", policy.kind))
            })?;

        let key = policy.keys.get_verification_key(kid).await?;
        let signature = raw.decode_signature()?;
        if !self.signatures.verify(&key, raw.signing_input(), &signature) {
            tracing::debug!(kind = %policy.kind, kid, "Signature mismatch");
            return Err(AuthError::Signature);
        }

        let claims = raw.decode_claims()?;
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let (subject_id, expires_at) = self.check_claims(policy, &claims, now)?;

        let needs_directory = check_revoked
            || (self.backfill_from_directory
                && (claims.role.is_none() || claims.email.is_none() || claims.name.is_none()));

        let record = if needs_directory {
            Some(self.consult_directory(&subject_id, &claims, check_revoked).await?)
        } else {
            None
        };

        Ok(resolve(subject_id, expires_at, claims, record.as_ref()))
    }

    /// Validates iss, aud, sub, exp and iat, in that order. Returns the
    /// subject id and expiry.
    fn check_claims(
        &self,
        policy: &VerificationPolicy,
        claims: &TokenClaims,
        now: i64,
    ) -> AuthResult<(String, i64)> {
        let kind = policy.kind;

        if claims.issuer.as_deref() != Some(policy.issuer.as_str()) {
            return Err(AuthError::claim(
                "iss",
                format!(
                    "{kind} has issuer {:?}, expected '{}'",
                    claims.issuer, policy.issuer
                ),
            ));
        }

        if claims.audience.as_deref() != Some(policy.audience.as_str()) {
            return Err(AuthError::claim(
                "aud",
                format!(
                    "{kind} has audience {:?}, expected '{}'",
                    claims.audience, policy.audience
                ),
            ));
        }

        let subject_id = match claims.subject.as_deref() {
            None | Some("") => {
                return Err(AuthError::claim("sub", format!("{kind} has no subject")));
            }
            Some(sub) if sub.chars().count() > MAX_SUBJECT_LENGTH => {
                return Err(AuthError::claim(
                    "sub",
                    format!("{kind} subject exceeds {MAX_SUBJECT_LENGTH} characters"),
                ));
            }
            Some(sub) => sub.to_string(),
        };

        let expires_at = match claims.expires_at {
            Some(exp) if exp > now => exp,
            Some(exp) => {
                return Err(AuthError::claim(
                    "exp",
                    format!("{kind} expired at {exp}"),
                ));
            }
            None => {
                return Err(AuthError::claim("exp", format!("{kind} has no expiry")));
            }
        };

        match claims.issued_at {
            None if policy.require_iat => {
                return Err(AuthError::claim("iat", format!("{kind} has no issued-at time")));
            }
            Some(iat) if iat > now.saturating_add(signed_secs(self.clock_skew)) => {
                return Err(AuthError::claim(
                    "iat",
                    format!("{kind} was issued in the future ({iat})"),
                ));
            }
            _ => {}
        }

        Ok((subject_id, expires_at))
    }

    async fn consult_directory(
        &self,
        subject_id: &str,
        claims: &TokenClaims,
        check_revoked: bool,
    ) -> AuthResult<DirectoryUserRecord> {
        let record = self
            .directory
            .lookup_user(subject_id)
            .await?
            .ok_or_else(|| AuthError::user_not_found(subject_id))?;

        if record.disabled {
            return Err(AuthError::Disabled);
        }

        if check_revoked
            && let Some(valid_since) = record.valid_since
            && valid_since > claims.issued_at.unwrap_or(0)
        {
            tracing::debug!(valid_since, "Token predates the revocation watermark");
            return Err(AuthError::Revoked);
        }

        Ok(record)
    }
}

impl fmt::Debug for TokenVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenVerifier")
            .field("id_tokens", &self.id_tokens)
            .field("session_cookies", &self.session_cookies)
            .field("clock_skew", &self.clock_skew)
            .field("backfill_from_directory", &self.backfill_from_directory)
            .finish_non_exhaustive()
    }
}
