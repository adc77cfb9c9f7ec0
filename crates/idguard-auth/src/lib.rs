//! # idguard-auth
//!
//! Identity-token verification and service-credential engine.
//!
//! This crate provides:
//! - Service identity loading and RS256 assertion signing
//! - OAuth2 JWT-bearer access tokens, cached until shortly before expiry
//! - JWKS-backed verification key rings
//! - Identity token and session cookie verification with revocation checks
//! - Session cookie issuance and account administration
//!
//! ## Modules
//!
//! - [`config`] - Engine configuration
//! - [`credentials`] - Service identity, assertions and the access token broker
//! - [`jwks`] - Verification key ring
//! - [`management`] - Directory and session cookie clients
//! - [`token`] - Base64url framing, JWT layout and RS256
//! - [`verify`] - The verification pipeline and claim resolution
//! - [`service`] - [`IdentityService`], the public surface

pub mod config;
pub mod credentials;
pub mod error;
pub mod jwks;
pub mod management;
pub mod service;
pub mod token;
pub mod verify;

#[cfg(test)]
mod testutil;

pub use config::{ConfigError, IdentityConfig};
pub use credentials::{AccessTokenBroker, AccessTokenSource, ServiceIdentity, StaticAccessToken};
pub use error::{AuthError, ErrorCategory};
pub use jwks::KeyRing;
pub use management::{DirectoryClient, DirectoryUserRecord, SessionCookieIssuer, UserDirectory};
pub use service::IdentityService;
pub use verify::{TokenKind, TokenVerifier, VerificationPolicy, VerificationResult};

/// Type alias for credential and verification results.
pub type AuthResult<T> = Result<T, AuthError>;

/// Prelude module for convenient imports.
///
/// ```ignore
/// use idguard_auth::prelude::*;
/// ```
pub mod prelude {
    pub use crate::AuthResult;
    pub use crate::config::{ConfigError, IdentityConfig};
    pub use crate::credentials::{AccessTokenSource, ServiceIdentity};
    pub use crate::error::{AuthError, ErrorCategory};
    pub use crate::service::IdentityService;
    pub use crate::verify::VerificationResult;
}
