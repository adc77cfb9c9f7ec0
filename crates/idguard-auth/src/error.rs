//! Error types for credential brokering and token verification.
//!
//! Every verification failure surfaces as a distinct [`AuthError`] variant so
//! callers (audit logging in particular) can tell a forged signature apart
//! from an expired token or a revoked session.

use std::fmt;

use crate::config::ConfigError;
use crate::token::base64url::DecodeError;

/// Errors that can occur while obtaining credentials or verifying tokens.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Identity material or engine configuration is missing or malformed.
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the configuration problem.
        message: String,
    },

    /// The token is not a well-formed three-segment JWT.
    #[error("Malformed token: {message}")]
    Format {
        /// Description of the structural problem.
        message: String,
    },

    /// The token header declares an algorithm or shape this engine does not accept.
    #[error("Unsupported token header: {message}")]
    UnsupportedHeader {
        /// Description of the header problem.
        message: String,
    },

    /// The RS256 signature did not verify against the published key.
    #[error("Invalid signature")]
    Signature,

    /// A claim failed validation.
    #[error("Invalid claim '{field}': {message}")]
    Claim {
        /// Name of the offending claim (`iss`, `aud`, `sub`, `exp`, `iat`).
        field: &'static str,
        /// Description of the violation.
        message: String,
    },

    /// The key set does not contain the key id named by the token, even after a refresh.
    #[error("Verification key not found: {kid}")]
    KeyNotFound {
        /// The key id from the token header.
        kid: String,
    },

    /// The token was issued before the subject's revocation watermark.
    #[error("Token revoked")]
    Revoked,

    /// The subject's account is disabled.
    #[error("Account disabled")]
    Disabled,

    /// The directory has no record for the subject.
    #[error("User not found: {subject}")]
    UserNotFound {
        /// The subject id that was looked up.
        subject: String,
    },

    /// An outbound call failed or returned an unusable response.
    #[error("Upstream error{}: {message}", status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
    Upstream {
        /// HTTP status, when a response was received.
        status: Option<u16>,
        /// Description of the failure.
        message: String,
    },

    /// A caller-supplied argument was rejected before any I/O.
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        /// Description of the rejected argument.
        message: String,
    },

    /// An unexpected internal error occurred.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl AuthError {
    /// Creates a new `Configuration` error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a new `Format` error.
    #[must_use]
    pub fn format(message: impl Into<String>) -> Self {
        Self::Format {
            message: message.into(),
        }
    }

    /// Creates a new `UnsupportedHeader` error.
    #[must_use]
    pub fn unsupported_header(message: impl Into<String>) -> Self {
        Self::UnsupportedHeader {
            message: message.into(),
        }
    }

    /// Creates a new `Claim` error for the named field.
    #[must_use]
    pub fn claim(field: &'static str, message: impl Into<String>) -> Self {
        Self::Claim {
            field,
            message: message.into(),
        }
    }

    /// Creates a new `KeyNotFound` error.
    #[must_use]
    pub fn key_not_found(kid: impl Into<String>) -> Self {
        Self::KeyNotFound { kid: kid.into() }
    }

    /// Creates a new `UserNotFound` error.
    #[must_use]
    pub fn user_not_found(subject: impl Into<String>) -> Self {
        Self::UserNotFound {
            subject: subject.into(),
        }
    }

    /// Creates an `Upstream` error for a non-success HTTP status.
    #[must_use]
    pub fn upstream_status(status: u16, message: impl Into<String>) -> Self {
        Self::Upstream {
            status: Some(status),
            message: message.into(),
        }
    }

    /// Creates an `Upstream` error for a transport failure (no response received).
    #[must_use]
    pub fn upstream_transport(message: impl Into<String>) -> Self {
        Self::Upstream {
            status: None,
            message: message.into(),
        }
    }

    /// Creates an `Upstream` error for a 2xx response that broke the protocol
    /// (unparsable body, missing field).
    #[must_use]
    pub fn upstream_protocol(status: u16, message: impl Into<String>) -> Self {
        Self::Upstream {
            status: Some(status),
            message: message.into(),
        }
    }

    /// Creates a new `InvalidArgument` error.
    #[must_use]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Creates a new `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns the claim name for `Claim` errors.
    #[must_use]
    pub fn claim_field(&self) -> Option<&'static str> {
        match self {
            Self::Claim { field, .. } => Some(field),
            _ => None,
        }
    }

    /// Returns the HTTP status carried by `Upstream` errors.
    #[must_use]
    pub fn upstream_status_code(&self) -> Option<u16> {
        match self {
            Self::Upstream { status, .. } => *status,
            _ => None,
        }
    }

    /// Returns `true` if a caller may reasonably retry the operation.
    ///
    /// Transport failures and non-2xx responses are retryable. A 2xx response
    /// that violated the protocol is not, and neither is anything else.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Upstream { status: None, .. } => true,
            Self::Upstream {
                status: Some(status),
                ..
            } => !(200..300).contains(status),
            _ => false,
        }
    }

    /// Returns `true` if this error rejects a presented token or cookie
    /// (as opposed to an infrastructure or configuration failure).
    #[must_use]
    pub fn is_verification_failure(&self) -> bool {
        matches!(
            self,
            Self::Format { .. }
                | Self::UnsupportedHeader { .. }
                | Self::Signature
                | Self::Claim { .. }
                | Self::KeyNotFound { .. }
                | Self::Revoked
                | Self::Disabled
                | Self::UserNotFound { .. }
        )
    }

    /// Returns the error category for logging/monitoring purposes.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Configuration { .. } => ErrorCategory::Configuration,
            Self::Format { .. } | Self::UnsupportedHeader { .. } => ErrorCategory::Format,
            Self::Signature => ErrorCategory::Signature,
            Self::Claim { .. } => ErrorCategory::Claims,
            Self::KeyNotFound { .. } => ErrorCategory::KeyManagement,
            Self::Revoked | Self::Disabled | Self::UserNotFound { .. } => ErrorCategory::Account,
            Self::Upstream { .. } => ErrorCategory::Upstream,
            Self::InvalidArgument { .. } => ErrorCategory::Validation,
            Self::Internal { .. } => ErrorCategory::Internal,
        }
    }
}

impl From<DecodeError> for AuthError {
    fn from(err: DecodeError) -> Self {
        Self::format(err.to_string())
    }
}

impl From<ConfigError> for AuthError {
    fn from(err: ConfigError) -> Self {
        Self::configuration(err.to_string())
    }
}

impl From<reqwest::Error> for AuthError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => Self::upstream_status(status.as_u16(), err.to_string()),
            None => Self::upstream_transport(err.to_string()),
        }
    }
}

/// Categories of errors for logging and monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Missing or malformed identity material.
    Configuration,
    /// Structurally malformed token.
    Format,
    /// Cryptographic verification failure.
    Signature,
    /// Claim validation failure.
    Claims,
    /// Key set could not supply the requested key.
    KeyManagement,
    /// Account state (revoked, disabled, deleted).
    Account,
    /// Outbound call failure.
    Upstream,
    /// Rejected caller input.
    Validation,
    /// Internal errors.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration => write!(f, "configuration"),
            Self::Format => write!(f, "format"),
            Self::Signature => write!(f, "signature"),
            Self::Claims => write!(f, "claims"),
            Self::KeyManagement => write!(f, "key_management"),
            Self::Account => write!(f, "account"),
            Self::Upstream => write!(f, "upstream"),
            Self::Validation => write!(f, "validation"),
            Self::Internal => write!(f, "internal"),
        }
    }
}
