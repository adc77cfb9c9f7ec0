//! Engine configuration.
//!
//! Endpoint URLs, cache lifetimes and verification options. The service
//! identity itself (project id, client email, private key) is loaded
//! separately by [`crate::credentials::ServiceIdentity`].
//!
//! # Example (TOML)
//!
//! ```toml
//! [endpoints]
//! token = "https://oauth2.googleapis.com/token"
//!
//! [jwks]
//! default_ttl = "1h"
//!
//! [verifier]
//! clock_skew = "5s"
//! ```

use std::path::Path;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// OAuth2 token endpoint used for the JWT-bearer grant.
pub const DEFAULT_TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";

/// Base URL of the identity platform's management API.
pub const DEFAULT_MANAGEMENT_BASE_URL: &str = "https://identitytoolkit.googleapis.com/v1";

/// Public keys for identity tokens.
pub const DEFAULT_ID_TOKEN_JWKS_URL: &str =
    "https://www.googleapis.com/service_accounts/v1/jwk/securetoken@system.gserviceaccount.com";

/// Public keys for session cookies.
pub const DEFAULT_SESSION_COOKIE_JWKS_URL: &str =
    "https://identitytoolkit.googleapis.com/v1/sessionCookiePublicKeys";

/// Audience carried by session cookies.
pub const DEFAULT_SESSION_COOKIE_AUDIENCE: &str =
    "https://identitytoolkit.googleapis.com/google.identity.identitytoolkit.v1.IdentityToolkit";

/// OAuth2 scope requested for the management API.
pub const DEFAULT_MANAGEMENT_SCOPE: &str =
    "https://www.googleapis.com/auth/identitytoolkit https://www.googleapis.com/auth/cloud-platform";

/// Upper bound for every configured duration.
pub const MAX_CONFIGURED_DURATION: Duration = Duration::from_secs(365 * 24 * 3600);

/// The instant `ttl` from now, saturating at [`MAX_CONFIGURED_DURATION`].
pub(crate) fn deadline_after(ttl: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(ttl.min(MAX_CONFIGURED_DURATION)).unwrap_or(now)
}

/// Whole seconds of `duration` as a signed timestamp offset.
pub(crate) fn signed_secs(duration: Duration) -> i64 {
    i64::try_from(duration.as_secs()).unwrap_or(i64::MAX)
}

/// Root configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Remote endpoints.
    pub endpoints: EndpointConfig,

    /// Access token broker.
    pub broker: BrokerConfig,

    /// JWKS caching.
    pub jwks: JwksConfig,

    /// Token verification.
    pub verifier: VerifierConfig,

    /// Shared HTTP client.
    pub http: HttpConfig,
}

/// Remote endpoint URLs.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EndpointConfig {
    /// OAuth2 token endpoint (also the assertion audience).
    pub token: String,

    /// Management API base URL, without a trailing slash.
    pub management: String,

    /// JWKS for identity tokens.
    pub id_token_jwks: String,

    /// JWKS for session cookies.
    pub session_cookie_jwks: String,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            token: DEFAULT_TOKEN_ENDPOINT.to_string(),
            management: DEFAULT_MANAGEMENT_BASE_URL.to_string(),
            id_token_jwks: DEFAULT_ID_TOKEN_JWKS_URL.to_string(),
            session_cookie_jwks: DEFAULT_SESSION_COOKIE_JWKS_URL.to_string(),
        }
    }
}

/// Access token broker configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Space-separated OAuth2 scopes requested in the assertion.
    pub scope: String,

    /// Lifetime of the signed assertion.
    #[serde(with = "humantime_serde")]
    pub assertion_lifetime: Duration,

    /// Cached tokens are refreshed once they are this close to expiry.
    #[serde(with = "humantime_serde")]
    pub refresh_margin: Duration,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            scope: DEFAULT_MANAGEMENT_SCOPE.to_string(),
            assertion_lifetime: Duration::from_secs(3600), // 1 hour
            refresh_margin: Duration::from_secs(60),
        }
    }
}

/// JWKS cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct JwksConfig {
    /// TTL when the response carries no usable `Cache-Control: max-age`.
    #[serde(with = "humantime_serde")]
    pub default_ttl: Duration,

    /// Lower bound applied to `max-age`.
    #[serde(with = "humantime_serde")]
    pub min_ttl: Duration,

    /// Upper bound applied to `max-age`.
    #[serde(with = "humantime_serde")]
    pub max_ttl: Duration,

    /// Maximum JWKS response size in bytes.
    pub max_response_size: usize,

    /// Allow plain-HTTP JWKS URLs. Only for tests and local emulators.
    pub allow_http: bool,
}

impl Default for JwksConfig {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(3600), // 1 hour
            min_ttl: Duration::ZERO,
            max_ttl: Duration::from_secs(86400), // 24 hours
            max_response_size: 1024 * 1024,      // 1 MB
            allow_http: false,
        }
    }
}

/// Token verification configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct VerifierConfig {
    /// Expected `aud` of session cookies.
    pub session_cookie_audience: String,

    /// Tolerance for `iat` values slightly in the future.
    #[serde(with = "humantime_serde")]
    pub clock_skew: Duration,

    /// Consult the directory when role, email or name are missing from a token.
    pub backfill_from_directory: bool,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            session_cookie_audience: DEFAULT_SESSION_COOKIE_AUDIENCE.to_string(),
            clock_skew: Duration::ZERO,
            backfill_from_directory: true,
        }
    }
}

/// Shared HTTP client configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Per-request timeout for every outbound call.
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// Configuration errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// An invalid configuration value was provided.
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    /// A required configuration value is missing.
    #[error("Missing required configuration: {0}")]
    Missing(String),

    /// The configuration file could not be read or parsed.
    #[error("Failed to load configuration: {0}")]
    Load(String),
}

impl IdentityConfig {
    /// Parses a TOML document. Missing sections take their defaults.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Load` if the document is not valid TOML for this schema.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|e| ConfigError::Load(e.to_string()))
    }

    /// Reads and parses a TOML file.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Load` if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Load(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if:
    /// - An endpoint URL is empty or unparsable
    /// - The broker scope is empty
    /// - The assertion lifetime or HTTP timeout is zero
    /// - `jwks.min_ttl` exceeds `jwks.max_ttl`
    /// - The session cookie audience is empty
    /// - A duration exceeds [`MAX_CONFIGURED_DURATION`]
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("endpoints.token", &self.endpoints.token),
            ("endpoints.management", &self.endpoints.management),
            ("endpoints.id_token_jwks", &self.endpoints.id_token_jwks),
            (
                "endpoints.session_cookie_jwks",
                &self.endpoints.session_cookie_jwks,
            ),
        ] {
            if value.is_empty() {
                return Err(ConfigError::InvalidValue(format!("{name} cannot be empty")));
            }
            url::Url::parse(value)
                .map_err(|e| ConfigError::InvalidValue(format!("{name}: {e}")))?;
        }

        if self.broker.scope.trim().is_empty() {
            return Err(ConfigError::InvalidValue(
                "broker.scope cannot be empty".to_string(),
            ));
        }

        if self.broker.assertion_lifetime.is_zero() {
            return Err(ConfigError::InvalidValue(
                "broker.assertion_lifetime must be > 0".to_string(),
            ));
        }

        if self.jwks.min_ttl > self.jwks.max_ttl {
            return Err(ConfigError::InvalidValue(
                "jwks.min_ttl must not exceed jwks.max_ttl".to_string(),
            ));
        }

        if self.verifier.session_cookie_audience.is_empty() {
            return Err(ConfigError::InvalidValue(
                "verifier.session_cookie_audience cannot be empty".to_string(),
            ));
        }

        if self.http.request_timeout.is_zero() {
            return Err(ConfigError::InvalidValue(
                "http.request_timeout must be > 0".to_string(),
            ));
        }

        for (name, value) in [
            ("broker.assertion_lifetime", self.broker.assertion_lifetime),
            ("broker.refresh_margin", self.broker.refresh_margin),
            ("jwks.default_ttl", self.jwks.default_ttl),
            ("jwks.min_ttl", self.jwks.min_ttl),
            ("jwks.max_ttl", self.jwks.max_ttl),
            ("verifier.clock_skew", self.verifier.clock_skew),
            ("http.request_timeout", self.http.request_timeout),
        ] {
            if value > MAX_CONFIGURED_DURATION {
                return Err(ConfigError::InvalidValue(format!(
                    "{name} must not exceed {}s",
                    MAX_CONFIGURED_DURATION.as_secs()
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_validates() {
        let config = IdentityConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.endpoints.token, DEFAULT_TOKEN_ENDPOINT);
        assert_eq!(config.broker.refresh_margin, Duration::from_secs(60));
        assert_eq!(config.jwks.default_ttl, Duration::from_secs(3600));
        assert!(!config.jwks.allow_http);
    }

    #[test]
    fn test_empty_endpoint_fails_validation() {
        let mut config = IdentityConfig::default();
        config.endpoints.token = String::new();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(_)));
        assert!(err.to_string().contains("endpoints.token"));
    }

    #[test]
    fn test_unparsable_endpoint_fails_validation() {
        let mut config = IdentityConfig::default();
        config.endpoints.management = "not a url".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("endpoints.management"));
    }

    #[test]
    fn test_inverted_ttl_bounds_fail_validation() {
        let mut config = IdentityConfig::default();
        config.jwks.min_ttl = Duration::from_secs(7200);
        config.jwks.max_ttl = Duration::from_secs(60);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("min_ttl"));
    }

    #[test]
    fn test_oversized_durations_fail_validation() {
        let mut config = IdentityConfig::default();
        config.jwks.max_ttl = Duration::from_secs(u64::MAX);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("jwks.max_ttl"));

        let mut config = IdentityConfig::default();
        config.verifier.clock_skew = MAX_CONFIGURED_DURATION + Duration::from_secs(1);
        assert!(config.validate().is_err());

        let mut config = IdentityConfig::default();
        config.broker.assertion_lifetime = MAX_CONFIGURED_DURATION;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_duration_helpers_saturate() {
        assert_eq!(signed_secs(Duration::from_secs(u64::MAX)), i64::MAX);
        assert_eq!(signed_secs(Duration::from_secs(90)), 90);

        let before = Instant::now();
        let deadline = deadline_after(Duration::MAX);
        assert!(deadline > before);
        assert!(deadline <= Instant::now() + MAX_CONFIGURED_DURATION);
    }

    #[test]
    fn test_zero_timeout_fails_validation() {
        let mut config = IdentityConfig::default();
        config.http.request_timeout = Duration::ZERO;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_toml_partial() {
        let config = IdentityConfig::from_toml_str(
            r#"
            [endpoints]
            token = "http://127.0.0.1:9099/token"

            [jwks]
            default_ttl = "30m"
            allow_http = true

            [verifier]
            clock_skew = "5s"
            "#,
        )
        .unwrap();

        assert_eq!(config.endpoints.token, "http://127.0.0.1:9099/token");
        assert_eq!(config.endpoints.management, DEFAULT_MANAGEMENT_BASE_URL);
        assert_eq!(config.jwks.default_ttl, Duration::from_secs(1800));
        assert!(config.jwks.allow_http);
        assert_eq!(config.verifier.clock_skew, Duration::from_secs(5));
        assert!(config.verifier.backfill_from_directory);
    }

    #[test]
    fn test_from_toml_rejects_bad_duration() {
        let err = IdentityConfig::from_toml_str("[broker]\nrefresh_margin = \"soon\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Load(_)));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("idguard.toml");
        std::fs::write(&path, "[http]\nrequest_timeout = \"3s\"\n").unwrap();

        let config = IdentityConfig::from_file(&path).unwrap();
        assert_eq!(config.http.request_timeout, Duration::from_secs(3));

        let missing = IdentityConfig::from_file(dir.path().join("missing.toml")).unwrap_err();
        assert!(matches!(missing, ConfigError::Load(_)));
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::Missing("IDGUARD_PROJECT_ID".to_string());
        assert_eq!(
            err.to_string(),
            "Missing required configuration: IDGUARD_PROJECT_ID"
        );
    }
}
