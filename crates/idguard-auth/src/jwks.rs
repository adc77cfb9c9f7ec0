//! Verification key ring backed by a remote JWKS endpoint.
//!
//! The ring holds every RS256 signing key of one JWKS document together with
//! a single expiry shared by all of them. A lookup that misses (unknown `kid`
//! or expired set) triggers exactly one refresh, which swaps in a whole new
//! key set. A failed refresh leaves the previous set in place.
//!
//! # Cache-Control Support
//!
//! The set lifetime comes from the response's `Cache-Control: max-age=X`,
//! falling back to [`JwksConfig::default_ttl`] and clamped to
//! `[min_ttl, max_ttl]`.
//!
//! # Key selection
//!
//! Keys are imported only when they are RSA (`kty: "RSA"`), carry a `kid`,
//! are not marked `use: "enc"` and do not name an algorithm other than
//! `RS256`. Everything else is skipped with a debug log.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use serde::Deserialize;
use url::Url;

use crate::AuthResult;
use crate::config::{JwksConfig, deadline_after};
use crate::error::AuthError;
use crate::token::rs256::{RS256, VerificationKey};

/// One JSON Web Key, reduced to the members the ring inspects.
#[derive(Debug, Clone, Deserialize)]
struct Jwk {
    kty: Option<String>,
    kid: Option<String>,
    #[serde(rename = "use")]
    key_use: Option<String>,
    alg: Option<String>,
    n: Option<String>,
    e: Option<String>,
}

#[derive(Debug, Deserialize)]
struct JwkSetDocument {
    #[serde(default)]
    keys: Vec<Jwk>,
}

/// An immutable snapshot of imported keys.
#[derive(Debug)]
struct KeySet {
    keys: HashMap<String, Arc<VerificationKey>>,
    expires_at: Instant,
}

impl KeySet {
    fn empty() -> Self {
        Self {
            keys: HashMap::new(),
            expires_at: Instant::now(),
        }
    }

    fn is_fresh(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

/// Cache of verification keys fetched from one JWKS URL.
pub struct KeyRing {
    http_client: reqwest::Client,
    jwks_url: Url,
    config: JwksConfig,
    state: ArcSwap<KeySet>,
}

impl KeyRing {
    /// Creates an empty ring for `jwks_url`. Nothing is fetched until the
    /// first lookup.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Configuration`] if the URL does not parse.
    pub fn new(http_client: reqwest::Client, jwks_url: &str, config: JwksConfig) -> AuthResult<Self> {
        let jwks_url = Url::parse(jwks_url)
            .map_err(|e| AuthError::configuration(format!("invalid JWKS URL '{jwks_url}': {e}")))?;

        Ok(Self {
            http_client,
            jwks_url,
            config,
            state: ArcSwap::from_pointee(KeySet::empty()),
        })
    }

    /// The JWKS URL this ring refreshes from.
    #[must_use]
    pub fn jwks_url(&self) -> &Url {
        &self.jwks_url
    }

    /// Returns the verification key for `kid`.
    ///
    /// Checks the cached set first. On a miss or an expired set, refreshes
    /// once and looks again.
    ///
    /// # Errors
    ///
    /// - [`AuthError::KeyNotFound`] if the key is absent after the refresh
    /// - [`AuthError::Upstream`] if the refresh fails
    /// - [`AuthError::Configuration`] if the URL scheme is not allowed
    pub async fn get_verification_key(&self, kid: &str) -> AuthResult<Arc<VerificationKey>> {
        {
            let current = self.state.load();
            if current.is_fresh()
                && let Some(key) = current.keys.get(kid)
            {
                tracing::trace!(kid, "Key ring hit");
                return Ok(Arc::clone(key));
            }
        }

        tracing::debug!(kid, jwks_url = %self.jwks_url, "Key ring miss, refreshing");
        let refreshed = self.refresh().await?;

        refreshed.keys.get(kid).cloned().ok_or_else(|| {
            tracing::debug!(kid, "Key still absent after refresh");
            AuthError::key_not_found(kid)
        })
    }

    /// Fetches the JWKS document and replaces the cached set.
    ///
    /// # Errors
    ///
    /// Returns an error if the scheme is not allowed, the request fails, the
    /// response is too large or cannot be parsed. The previous set is kept.
    async fn refresh(&self) -> AuthResult<Arc<KeySet>> {
        self.validate_scheme()?;

        let response = self
            .http_client
            .get(self.jwks_url.as_str())
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| {
                tracing::warn!("Failed to fetch JWKS from {}: {}", self.jwks_url, e);
                AuthError::upstream_transport(format!("JWKS fetch: {e}"))
            })?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(status = status.as_u16(), "JWKS endpoint returned an error");
            return Err(AuthError::upstream_status(
                status.as_u16(),
                format!("JWKS endpoint {}", self.jwks_url),
            ));
        }

        if let Some(len) = response.content_length()
            && len as usize > self.config.max_response_size
        {
            return Err(self.too_large(status.as_u16()));
        }

        let ttl = self.parse_cache_control(response.headers());

        let body = response.bytes().await.map_err(|e| {
            AuthError::upstream_transport(format!("JWKS body: {e}"))
        })?;
        if body.len() > self.config.max_response_size {
            return Err(self.too_large(status.as_u16()));
        }

        let document: JwkSetDocument = serde_json::from_slice(&body).map_err(|e| {
            tracing::warn!("Failed to parse JWKS from {}: {}", self.jwks_url, e);
            AuthError::upstream_protocol(status.as_u16(), format!("JWKS parse: {e}"))
        })?;

        let keys = import_keys(document);
        tracing::debug!(
            "Cached JWKS from {} with {} keys, TTL {:?}",
            self.jwks_url,
            keys.len(),
            ttl
        );

        let set = Arc::new(KeySet {
            keys,
            expires_at: deadline_after(ttl),
        });
        self.state.store(Arc::clone(&set));
        Ok(set)
    }

    /// Replaces the cached set with the keys of an in-memory JWKS document,
    /// valid for `default_ttl`. Returns the number of imported keys.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Format`] if the document is not a JWKS object.
    pub fn seed(&self, document: &serde_json::Value) -> AuthResult<usize> {
        let document: JwkSetDocument = serde_json::from_value(document.clone())
            .map_err(|e| AuthError::format(format!("invalid JWKS document: {e}")))?;
        let keys = import_keys(document);
        let count = keys.len();

        self.state.store(Arc::new(KeySet {
            keys,
            expires_at: deadline_after(self.config.default_ttl),
        }));
        Ok(count)
    }

    /// Drops every cached key; the next lookup refreshes.
    pub fn invalidate(&self) {
        self.state.store(Arc::new(KeySet::empty()));
        tracing::debug!("Invalidated key ring for {}", self.jwks_url);
    }

    /// Number of cached keys, fresh or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.load().keys.len()
    }

    /// Returns `true` if no keys are cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.load().keys.is_empty()
    }

    fn validate_scheme(&self) -> AuthResult<()> {
        match self.jwks_url.scheme() {
            "https" => Ok(()),
            "http" if self.config.allow_http => Ok(()),
            _ => Err(AuthError::configuration(format!(
                "JWKS URL must use HTTPS: {}",
                self.jwks_url
            ))),
        }
    }

    /// Extracts `max-age` and clamps it to `[min_ttl, max_ttl]`.
    fn parse_cache_control(&self, headers: &reqwest::header::HeaderMap) -> Duration {
        let ttl = headers
            .get(reqwest::header::CACHE_CONTROL)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| {
                v.split(',').find_map(|directive| {
                    directive
                        .trim()
                        .strip_prefix("max-age=")
                        .and_then(|secs| secs.trim_matches('"').parse::<u64>().ok())
                })
            })
            .map(Duration::from_secs)
            .unwrap_or(self.config.default_ttl);

        ttl.min(self.config.max_ttl).max(self.config.min_ttl)
    }

    fn too_large(&self, status: u16) -> AuthError {
        AuthError::upstream_protocol(
            status,
            format!(
                "JWKS response exceeds maximum size of {} bytes",
                self.config.max_response_size
            ),
        )
    }
}

impl std::fmt::Debug for KeyRing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyRing")
            .field("jwks_url", &self.jwks_url.as_str())
            .field("keys", &self.len())
            .finish()
    }
}

fn import_keys(document: JwkSetDocument) -> HashMap<String, Arc<VerificationKey>> {
    let mut keys = HashMap::with_capacity(document.keys.len());

    for jwk in document.keys {
        let Some(kid) = jwk.kid.filter(|k| !k.is_empty()) else {
            tracing::debug!("Skipping JWK without kid");
            continue;
        };
        if jwk.kty.as_deref() != Some("RSA") {
            tracing::debug!(kid = %kid, kty = ?jwk.kty, "Skipping non-RSA JWK");
            continue;
        }
        if jwk.key_use.as_deref() == Some("enc") {
            tracing::debug!(kid = %kid, "Skipping encryption JWK");
            continue;
        }
        if let Some(alg) = jwk.alg.as_deref()
            && alg != RS256
        {
            tracing::debug!(kid = %kid, alg, "Skipping JWK with unsupported alg");
            continue;
        }
        let (Some(n), Some(e)) = (jwk.n.as_deref(), jwk.e.as_deref()) else {
            tracing::debug!(kid = %kid, "Skipping RSA JWK without modulus or exponent");
            continue;
        };

        match VerificationKey::from_components(kid.clone(), n, e) {
            Ok(key) => {
                keys.insert(kid, Arc::new(key));
            }
            Err(err) => tracing::debug!(kid = %kid, error = %err, "Skipping unusable RSA JWK"),
        }
    }

    keys
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config() -> JwksConfig {
        JwksConfig {
            allow_http: true,
            ..JwksConfig::default()
        }
    }

    fn ring(server: &MockServer) -> KeyRing {
        KeyRing::new(
            reqwest::Client::new(),
            &format!("{}/jwks", server.uri()),
            test_config(),
        )
        .unwrap()
    }

    #[test]
    fn test_validate_scheme() {
        let https = KeyRing::new(
            reqwest::Client::new(),
            "https://example.com/jwks",
            JwksConfig::default(),
        )
        .unwrap();
        assert!(https.validate_scheme().is_ok());

        let http = KeyRing::new(
            reqwest::Client::new(),
            "http://example.com/jwks",
            JwksConfig::default(),
        )
        .unwrap();
        assert!(matches!(
            http.validate_scheme(),
            Err(AuthError::Configuration { .. })
        ));

        let allowed =
            KeyRing::new(reqwest::Client::new(), "http://example.com/jwks", test_config()).unwrap();
        assert!(allowed.validate_scheme().is_ok());
    }

    #[test]
    fn test_invalid_url_rejected() {
        let err = KeyRing::new(reqwest::Client::new(), "not a url", test_config()).unwrap_err();
        assert!(matches!(err, AuthError::Configuration { .. }));
    }

    #[test]
    fn test_parse_cache_control() {
        let config = JwksConfig {
            default_ttl: Duration::from_secs(3600),
            min_ttl: Duration::from_secs(60),
            max_ttl: Duration::from_secs(7200),
            ..test_config()
        };
        let ring = KeyRing::new(reqwest::Client::new(), "https://example.com/jwks", config).unwrap();
        let with = |value: &str| {
            let mut headers = reqwest::header::HeaderMap::new();
            headers.insert(reqwest::header::CACHE_CONTROL, value.parse().unwrap());
            ring.parse_cache_control(&headers)
        };

        assert_eq!(
            ring.parse_cache_control(&reqwest::header::HeaderMap::new()),
            Duration::from_secs(3600)
        );
        assert_eq!(with("public, max-age=1800"), Duration::from_secs(1800));
        assert_eq!(with("max-age=10"), Duration::from_secs(60));
        assert_eq!(with("max-age=999999"), Duration::from_secs(7200));
        assert_eq!(with("max-age=soon"), Duration::from_secs(3600));
        assert_eq!(with("no-cache"), Duration::from_secs(3600));
    }

    #[test]
    fn test_import_skips_unusable_keys() {
        let (n, e) = testutil::verification_key("x").to_components();
        let document: JwkSetDocument = serde_json::from_value(json!({
            "keys": [
                {"kty": "RSA", "kid": "good", "alg": "RS256", "use": "sig", "n": n, "e": e},
                {"kty": "RSA", "kid": "no-alg", "n": n, "e": e},
                {"kty": "RSA", "kid": "enc", "use": "enc", "n": n, "e": e},
                {"kty": "RSA", "kid": "ps256", "alg": "PS256", "n": n, "e": e},
                {"kty": "EC", "kid": "ec", "crv": "P-256", "x": "AA", "y": "AA"},
                {"kty": "RSA", "n": n, "e": e},
                {"kty": "RSA", "kid": "broken", "n": "!!", "e": e}
            ]
        }))
        .unwrap();

        let keys = import_keys(document);
        let mut kids: Vec<_> = keys.keys().cloned().collect();
        kids.sort();
        assert_eq!(kids, vec!["good".to_string(), "no-alg".to_string()]);
    }

    #[tokio::test]
    async fn test_fetches_on_first_use_then_serves_from_cache() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/jwks"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("cache-control", "public, max-age=600")
                    .set_body_json(testutil::jwks_document("k1")),
            )
            .expect(1)
            .mount(&server)
            .await;

        let ring = ring(&server);
        assert!(ring.is_empty());

        let key = ring.get_verification_key("k1").await.unwrap();
        assert_eq!(key.key_id, "k1");
        assert_eq!(*key, testutil::verification_key("k1"));

        ring.get_verification_key("k1").await.unwrap();
        assert_eq!(ring.len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_kid_refreshes_once_then_fails() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/jwks"))
            .respond_with(ResponseTemplate::new(200).set_body_json(testutil::jwks_document("k1")))
            .expect(1)
            .mount(&server)
            .await;

        let ring = ring(&server);
        ring.seed(&testutil::jwks_document("k1")).unwrap();

        let err = ring.get_verification_key("k2").await.unwrap_err();
        assert!(matches!(err, AuthError::KeyNotFound { ref kid } if kid == "k2"));

        // k1 is still served from the refreshed set without another fetch.
        assert!(ring.get_verification_key("k1").await.is_ok());
        assert_eq!(ring.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_previous_keys() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/jwks"))
            .respond_with(ResponseTemplate::new(503))
            .expect(1)
            .mount(&server)
            .await;

        let ring = ring(&server);
        assert_eq!(ring.seed(&testutil::jwks_document("k1")).unwrap(), 1);

        let err = ring.get_verification_key("k2").await.unwrap_err();
        assert_eq!(err.upstream_status_code(), Some(503));

        let key = ring.get_verification_key("k1").await.unwrap();
        assert_eq!(key.key_id, "k1");
    }

    #[tokio::test]
    async fn test_zero_max_age_still_serves_refreshed_key() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/jwks"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("cache-control", "max-age=0")
                    .set_body_json(testutil::jwks_document("k1")),
            )
            .expect(2)
            .mount(&server)
            .await;

        let ring = ring(&server);
        assert!(ring.get_verification_key("k1").await.is_ok());
        assert!(ring.get_verification_key("k1").await.is_ok());
    }

    #[test]
    fn test_unbounded_default_ttl_saturates() {
        let ring = KeyRing::new(
            reqwest::Client::new(),
            "https://keys.invalid/jwks",
            JwksConfig {
                default_ttl: Duration::MAX,
                ..JwksConfig::default()
            },
        )
        .unwrap();

        assert_eq!(ring.seed(&testutil::jwks_document("k1")).unwrap(), 1);
        assert_eq!(ring.len(), 1);
    }

    #[tokio::test]
    async fn test_oversized_response_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/jwks"))
            .respond_with(ResponseTemplate::new(200).set_body_json(testutil::jwks_document("k1")))
            .mount(&server)
            .await;

        let config = JwksConfig {
            max_response_size: 16,
            ..test_config()
        };
        let ring = KeyRing::new(
            reqwest::Client::new(),
            &format!("{}/jwks", server.uri()),
            config,
        )
        .unwrap();

        let err = ring.get_verification_key("k1").await.unwrap_err();
        assert!(matches!(err, AuthError::Upstream { .. }));
        assert!(ring.is_empty());
    }

    #[tokio::test]
    async fn test_invalidate_forces_refetch() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/jwks"))
            .respond_with(ResponseTemplate::new(200).set_body_json(testutil::jwks_document("k1")))
            .expect(2)
            .mount(&server)
            .await;

        let ring = ring(&server);
        ring.get_verification_key("k1").await.unwrap();
        ring.invalidate();
        assert!(ring.is_empty());
        ring.get_verification_key("k1").await.unwrap();
    }

    #[test]
    fn test_seed_rejects_non_document() {
        let ring =
            KeyRing::new(reqwest::Client::new(), "https://example.com/jwks", test_config()).unwrap();
        assert!(matches!(
            ring.seed(&json!("nope")),
            Err(AuthError::Format { .. })
        ));
    }
}
