//! The identity service: every component wired from one configuration.
//!
//! [`IdentityService`] is the surface applications use. Each operation emits
//! exactly one `tracing` event under the `idguard::audit` target carrying the
//! operation name, the outcome and, on failure, the [`ErrorCategory`].
//!
//! [`ErrorCategory`]: crate::error::ErrorCategory

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};

use crate::AuthResult;
use crate::config::IdentityConfig;
use crate::credentials::{AccessTokenBroker, AccessTokenSource, ServiceIdentity};
use crate::error::AuthError;
use crate::jwks::KeyRing;
use crate::management::{DirectoryClient, ManagementApi, SessionCookieIssuer, UserDirectory};
use crate::verify::{TokenVerifier, VerificationPolicy, VerificationResult};

/// Token verification, session cookies and account administration for one
/// project.
#[derive(Debug)]
pub struct IdentityService {
    identity: Arc<ServiceIdentity>,
    broker: Arc<AccessTokenBroker>,
    directory: Arc<DirectoryClient>,
    cookies: SessionCookieIssuer,
    verifier: TokenVerifier,
}

impl IdentityService {
    /// Builds the service from `config` for `identity`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Configuration`] if the configuration does not
    /// validate, and [`AuthError::Internal`] if the HTTP client cannot be built.
    pub fn new(config: &IdentityConfig, identity: ServiceIdentity) -> AuthResult<Self> {
        config.validate()?;

        let http_client = reqwest::Client::builder()
            .timeout(config.http.request_timeout)
            .build()
            .map_err(|e| AuthError::internal(format!("failed to build HTTP client: {e}")))?;

        let identity = Arc::new(identity);
        let project_id = identity.project_id().to_string();

        let broker = Arc::new(AccessTokenBroker::new(
            http_client.clone(),
            Arc::clone(&identity),
            config.endpoints.token.clone(),
            &config.broker,
        ));

        let api = ManagementApi::new(
            http_client.clone(),
            config.endpoints.management.clone(),
            project_id.clone(),
            Arc::clone(&broker) as Arc<dyn AccessTokenSource>,
        );
        let directory = Arc::new(DirectoryClient::new(api.clone()));
        let cookies = SessionCookieIssuer::new(api);

        let id_token_keys = Arc::new(KeyRing::new(
            http_client.clone(),
            &config.endpoints.id_token_jwks,
            config.jwks.clone(),
        )?);
        let session_cookie_keys = Arc::new(KeyRing::new(
            http_client,
            &config.endpoints.session_cookie_jwks,
            config.jwks.clone(),
        )?);

        let verifier = TokenVerifier::new(
            VerificationPolicy::id_token(&project_id, id_token_keys),
            VerificationPolicy::session_cookie(
                &project_id,
                &config.verifier.session_cookie_audience,
                session_cookie_keys,
            ),
            Arc::clone(&directory) as Arc<dyn UserDirectory>,
            &config.verifier,
        );

        tracing::debug!(project_id = %project_id, "Identity service initialized");

        Ok(Self {
            identity,
            broker,
            directory,
            cookies,
            verifier,
        })
    }

    /// Builds the service with the identity taken from the environment.
    ///
    /// # Errors
    ///
    /// See [`ServiceIdentity::from_env`] and [`IdentityService::new`].
    pub fn from_env(config: &IdentityConfig) -> AuthResult<Self> {
        Self::new(config, ServiceIdentity::from_env()?)
    }

    /// The project this service serves.
    #[must_use]
    pub fn project_id(&self) -> &str {
        self.identity.project_id()
    }

    /// The underlying verifier.
    #[must_use]
    pub fn verifier(&self) -> &TokenVerifier {
        &self.verifier
    }

    /// Verifies a session cookie.
    ///
    /// # Errors
    ///
    /// Returns the verification failure; see [`TokenVerifier::verify`].
    pub async fn verify_session_cookie(
        &self,
        cookie: &str,
        check_revoked: bool,
    ) -> AuthResult<VerificationResult> {
        let result = self.verifier.verify_session_cookie(cookie, check_revoked).await;
        audit_verification("verify_session_cookie", check_revoked, &result);
        result
    }

    /// Verifies an identity token.
    ///
    /// # Errors
    ///
    /// Returns the verification failure; see [`TokenVerifier::verify`].
    pub async fn verify_id_token(
        &self,
        token: &str,
        check_revoked: bool,
    ) -> AuthResult<VerificationResult> {
        let result = self.verifier.verify_id_token(token, check_revoked).await;
        audit_verification("verify_id_token", check_revoked, &result);
        result
    }

    /// Exchanges an identity token for a session cookie.
    ///
    /// # Errors
    ///
    /// See [`SessionCookieIssuer::issue_session_cookie`].
    pub async fn issue_session_cookie(
        &self,
        id_token: &str,
        lifetime: Duration,
    ) -> AuthResult<String> {
        let result = self.cookies.issue_session_cookie(id_token, lifetime).await;
        audit("issue_session_cookie", None, &result);
        result
    }

    /// Revokes every session of `subject_id`.
    ///
    /// # Errors
    ///
    /// See [`DirectoryClient::revoke_all`].
    pub async fn revoke_sessions_for(&self, subject_id: &str) -> AuthResult<()> {
        let result = self.directory.revoke_all(subject_id).await;
        audit("revoke_sessions_for", Some(subject_id), &result);
        result
    }

    /// Sets the `role` custom claim of `subject_id`, keeping its other
    /// custom attributes.
    ///
    /// # Errors
    ///
    /// [`AuthError::InvalidArgument`] for an empty role,
    /// [`AuthError::UserNotFound`] for an unknown subject, otherwise see
    /// [`DirectoryClient::set_custom_attributes`].
    pub async fn set_role_claim(&self, subject_id: &str, role: &str) -> AuthResult<()> {
        let result = self.write_role(subject_id, role).await;
        audit("set_role_claim", Some(subject_id), &result);
        result
    }

    /// Returns a bearer token for the service identity.
    ///
    /// # Errors
    ///
    /// See [`AccessTokenBroker::get_access_token`].
    pub async fn access_token(&self) -> AuthResult<String> {
        let result = self.broker.get_access_token().await;
        audit("access_token", None, &result);
        result
    }

    async fn write_role(&self, subject_id: &str, role: &str) -> AuthResult<()> {
        if role.trim().is_empty() {
            return Err(AuthError::invalid_argument("role must not be empty"));
        }

        let record = self
            .directory
            .lookup(subject_id)
            .await?
            .ok_or_else(|| AuthError::user_not_found(subject_id))?;

        let existing = record
            .custom_attributes
            .as_deref()
            .map(serde_json::from_str::<Value>);
        let mut attributes = match existing {
            Some(Ok(Value::Object(map))) => map,
            None => Map::new(),
            Some(_) => {
                tracing::warn!("Replacing unreadable custom attributes");
                Map::new()
            }
        };
        attributes.insert("role".to_string(), Value::String(role.to_string()));

        self.directory
            .set_custom_attributes(subject_id, &attributes)
            .await
    }
}

fn audit<T>(operation: &'static str, subject_id: Option<&str>, result: &AuthResult<T>) {
    match result {
        Ok(_) => tracing::info!(
            target: "idguard::audit",
            operation,
            subject_id,
            outcome = "success",
            "Operation succeeded"
        ),
        Err(err) => tracing::warn!(
            target: "idguard::audit",
            operation,
            subject_id,
            outcome = "failure",
            category = %err.category(),
            error = %err,
            "Operation failed"
        ),
    }
}

fn audit_verification(
    operation: &'static str,
    check_revoked: bool,
    result: &AuthResult<VerificationResult>,
) {
    match result {
        Ok(verified) => tracing::info!(
            target: "idguard::audit",
            operation,
            check_revoked,
            subject_id = %verified.subject_id,
            outcome = "success",
            "Token verified"
        ),
        Err(err) => tracing::warn!(
            target: "idguard::audit",
            operation,
            check_revoked,
            outcome = "failure",
            category = %err.category(),
            error = %err,
            "Token rejected"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn mock_token_endpoint(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"access_token": "AT1", "expires_in": 3600})),
            )
            .mount(server)
            .await;
    }

    fn config(server: &MockServer) -> IdentityConfig {
        let mut config = IdentityConfig::default();
        config.endpoints.token = format!("{}/token", server.uri());
        config.endpoints.management = format!("{}/v1", server.uri());
        config.endpoints.id_token_jwks = format!("{}/id-jwks", server.uri());
        config.endpoints.session_cookie_jwks = format!("{}/cookie-jwks", server.uri());
        config.jwks.allow_http = true;
        config
    }

    fn service(server: &MockServer) -> IdentityService {
        IdentityService::new(&config(server), testutil::service_identity()).unwrap()
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = IdentityConfig::default();
        config.broker.scope = String::new();
        let err = IdentityService::new(&config, testutil::service_identity()).unwrap_err();
        assert!(matches!(err, AuthError::Configuration { .. }));
    }

    #[tokio::test]
    async fn test_verify_id_token_end_to_end() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/id-jwks"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("cache-control", "public, max-age=3600")
                    .set_body_json(testutil::jwks_document("k1")),
            )
            .expect(1)
            .mount(&server)
            .await;

        let service = service(&server);
        assert_eq!(service.project_id(), testutil::PROJECT_ID);

        let token = testutil::mint("k1", &testutil::id_token_claims("user-1"));
        let result = service.verify_id_token(&token, false).await.unwrap();
        assert_eq!(result.subject_id, "user-1");

        // Second verification is served from the key ring.
        service.verify_id_token(&token, false).await.unwrap();
    }

    #[tokio::test]
    async fn test_verify_session_cookie_with_revocation_check() {
        let server = MockServer::start().await;
        mock_token_endpoint(&server).await;
        Mock::given(method("GET"))
            .and(path("/cookie-jwks"))
            .respond_with(ResponseTemplate::new(200).set_body_json(testutil::jwks_document("c1")))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/projects/demo-project/accounts:lookup"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "users": [{"localId": "user-1", "validSince": "1"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let cookie = testutil::mint("c1", &testutil::session_cookie_claims("user-1"));
        let result = service(&server)
            .verify_session_cookie(&cookie, true)
            .await
            .unwrap();
        assert_eq!(result.subject_id, "user-1");
        assert_eq!(result.role.as_deref(), Some("admin"));
    }

    #[tokio::test]
    async fn test_issue_session_cookie() {
        let server = MockServer::start().await;
        mock_token_endpoint(&server).await;
        Mock::given(method("POST"))
            .and(path("/v1/projects/demo-project:createSessionCookie"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"sessionCookie": "cookie"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let cookie = service(&server)
            .issue_session_cookie("id.tok.en", Duration::from_secs(5 * 24 * 3600))
            .await
            .unwrap();
        assert_eq!(cookie, "cookie");
    }

    #[tokio::test]
    async fn test_set_role_claim_keeps_other_attributes() {
        let server = MockServer::start().await;
        mock_token_endpoint(&server).await;
        Mock::given(method("POST"))
            .and(path("/v1/projects/demo-project/accounts:lookup"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "users": [{"localId": "user-1", "customAttributes": "{\"tier\":\"gold\"}"}]
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/projects/demo-project/accounts:update"))
            .and(body_partial_json(json!({"localId": "user-1"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"localId": "user-1"})))
            .expect(1)
            .mount(&server)
            .await;

        service(&server)
            .set_role_claim("user-1", "editor")
            .await
            .unwrap();

        let requests = server.received_requests().await.unwrap();
        let update = requests
            .iter()
            .find(|r| r.url.path().ends_with("accounts:update"))
            .unwrap();
        let body: Value = serde_json::from_slice(&update.body).unwrap();
        let attributes: Value =
            serde_json::from_str(body["customAttributes"].as_str().unwrap()).unwrap();
        assert_eq!(attributes, json!({"role": "editor", "tier": "gold"}));
    }

    #[tokio::test]
    async fn test_set_role_claim_unknown_user() {
        let server = MockServer::start().await;
        mock_token_endpoint(&server).await;
        Mock::given(method("POST"))
            .and(path("/v1/projects/demo-project/accounts:lookup"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&server)
            .await;

        let err = service(&server)
            .set_role_claim("ghost", "editor")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::UserNotFound { .. }));
    }

    #[tokio::test]
    async fn test_revoke_and_access_token_share_broker_cache() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"access_token": "AT1", "expires_in": 3600})),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/projects/demo-project/accounts:update"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"localId": "user-1"})))
            .expect(1)
            .mount(&server)
            .await;

        let service = service(&server);
        assert_eq!(service.access_token().await.unwrap(), "AT1");
        service.revoke_sessions_for("user-1").await.unwrap();
    }
}
