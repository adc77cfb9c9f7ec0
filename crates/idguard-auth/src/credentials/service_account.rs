//! Service identity key material.
//!
//! The identity is configured as three values: the project id, the service
//! account email and the PEM private key, base64-encoded so it survives
//! environment variables and secret managers that mangle newlines.

use std::fmt;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::AuthResult;
use crate::config::ConfigError;
use crate::error::AuthError;
use crate::token::rs256::Rs256Signer;

/// Environment variable holding the project id.
pub const ENV_PROJECT_ID: &str = "IDGUARD_PROJECT_ID";

/// Environment variable holding the service account email.
pub const ENV_CLIENT_EMAIL: &str = "IDGUARD_CLIENT_EMAIL";

/// Environment variable holding the base64-encoded PEM private key.
pub const ENV_PRIVATE_KEY: &str = "IDGUARD_PRIVATE_KEY";

/// The service's own identity: who it is and the key it signs assertions with.
///
/// Immutable once loaded. The private key never appears in `Debug` output.
#[derive(Clone)]
pub struct ServiceIdentity {
    project_id: String,
    client_email: String,
    signer: Arc<Rs256Signer>,
}

impl ServiceIdentity {
    /// Builds an identity from a PEM private key.
    ///
    /// Literal `\n` sequences in the PEM are turned into newlines.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Configuration`] if any value is empty or the key
    /// cannot be imported.
    pub fn new(
        project_id: impl Into<String>,
        client_email: impl Into<String>,
        private_key_pem: &str,
    ) -> AuthResult<Self> {
        let project_id = project_id.into();
        let client_email = client_email.into();

        if project_id.trim().is_empty() {
            return Err(ConfigError::Missing(ENV_PROJECT_ID.to_string()).into());
        }
        if client_email.trim().is_empty() {
            return Err(ConfigError::Missing(ENV_CLIENT_EMAIL.to_string()).into());
        }
        if private_key_pem.trim().is_empty() {
            return Err(ConfigError::Missing(ENV_PRIVATE_KEY.to_string()).into());
        }

        let pem = private_key_pem.replace("\\n", "\n");
        let signer = Rs256Signer::from_pem(&pem)?;

        Ok(Self {
            project_id,
            client_email,
            signer: Arc::new(signer),
        })
    }

    /// Builds an identity from a base64-encoded PEM private key.
    ///
    /// A value that is already PEM (starts with `-----BEGIN`) is accepted as is.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Configuration`] if the key is not valid base64,
    /// not UTF-8, or not an importable RSA key.
    pub fn from_base64_pem(
        project_id: impl Into<String>,
        client_email: impl Into<String>,
        private_key_b64: &str,
    ) -> AuthResult<Self> {
        let trimmed = private_key_b64.trim();
        if trimmed.starts_with("-----BEGIN") {
            return Self::new(project_id, client_email, trimmed);
        }

        let compact: String = trimmed.chars().filter(|c| !c.is_whitespace()).collect();
        let bytes = STANDARD.decode(compact.as_bytes()).map_err(|e| {
            AuthError::configuration(format!("{ENV_PRIVATE_KEY} is not valid base64: {e}"))
        })?;
        let pem = String::from_utf8(bytes).map_err(|_| {
            AuthError::configuration(format!("{ENV_PRIVATE_KEY} does not decode to UTF-8 PEM"))
        })?;
        Self::new(project_id, client_email, &pem)
    }

    /// Loads the identity through a key lookup function.
    ///
    /// `lookup` is called with [`ENV_PROJECT_ID`], [`ENV_CLIENT_EMAIL`] and
    /// [`ENV_PRIVATE_KEY`].
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Configuration`] naming the first missing variable,
    /// or describing why the key could not be imported.
    pub fn from_lookup<F>(lookup: F) -> AuthResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &str| {
            lookup(name)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| AuthError::from(ConfigError::Missing(name.to_string())))
        };

        let project_id = required(ENV_PROJECT_ID)?;
        let client_email = required(ENV_CLIENT_EMAIL)?;
        let private_key = required(ENV_PRIVATE_KEY)?;

        Self::from_base64_pem(project_id, client_email, &private_key)
    }

    /// Loads the identity from the process environment.
    ///
    /// # Errors
    ///
    /// See [`ServiceIdentity::from_lookup`].
    pub fn from_env() -> AuthResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// The project id.
    #[must_use]
    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    /// The service account email.
    #[must_use]
    pub fn client_email(&self) -> &str {
        &self.client_email
    }

    /// The RS256 signer for this identity's private key.
    #[must_use]
    pub fn signer(&self) -> &Rs256Signer {
        &self.signer
    }
}

impl fmt::Debug for ServiceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceIdentity")
            .field("project_id", &self.project_id)
            .field("client_email", &self.client_email)
            .field("private_key", &"<redacted>")
            .finish()
    }
}
