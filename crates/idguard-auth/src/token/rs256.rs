//! RSASSA-PKCS1-v1_5 with SHA-256 (JWS `RS256`).
//!
//! Signing and verification sit behind the [`Signer`] and [`Verifier`]
//! traits so the JWT code never touches RSA directly and can be exercised
//! against known vectors on its own.

use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs1v15::{Signature, SigningKey, VerifyingKey};
use rsa::pkcs8::DecodePrivateKey;
use rsa::signature::{SignatureEncoding, Signer as _, Verifier as _};
use rsa::traits::PublicKeyParts;
use rsa::{BigUint, RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;

use crate::AuthResult;
use crate::error::AuthError;
use crate::token::base64url;

/// JWS algorithm name for RSASSA-PKCS1-v1_5 / SHA-256.
pub const RS256: &str = "RS256";

/// Produces signatures over arbitrary bytes.
pub trait Signer: Send + Sync {
    /// JWS `alg` value for signatures produced by this signer.
    fn algorithm(&self) -> &'static str;

    /// Signs `message`.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying primitive fails.
    fn sign(&self, message: &[u8]) -> AuthResult<Vec<u8>>;
}

/// Checks signatures against a public key.
pub trait Verifier: Send + Sync {
    /// Returns `true` only if `signature` is valid for `message` under `key`.
    fn verify(&self, key: &VerificationKey, message: &[u8], signature: &[u8]) -> bool;
}

/// RS256 signer backed by an RSA private key.
#[derive(Clone)]
pub struct Rs256Signer {
    signing_key: SigningKey<Sha256>,
}

impl Rs256Signer {
    /// Wraps an already-parsed private key.
    #[must_use]
    pub fn new(private_key: RsaPrivateKey) -> Self {
        Self {
            signing_key: SigningKey::<Sha256>::new(private_key),
        }
    }

    /// Imports a PEM private key (PKCS#8 `PRIVATE KEY`, or PKCS#1
    /// `RSA PRIVATE KEY` as a fallback).
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Configuration`] if the PEM cannot be parsed. This
    /// is fatal: a malformed service key never becomes valid on retry.
    pub fn from_pem(pem: &str) -> AuthResult<Self> {
        let private_key = RsaPrivateKey::from_pkcs8_pem(pem)
            .or_else(|pkcs8_err| {
                RsaPrivateKey::from_pkcs1_pem(pem).map_err(|_| pkcs8_err.to_string())
            })
            .map_err(|e| AuthError::configuration(format!("invalid private key: {e}")))?;
        Ok(Self::new(private_key))
    }
}

impl std::fmt::Debug for Rs256Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rs256Signer").finish_non_exhaustive()
    }
}

impl Signer for Rs256Signer {
    fn algorithm(&self) -> &'static str {
        RS256
    }

    fn sign(&self, message: &[u8]) -> AuthResult<Vec<u8>> {
        let signature = self
            .signing_key
            .try_sign(message)
            .map_err(|e| AuthError::internal(format!("RS256 signing failed: {e}")))?;
        Ok(signature.to_vec())
    }
}

/// RS256 verifier.
#[derive(Debug, Clone, Copy, Default)]
pub struct Rs256Verifier;

impl Verifier for Rs256Verifier {
    fn verify(&self, key: &VerificationKey, message: &[u8], signature: &[u8]) -> bool {
        let Ok(signature) = Signature::try_from(signature) else {
            return false;
        };
        VerifyingKey::<Sha256>::new(key.public_key.clone())
            .verify(message, &signature)
            .is_ok()
    }
}

/// An imported, verify-only RSA public key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationKey {
    /// Key id (`kid`) this key is published under.
    pub key_id: String,
    public_key: RsaPublicKey,
}

impl VerificationKey {
    /// Wraps a parsed public key.
    #[must_use]
    pub fn new(key_id: impl Into<String>, public_key: RsaPublicKey) -> Self {
        Self {
            key_id: key_id.into(),
            public_key,
        }
    }

    /// Imports a key from base64url-encoded JWK modulus (`n`) and exponent (`e`).
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Format`] for undecodable components and
    /// [`AuthError::Configuration`] if they do not form a usable RSA key.
    pub fn from_components(key_id: impl Into<String>, n: &str, e: &str) -> AuthResult<Self> {
        let n = BigUint::from_bytes_be(&base64url::decode(n)?);
        let e = BigUint::from_bytes_be(&base64url::decode(e)?);
        let public_key = RsaPublicKey::new(n, e)
            .map_err(|e| AuthError::configuration(format!("invalid RSA public key: {e}")))?;
        Ok(Self::new(key_id, public_key))
    }

    /// Returns the base64url modulus and exponent, as published in a JWK.
    #[must_use]
    pub fn to_components(&self) -> (String, String) {
        (
            base64url::encode(self.public_key.n().to_bytes_be()),
            base64url::encode(self.public_key.e().to_bytes_be()),
        )
    }

    /// Returns the underlying RSA key.
    #[must_use]
    pub fn public_key(&self) -> &RsaPublicKey {
        &self.public_key
    }
}
