//! Shared fixtures for unit tests: one RSA key pair per test binary and
//! helpers for minting tokens signed with it.

use std::sync::LazyLock;

use rand::rngs::OsRng;
use rsa::RsaPrivateKey;
use rsa::pkcs8::{EncodePrivateKey, LineEnding};
use serde_json::{Value, json};
use time::OffsetDateTime;

use crate::credentials::ServiceIdentity;
use crate::token::base64url;
use crate::token::jwt::{JwtHeader, encode_token};
use crate::token::rs256::{Rs256Signer, VerificationKey};

pub const PROJECT_ID: &str = "demo-project";
pub const CLIENT_EMAIL: &str = "svc@demo-project.iam.gserviceaccount.com";

static PRIMARY: LazyLock<RsaPrivateKey> =
    LazyLock::new(|| RsaPrivateKey::new(&mut OsRng, 2048).expect("generate test key"));

static SECONDARY: LazyLock<RsaPrivateKey> =
    LazyLock::new(|| RsaPrivateKey::new(&mut OsRng, 2048).expect("generate test key"));

pub fn signer() -> Rs256Signer {
    Rs256Signer::new(PRIMARY.clone())
}

pub fn other_signer() -> Rs256Signer {
    Rs256Signer::new(SECONDARY.clone())
}

pub fn verification_key(kid: &str) -> VerificationKey {
    VerificationKey::new(kid, PRIMARY.to_public_key())
}

pub fn other_verification_key(kid: &str) -> VerificationKey {
    VerificationKey::new(kid, SECONDARY.to_public_key())
}

pub fn private_key_pem() -> String {
    PRIMARY
        .to_pkcs8_pem(LineEnding::LF)
        .expect("encode test key")
        .to_string()
}

pub fn service_identity() -> ServiceIdentity {
    ServiceIdentity::new(PROJECT_ID, CLIENT_EMAIL, &private_key_pem()).expect("test identity")
}

/// A JWKS document publishing the primary key under `kid`.
pub fn jwks_document(kid: &str) -> Value {
    let (n, e) = verification_key(kid).to_components();
    json!({
        "keys": [
            {"kty": "RSA", "kid": kid, "use": "sig", "alg": "RS256", "n": n, "e": e}
        ]
    })
}

pub fn now() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}

/// Claims of a well-formed identity token for `demo-project`.
pub fn id_token_claims(sub: &str) -> Value {
    let now = now();
    json!({
        "iss": format!("https://securetoken.google.com/{PROJECT_ID}"),
        "aud": PROJECT_ID,
        "sub": sub,
        "iat": now - 10,
        "exp": now + 3600,
        "auth_time": now - 20,
        "email": "ada@example.com",
        "email_verified": true,
        "name": "Ada Lovelace",
        "role": "admin",
    })
}

/// Claims of a well-formed session cookie for `demo-project`.
pub fn session_cookie_claims(sub: &str) -> Value {
    let mut claims = id_token_claims(sub);
    claims["iss"] = json!(format!("https://session.firebase.google.com/{PROJECT_ID}"));
    claims["aud"] = json!(crate::config::DEFAULT_SESSION_COOKIE_AUDIENCE);
    claims
}

/// Mints an RS256 token with the primary key and the given `kid`.
pub fn mint(kid: &str, claims: &Value) -> String {
    let header = JwtHeader::rs256(Some(kid.to_string()));
    encode_token(&header, claims, &signer()).expect("mint test token")
}

/// Mints a token with an arbitrary header object.
pub fn mint_with_header(header: &Value, claims: &Value) -> String {
    use crate::token::rs256::Signer;

    let signing_input = format!(
        "{}.{}",
        base64url::encode_json(header).expect("header"),
        base64url::encode_json(claims).expect("claims")
    );
    let signature = signer().sign(signing_input.as_bytes()).expect("sign");
    format!("{signing_input}.{}", base64url::encode(signature))
}
