//! JWT primitives.
//!
//! This module provides:
//!
//! - [`base64url`] - unpadded URL-safe base64 framing
//! - [`rs256`] - RSASSA-PKCS1-v1_5 / SHA-256 signing and verification
//! - [`jwt`] - header, claims and three-segment token layout

pub mod base64url;
pub mod jwt;
pub mod rs256;

pub use jwt::{JwtHeader, RawToken, TokenClaims, encode_token};
pub use rs256::{RS256, Rs256Signer, Rs256Verifier, Signer, VerificationKey, Verifier};
