//! Unpadded URL-safe base64, the framing used by every JWT segment.

use base64::Engine;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Encodes without padding; decodes with or without trailing `=`.
const ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Errors produced when a segment cannot be decoded.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// The input is not valid base64url.
    #[error("invalid base64url: {0}")]
    Base64(#[from] base64::DecodeError),

    /// The decoded bytes are not valid UTF-8.
    #[error("invalid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    /// The decoded text is not the expected JSON document.
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Encodes bytes as unpadded base64url.
#[must_use]
pub fn encode(bytes: impl AsRef<[u8]>) -> String {
    ENGINE.encode(bytes)
}

/// Decodes base64url text, with or without padding.
///
/// # Errors
///
/// Returns [`DecodeError::Base64`] for characters outside the URL-safe
/// alphabet or an impossible length.
pub fn decode(text: &str) -> Result<Vec<u8>, DecodeError> {
    Ok(ENGINE.decode(text)?)
}

/// Returns the UTF-8 bytes of `text`.
#[must_use]
pub fn text_to_bytes(text: &str) -> Vec<u8> {
    text.as_bytes().to_vec()
}

/// Interprets `bytes` as UTF-8 text.
///
/// # Errors
///
/// Returns [`DecodeError::Utf8`] if the bytes are not valid UTF-8.
pub fn bytes_to_text(bytes: Vec<u8>) -> Result<String, DecodeError> {
    Ok(String::from_utf8(bytes)?)
}

/// Serializes `value` to JSON and encodes it as a segment.
///
/// # Errors
///
/// Returns [`DecodeError::Json`] if serialization fails.
pub fn encode_json<T: Serialize>(value: &T) -> Result<String, DecodeError> {
    let json = serde_json::to_string(value)?;
    Ok(encode(text_to_bytes(&json)))
}

/// Decodes a segment and parses it as JSON.
///
/// # Errors
///
/// Returns an error if any of the base64, UTF-8 or JSON layers is malformed.
pub fn decode_json<T: DeserializeOwned>(segment: &str) -> Result<T, DecodeError> {
    let text = bytes_to_text(decode(segment)?)?;
    Ok(serde_json::from_str(&text)?)
}
