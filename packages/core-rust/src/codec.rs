//! Payload codecs.
//!
//! Three encodings travel in request and event payloads:
//!
//! - **Integer identifiers** are carried as base-10 ASCII text (`42` -> `b"42"`),
//!   never as binary integers. Leading `+`/`-` signs are accepted on decode;
//!   whitespace and empty payloads are not.
//! - **String identifiers** (provider ids, emails, usernames, names) are the raw
//!   UTF-8 bytes of the string.
//! - **Structured values** (entities, lists, counts) are named `MsgPack` maps
//!   produced by `rmp_serde::to_vec_named()`, so fields are tagged by name and
//!   unknown fields are ignored by older readers.

use serde::de::DeserializeOwned;
use serde::Serialize;

/// Errors produced while encoding or decoding payloads.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("encode error: {0}")]
    Encode(#[from] rmp_serde::encode::Error),
    #[error("decode error: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
    #[error("invalid integer identifier: {0}")]
    InvalidId(#[from] std::num::ParseIntError),
    #[error("payload is not valid UTF-8: {0}")]
    InvalidText(#[from] std::str::Utf8Error),
}

/// Encodes a structured value as a named `MsgPack` map.
///
/// # Errors
///
/// Returns [`CodecError::Encode`] if the value cannot be serialized.
pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, CodecError> {
    Ok(rmp_serde::to_vec_named(value)?)
}

/// Decodes a structured value from a `MsgPack` payload.
///
/// # Errors
///
/// Returns [`CodecError::Decode`] if the payload does not match `T`.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CodecError> {
    Ok(rmp_serde::from_slice(bytes)?)
}

/// Encodes an integer identifier as its decimal text representation.
#[must_use]
pub fn encode_id(id: i64) -> Vec<u8> {
    id.to_string().into_bytes()
}

/// Parses a decimal text payload into an integer identifier.
///
/// # Errors
///
/// Returns an error if the payload is not UTF-8 or not a base-10 `i64`.
pub fn decode_id(bytes: &[u8]) -> Result<i64, CodecError> {
    Ok(std::str::from_utf8(bytes)?.parse::<i64>()?)
}

/// Encodes a string identifier as raw UTF-8 bytes.
#[must_use]
pub fn encode_text(text: &str) -> Vec<u8> {
    text.as_bytes().to_vec()
}

/// Decodes a raw UTF-8 payload into a string identifier.
///
/// # Errors
///
/// Returns [`CodecError::InvalidText`] if the payload is not valid UTF-8.
pub fn decode_text(bytes: &[u8]) -> Result<String, CodecError> {
    Ok(std::str::from_utf8(bytes)?.to_owned())
}
