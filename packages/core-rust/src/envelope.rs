//! Reply envelope for request/reply traffic.
//!
//! Every reply on a command subject is an [`Envelope`] serialized as a named
//! `MsgPack` map:
//!
//! ```text
//! { "success": bool, "error"?: str, "data"?: bin }
//! ```
//!
//! `error` is present iff `success` is false. `data` is present only on success
//! and only when the operation produced a value. Events do not use the
//! envelope; they carry the bare encoded payload.

use serde::{Deserialize, Serialize};

/// Fixed failure envelope used when a failure envelope cannot be serialized.
///
/// Byte-for-byte equal to `to_vec_named(&Envelope::failure("internal error"))`.
pub const FALLBACK_FAILURE: &[u8] = b"\x82\xa7success\xc2\xa5error\xaeinternal error";

/// Error text carried by [`FALLBACK_FAILURE`].
pub const FALLBACK_ERROR: &str = "internal error";

/// Errors produced by the envelope codec.
#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    #[error("error encoding envelope: {0}")]
    Encode(#[from] rmp_serde::encode::Error),
    #[error("error decoding envelope: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
}

/// Uniform success/error/data wrapper for replies.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Envelope {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default, with = "serde_bytes")]
    pub data: Option<Vec<u8>>,
}

impl Envelope {
    /// Success envelope, with `data` only if the operation produced a value.
    #[must_use]
    pub fn success(data: Option<Vec<u8>>) -> Self {
        Self {
            success: true,
            error: None,
            data,
        }
    }

    /// Failure envelope carrying `message`.
    #[must_use]
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(message.into()),
            data: None,
        }
    }

    /// Unwraps the envelope into the carried data or the carried error text.
    ///
    /// A successful envelope without data yields an empty payload. A failed
    /// envelope without error text yields [`FALLBACK_ERROR`].
    ///
    /// # Errors
    ///
    /// Returns the remote error text if `success` is false.
    pub fn into_result(self) -> Result<Vec<u8>, String> {
        if self.success {
            Ok(self.data.unwrap_or_default())
        } else {
            Err(self
                .error
                .filter(|e| !e.is_empty())
                .unwrap_or_else(|| FALLBACK_ERROR.to_string()))
        }
    }
}

/// Serializes a success envelope around `data`.
///
/// # Errors
///
/// Returns [`EnvelopeError::Encode`] if serialization fails.
pub fn encode_success(data: Option<Vec<u8>>) -> Result<Vec<u8>, EnvelopeError> {
    Ok(rmp_serde::to_vec_named(&Envelope::success(data))?)
}

/// Serializes a failure envelope carrying `message`.
///
/// Never fails: if the envelope cannot be serialized, [`FALLBACK_FAILURE`] is
/// returned so the reply path is never lost.
#[must_use]
pub fn encode_failure(message: &str) -> Vec<u8> {
    or_fallback(rmp_serde::to_vec_named(&Envelope::failure(message)).map_err(EnvelopeError::from))
}

/// Deserializes an envelope from reply bytes.
///
/// # Errors
///
/// Returns [`EnvelopeError::Decode`] if the bytes are not an envelope.
pub fn decode(bytes: &[u8]) -> Result<Envelope, EnvelopeError> {
    Ok(rmp_serde::from_slice(bytes)?)
}

fn or_fallback(encoded: Result<Vec<u8>, EnvelopeError>) -> Vec<u8> {
    match encoded {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::error!(error = %e, "failure envelope unserializable, replying with fallback");
            FALLBACK_FAILURE.to_vec()
        }
    }
}
