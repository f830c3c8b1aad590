//! Operation types flowing through the dispatch pipeline.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use cent_core::codec::CodecError;

use crate::provider::ProviderError;

/// Reply text for requests whose payload cannot be decoded.
pub const BAD_REQUEST: &str = "bad request";

/// A command addressed to one registered subject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationRequest {
    pub subject: String,
    pub payload: Bytes,
}

impl OperationRequest {
    #[must_use]
    pub fn new(subject: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            subject: subject.into(),
            payload: payload.into(),
        }
    }
}

/// Successful handler result. `data` is `None` for operations that produce no value.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OperationResponse {
    pub data: Option<Vec<u8>>,
}

impl OperationResponse {
    #[must_use]
    pub fn empty() -> Self {
        Self { data: None }
    }

    #[must_use]
    pub fn with_data(data: Vec<u8>) -> Self {
        Self { data: Some(data) }
    }
}

/// Errors returned by operation handlers and middleware.
///
/// The display text of each variant is what the caller sees in the failure
/// envelope.
#[derive(Debug, thiserror::Error)]
pub enum OperationError {
    #[error("bad request")]
    BadRequest,
    #[error(transparent)]
    Domain(#[from] ProviderError),
    #[error("error encoding reply: {0}")]
    Encode(#[from] CodecError),
    #[error("unknown subject: {subject}")]
    UnknownSubject { subject: String },
    #[error("server overloaded, try again later")]
    Overloaded,
}

pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<OperationResponse, OperationError>> + Send>>;

/// Type-erased handler bound to one subject.
pub type Handler = Arc<dyn Fn(Bytes) -> HandlerFuture + Send + Sync>;
