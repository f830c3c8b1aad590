//! Operation routing: dispatches an `OperationRequest` to its subject's handler.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tower::Service;

use super::operation::{OperationError, OperationRequest, OperationResponse};
use super::registry::OperationRegistry;

// ---------------------------------------------------------------------------
// OperationRouter
// ---------------------------------------------------------------------------

/// Routes requests to the handler registered for their subject.
///
/// Cloning shares the registry. Requests for a subject with no handler
/// return `OperationError::UnknownSubject`.
#[derive(Debug, Clone)]
pub struct OperationRouter {
    registry: Arc<OperationRegistry>,
}

impl OperationRouter {
    #[must_use]
    pub fn new(registry: Arc<OperationRegistry>) -> Self {
        Self { registry }
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<OperationRegistry> {
        &self.registry
    }
}

impl Service<OperationRequest> for OperationRouter {
    type Response = OperationResponse;
    type Error = OperationError;
    type Future = Pin<Box<dyn Future<Output = Result<OperationResponse, OperationError>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        // Handlers are plain async functions; the router is always ready.
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: OperationRequest) -> Self::Future {
        match self.registry.lookup(&request.subject) {
            Some(handler) => handler(request.payload),
            None => Box::pin(async move {
                Err(OperationError::UnknownSubject {
                    subject: request.subject,
                })
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use tower::ServiceExt;

    use super::*;
    use crate::service::operation::HandlerFuture;
    use crate::service::registry::OperationDescriptor;

    fn echo(subject: &'static str) -> OperationDescriptor {
        OperationDescriptor {
            subject,
            handler: Arc::new(|payload: Bytes| -> HandlerFuture {
                Box::pin(async move { Ok(OperationResponse::with_data(payload.to_vec())) })
            }),
        }
    }

    fn router() -> OperationRouter {
        let mut registry = OperationRegistry::new();
        registry
            .register_all([echo("cent.sync"), echo("cent.plan.list")])
            .unwrap();
        OperationRouter::new(Arc::new(registry))
    }

    #[tokio::test]
    async fn routes_to_registered_handler() {
        let resp = router()
            .oneshot(OperationRequest::new("cent.plan.list", "hello"))
            .await
            .unwrap();
        assert_eq!(resp.data.as_deref(), Some(&b"hello"[..]));
    }

    #[tokio::test]
    async fn unknown_subject_returns_error() {
        let err = router()
            .oneshot(OperationRequest::new("cent.nope", ""))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            OperationError::UnknownSubject { subject } if subject == "cent.nope"
        ));
    }

    #[tokio::test]
    async fn clones_share_the_registry() {
        let mut first = router();
        let second = first.clone();
        assert!(Arc::ptr_eq(first.registry(), second.registry()));

        let resp = ServiceExt::ready(&mut first)
            .await
            .unwrap()
            .call(OperationRequest::new("cent.sync", "x"))
            .await
            .unwrap();
        assert_eq!(resp.data.as_deref(), Some(&b"x"[..]));
    }
}
