//! Metrics middleware for dispatches.
//!
//! Records duration and outcome per subject using `tracing` spans.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;

use tower::{Layer, Service};
use tracing::{info_span, Instrument};

use crate::service::operation::{OperationError, OperationRequest, OperationResponse};

// ---------------------------------------------------------------------------
// MetricsLayer
// ---------------------------------------------------------------------------

/// Tower layer that instruments dispatches with timing and outcome fields.
#[derive(Debug, Clone)]
pub struct MetricsLayer;

impl<S> Layer<S> for MetricsLayer {
    type Service = MetricsService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        MetricsService { inner }
    }
}

// ---------------------------------------------------------------------------
// MetricsService
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct MetricsService<S> {
    inner: S,
}

impl<S> Service<OperationRequest> for MetricsService<S>
where
    S: Service<OperationRequest, Response = OperationResponse, Error = OperationError> + Send,
    S::Future: Send + 'static,
{
    type Response = OperationResponse;
    type Error = OperationError;
    type Future = Pin<Box<dyn Future<Output = Result<OperationResponse, OperationError>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: OperationRequest) -> Self::Future {
        let subject = request.subject.clone();
        let span = info_span!(
            "dispatch",
            subject = %subject,
            duration_ms = tracing::field::Empty,
            outcome = tracing::field::Empty,
        );

        let fut = self.inner.call(request);

        Box::pin(
            async move {
                let start = Instant::now();
                let result = fut.await;

                let outcome = match &result {
                    Ok(_) => "ok",
                    Err(OperationError::BadRequest) => "bad_request",
                    Err(OperationError::Overloaded) => "overloaded",
                    Err(_) => "error",
                };

                #[allow(clippy::cast_possible_truncation)]
                let duration_ms = start.elapsed().as_millis() as u64;
                tracing::Span::current().record("duration_ms", duration_ms);
                tracing::Span::current().record("outcome", outcome);

                tracing::debug!(
                    subject = %subject,
                    duration_ms = duration_ms,
                    outcome = outcome,
                    "dispatch complete"
                );

                result
            }
            .instrument(span),
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
