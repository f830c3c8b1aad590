//! Pipeline composition: combines the middleware layers into one cloneable service.

use tower::util::BoxCloneSyncService;
use tower::ServiceBuilder;

use super::load_shed::LoadShedLayer;
use super::metrics::MetricsLayer;
use crate::service::config::ServerConfig;
use crate::service::operation::{OperationError, OperationRequest, OperationResponse};
use crate::service::router::OperationRouter;

/// The composed dispatch service. Each dispatch task clones it.
pub type OperationPipeline = BoxCloneSyncService<OperationRequest, OperationResponse, OperationError>;

/// Wraps the router with middleware.
///
/// Layer order (outermost to innermost):
/// 1. `LoadShedLayer` -- reject when overloaded before doing any work
/// 2. `MetricsLayer` -- record timing and outcome around the handler
///
/// There is no timeout layer: handlers run to completion even when the caller
/// has stopped waiting.
#[must_use]
pub fn build_operation_pipeline(router: OperationRouter, config: &ServerConfig) -> OperationPipeline {
    let service = ServiceBuilder::new()
        .layer(LoadShedLayer::new(config.max_concurrent_operations))
        .layer(MetricsLayer)
        .service(router);
    BoxCloneSyncService::new(service)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use bytes::Bytes;
    use tower::ServiceExt;

    use super::*;
    use crate::service::operation::HandlerFuture;
    use crate::service::registry::{OperationDescriptor, OperationRegistry};

    fn router() -> OperationRouter {
        let mut registry = OperationRegistry::new();
        registry
            .register(OperationDescriptor {
                subject: "cent.sync",
                handler: Arc::new(|_: Bytes| -> HandlerFuture {
                    Box::pin(async {
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok(OperationResponse::with_data(b"done".to_vec()))
                    })
                }),
            })
            .unwrap();
        OperationRouter::new(Arc::new(registry))
    }

    #[tokio::test]
    async fn pipeline_routes_through_all_layers() {
        let svc = build_operation_pipeline(router(), &ServerConfig::default());
        let resp = svc
            .oneshot(OperationRequest::new("cent.sync", ""))
            .await
            .unwrap();
        assert_eq!(resp.data.as_deref(), Some(&b"done"[..]));
    }

    #[tokio::test]
    async fn clones_share_the_concurrency_limit() {
        let config = ServerConfig {
            max_concurrent_operations: 1,
            ..ServerConfig::default()
        };
        let svc = build_operation_pipeline(router(), &config);

        let first = tokio::spawn(svc.clone().oneshot(OperationRequest::new("cent.sync", "")));
        tokio::time::sleep(Duration::from_millis(10)).await;
        let second = svc
            .clone()
            .oneshot(OperationRequest::new("cent.sync", ""))
            .await;

        assert!(matches!(second, Err(OperationError::Overloaded)));
        assert!(first.await.unwrap().is_ok());
    }
}
