//! RPC dispatcher: runs one inbound command through the pipeline and replies.
//!
//! Every dispatched message produces exactly one reply attempt carrying an
//! envelope. Handler errors become failure envelopes with the error's display
//! text; nothing a handler does can prevent the reply.

use std::sync::Arc;

use bytes::Bytes;
use cent_core::envelope;
use cent_core::transport::{Message, Transport};
use tokio::task::JoinHandle;
use tower::ServiceExt;
use tracing::{debug, error, warn};

use super::middleware::OperationPipeline;
use super::operation::OperationRequest;
use crate::lifecycle::shutdown::ShutdownController;

/// Cloneable dispatcher shared by every listener loop.
#[derive(Clone)]
pub struct RpcDispatcher {
    pipeline: OperationPipeline,
    transport: Arc<dyn Transport>,
    shutdown: Arc<ShutdownController>,
}

impl std::fmt::Debug for RpcDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcDispatcher")
            .field("in_flight", &self.shutdown.in_flight_count())
            .finish_non_exhaustive()
    }
}

impl RpcDispatcher {
    #[must_use]
    pub fn new(
        pipeline: OperationPipeline,
        transport: Arc<dyn Transport>,
        shutdown: Arc<ShutdownController>,
    ) -> Self {
        Self {
            pipeline,
            transport,
            shutdown,
        }
    }

    /// Dispatches `msg` on its own task.
    ///
    /// The in-flight guard is taken before spawning so a concurrent drain
    /// always sees the dispatch.
    pub fn spawn(&self, msg: Message) -> JoinHandle<()> {
        let guard = self.shutdown.in_flight_guard();
        let dispatcher = self.clone();
        tokio::spawn(async move {
            dispatcher.dispatch(msg).await;
            drop(guard);
        })
    }

    /// Handles `msg` and publishes the reply envelope to its reply subject.
    pub async fn dispatch(&self, msg: Message) {
        let Message {
            subject,
            reply,
            payload,
        } = msg;
        let body = self
            .respond(OperationRequest {
                subject: subject.clone(),
                payload,
            })
            .await;

        let Some(reply) = reply else {
            warn!(subject = %subject, "command without reply subject, result dropped");
            return;
        };
        if let Err(e) = self.transport.publish(&reply, Bytes::from(body)).await {
            warn!(subject = %subject, reply = %reply, error = %e, "reply lost");
        }
    }

    /// Runs `request` through the pipeline and returns the encoded envelope.
    pub async fn respond(&self, request: OperationRequest) -> Vec<u8> {
        let subject = request.subject.clone();
        match self.pipeline.clone().oneshot(request).await {
            Ok(response) => envelope::encode_success(response.data).unwrap_or_else(|e| {
                error!(subject = %subject, error = %e, "success envelope unserializable");
                envelope::encode_failure(&e.to_string())
            }),
            Err(err) => {
                debug!(subject = %subject, error = %err, "operation failed");
                envelope::encode_failure(&err.to_string())
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
