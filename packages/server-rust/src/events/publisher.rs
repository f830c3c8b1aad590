//! Event publication seam.
//!
//! The forwarder hands encoded event bodies to an [`EventPublisher`]. The
//! default publishes core messages through the shared [`Transport`]; with the
//! `nats` feature, [`JetStreamPublisher`] waits for a stream acknowledgement.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use cent_core::transport::{Transport, TransportError};

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("jetstream publish failed: {0}")]
    JetStream(String),
}

/// Sends one event body to one subject.
#[async_trait]
pub trait EventPublisher: Send + Sync + 'static {
    /// # Errors
    ///
    /// Returns [`PublishError`] when the message was not accepted.
    async fn publish(&self, subject: &str, payload: Bytes) -> Result<(), PublishError>;
}

/// Fire-and-forget publication over the core transport.
#[derive(Clone)]
pub struct TransportPublisher {
    transport: Arc<dyn Transport>,
}

impl TransportPublisher {
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }
}

impl std::fmt::Debug for TransportPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportPublisher").finish_non_exhaustive()
    }
}

#[async_trait]
impl EventPublisher for TransportPublisher {
    async fn publish(&self, subject: &str, payload: Bytes) -> Result<(), PublishError> {
        self.transport.publish(subject, payload).await?;
        Ok(())
    }
}

#[cfg(feature = "nats")]
pub use jetstream::JetStreamPublisher;

#[cfg(feature = "nats")]
mod jetstream {
    use async_trait::async_trait;
    use bytes::Bytes;

    use super::{EventPublisher, PublishError};

    /// Durable publication: each event is acknowledged by the stream that
    /// captures its subject.
    #[derive(Clone)]
    pub struct JetStreamPublisher {
        context: async_nats::jetstream::Context,
    }

    impl JetStreamPublisher {
        #[must_use]
        pub fn new(client: async_nats::Client) -> Self {
            Self {
                context: async_nats::jetstream::new(client),
            }
        }
    }

    impl std::fmt::Debug for JetStreamPublisher {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("JetStreamPublisher").finish_non_exhaustive()
        }
    }

    #[async_trait]
    impl EventPublisher for JetStreamPublisher {
        async fn publish(&self, subject: &str, payload: Bytes) -> Result<(), PublishError> {
            let ack = self
                .context
                .publish(subject.to_string(), payload)
                .await
                .map_err(|e| PublishError::JetStream(e.to_string()))?;
            ack.await
                .map_err(|e| PublishError::JetStream(e.to_string()))?;
            Ok(())
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use cent_core::transport::InMemoryTransport;

    use super::*;

    #[tokio::test]
    async fn transport_publisher_reaches_subscribers() {
        let bus = InMemoryTransport::new();
        let mut sub = bus.subscribe("cent.plan.added").await.unwrap();
        let publisher = TransportPublisher::new(Arc::new(bus.clone()));

        publisher
            .publish("cent.plan.added", Bytes::from_static(b"\x80"))
            .await
            .unwrap();

        let msg = sub.next().await.unwrap();
        assert_eq!(msg.subject, "cent.plan.added");
        assert_eq!(&msg.payload[..], b"\x80");
    }

    #[tokio::test]
    async fn publishing_without_subscribers_succeeds() {
        let publisher = TransportPublisher::new(Arc::new(InMemoryTransport::new()));
        assert!(publisher
            .publish("cent.customer.removed", Bytes::new())
            .await
            .is_ok());
    }
}
