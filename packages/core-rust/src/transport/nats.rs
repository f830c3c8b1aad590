//! NATS transport backed by `async-nats`.

use std::time::Duration;

use async_nats::client::RequestErrorKind;
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::{Message, Subscription, Transport, TransportError};

/// Buffer between the NATS subscriber stream and the [`Subscription`] channel.
const FORWARD_CAPACITY: usize = 1024;

/// [`Transport`] over a connected NATS client.
#[derive(Debug, Clone)]
pub struct NatsTransport {
    client: async_nats::Client,
}

impl NatsTransport {
    /// Connects to the NATS server at `url`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Connect`] if the server cannot be reached.
    pub async fn connect(url: &str) -> Result<Self, TransportError> {
        let client = async_nats::connect(url)
            .await
            .map_err(|e| TransportError::Connect(format!("{url}: {e}")))?;
        Ok(Self { client })
    }

    /// Wraps an already connected client.
    #[must_use]
    pub fn from_client(client: async_nats::Client) -> Self {
        Self { client }
    }

    /// The underlying client, for JetStream access.
    #[must_use]
    pub fn client(&self) -> &async_nats::Client {
        &self.client
    }

    fn forward(subject: &str, mut subscriber: async_nats::Subscriber) -> Subscription {
        let (tx, rx) = mpsc::channel(FORWARD_CAPACITY);
        let task = tokio::spawn(async move {
            while let Some(msg) = subscriber.next().await {
                let msg = Message {
                    subject: msg.subject.to_string(),
                    reply: msg.reply.map(|r| r.to_string()),
                    payload: msg.payload,
                };
                if tx.send(msg).await.is_err() {
                    break;
                }
            }
            // Dropping the subscriber unsubscribes on the server.
        });
        Subscription::new(subject, rx).on_drop(move || task.abort())
    }
}

#[async_trait]
impl Transport for NatsTransport {
    async fn publish(&self, subject: &str, payload: Bytes) -> Result<(), TransportError> {
        self.client
            .publish(subject.to_string(), payload)
            .await
            .map_err(|e| TransportError::Publish(e.to_string()))
    }

    async fn publish_with_reply(
        &self,
        subject: &str,
        reply: &str,
        payload: Bytes,
    ) -> Result<(), TransportError> {
        self.client
            .publish_with_reply(subject.to_string(), reply.to_string(), payload)
            .await
            .map_err(|e| TransportError::Publish(e.to_string()))
    }

    async fn request(
        &self,
        subject: &str,
        payload: Bytes,
        timeout: Duration,
    ) -> Result<Message, TransportError> {
        #[allow(clippy::cast_possible_truncation)]
        let timeout_ms = timeout.as_millis() as u64;
        let timed_out = || TransportError::Timeout {
            subject: subject.to_string(),
            timeout_ms,
        };

        let request = async_nats::Request::new()
            .payload(payload)
            .timeout(Some(timeout));
        let reply = self
            .client
            .send_request(subject.to_string(), request)
            .await
            .map_err(|e| match e.kind() {
                RequestErrorKind::TimedOut => timed_out(),
                RequestErrorKind::NoResponders => TransportError::NoResponders {
                    subject: subject.to_string(),
                },
                RequestErrorKind::Other => TransportError::Request(e.to_string()),
            })?;

        Ok(Message {
            subject: reply.subject.to_string(),
            reply: reply.reply.map(|r| r.to_string()),
            payload: reply.payload,
        })
    }

    async fn subscribe(&self, subject: &str) -> Result<Subscription, TransportError> {
        let subscriber = self
            .client
            .subscribe(subject.to_string())
            .await
            .map_err(|e| TransportError::Subscribe(format!("{subject}: {e}")))?;
        debug!(subject = subject, "nats subscribed");
        Ok(Self::forward(subject, subscriber))
    }

    async fn queue_subscribe(
        &self,
        subject: &str,
        group: &str,
    ) -> Result<Subscription, TransportError> {
        let subscriber = self
            .client
            .queue_subscribe(subject.to_string(), group.to_string())
            .await
            .map_err(|e| {
                warn!(subject = subject, group = group, error = %e, "queue subscribe refused");
                TransportError::Subscribe(format!("{subject}: {e}"))
            })?;
        debug!(subject = subject, group = group, "nats queue subscribed");
        Ok(Self::forward(subject, subscriber))
    }
}
