//! Publish/subscribe transport abstraction.
//!
//! The gateway only needs four capabilities from the bus: fire-and-forget
//! publish, request/reply with a per-call timeout, plain (fan-out)
//! subscriptions, and queue-group (load-balanced) subscriptions.
//!
//! Implementations:
//! - [`memory::InMemoryTransport`]: process-local bus for tests and embedding
//! - `nats::NatsTransport` (feature `nats`): NATS via `async-nats`

pub mod memory;
#[cfg(feature = "nats")]
pub mod nats;

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

pub use memory::InMemoryTransport;
#[cfg(feature = "nats")]
pub use nats::NatsTransport;

/// A message delivered by a subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub subject: String,
    /// Subject to publish the reply on, if the sender expects one.
    pub reply: Option<String>,
    pub payload: Bytes,
}

/// Errors returned by transport operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("request on {subject} timed out after {timeout_ms}ms")]
    Timeout { subject: String, timeout_ms: u64 },
    #[error("no responders available for {subject}")]
    NoResponders { subject: String },
    #[error("connection closed")]
    Closed,
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("publish failed: {0}")]
    Publish(String),
    #[error("subscribe failed: {0}")]
    Subscribe(String),
    #[error("request failed: {0}")]
    Request(String),
}

/// Capabilities the gateway requires from a publish/subscribe bus.
///
/// Used as `Arc<dyn Transport>`.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Publish a one-way message. Succeeds even if nobody is subscribed.
    async fn publish(&self, subject: &str, payload: Bytes) -> Result<(), TransportError>;

    /// Publish a message that asks receivers to answer on `reply`.
    async fn publish_with_reply(
        &self,
        subject: &str,
        reply: &str,
        payload: Bytes,
    ) -> Result<(), TransportError>;

    /// Send a request and wait up to `timeout` for the first reply.
    ///
    /// Timing out only abandons the wait; the receiver keeps processing.
    async fn request(
        &self,
        subject: &str,
        payload: Bytes,
        timeout: Duration,
    ) -> Result<Message, TransportError>;

    /// Subscribe to every message on `subject`.
    async fn subscribe(&self, subject: &str) -> Result<Subscription, TransportError>;

    /// Join queue group `group` on `subject`. Each message is delivered to
    /// exactly one member of the group.
    async fn queue_subscribe(
        &self,
        subject: &str,
        group: &str,
    ) -> Result<Subscription, TransportError>;
}

/// Receiving end of a subscription. Unsubscribes when dropped.
pub struct Subscription {
    subject: String,
    rx: mpsc::Receiver<Message>,
    on_drop: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    /// Wraps a channel receiver fed by a transport.
    #[must_use]
    pub fn new(subject: impl Into<String>, rx: mpsc::Receiver<Message>) -> Self {
        Self {
            subject: subject.into(),
            rx,
            on_drop: None,
        }
    }

    /// Registers cleanup to run when the subscription is dropped.
    #[must_use]
    pub fn on_drop(mut self, cleanup: impl FnOnce() + Send + 'static) -> Self {
        self.on_drop = Some(Box::new(cleanup));
        self
    }

    /// The subject this subscription listens on.
    #[must_use]
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Waits for the next message. Returns `None` once the transport side closes.
    pub async fn next(&mut self) -> Option<Message> {
        self.rx.recv().await
    }

    /// Unsubscribes without discarding buffered messages.
    ///
    /// No further messages are delivered; [`next`](Self::next) keeps yielding
    /// what was already buffered and returns `None` once it is empty.
    pub fn close(&mut self) {
        if let Some(cleanup) = self.on_drop.take() {
            cleanup();
        }
        self.rx.close();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("subject", &self.subject)
            .finish_non_exhaustive()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cleanup) = self.on_drop.take() {
            cleanup();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use super::*;

    #[tokio::test]
    async fn subscription_yields_channel_messages() {
        let (tx, rx) = mpsc::channel(4);
        let mut sub = Subscription::new("cent.test", rx);
        tx.send(Message {
            subject: "cent.test".to_string(),
            reply: None,
            payload: Bytes::from_static(b"hi"),
        })
        .await
        .unwrap();
        drop(tx);

        let msg = sub.next().await.unwrap();
        assert_eq!(msg.payload, Bytes::from_static(b"hi"));
        assert!(sub.next().await.is_none());
        assert_eq!(sub.subject(), "cent.test");
    }

    #[test]
    fn drop_runs_cleanup_once() {
        let cleaned = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cleaned);
        let (_tx, rx) = mpsc::channel(1);
        let sub = Subscription::new("cent.test", rx).on_drop(move || {
            assert!(!flag.swap(true, Ordering::SeqCst));
        });
        drop(sub);
        assert!(cleaned.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn close_unsubscribes_but_keeps_buffered_messages() {
        let cleaned = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cleaned);
        let (tx, rx) = mpsc::channel(4);
        let mut sub = Subscription::new("cent.test", rx).on_drop(move || {
            assert!(!flag.swap(true, Ordering::SeqCst));
        });
        for body in [b"a", b"b"] {
            tx.try_send(Message {
                subject: "cent.test".to_string(),
                reply: None,
                payload: Bytes::from_static(body),
            })
            .unwrap();
        }

        sub.close();
        assert!(cleaned.load(Ordering::SeqCst));
        assert!(tx.try_send(Message {
            subject: "cent.test".to_string(),
            reply: None,
            payload: Bytes::from_static(b"late"),
        })
        .is_err());

        assert_eq!(sub.next().await.unwrap().payload, Bytes::from_static(b"a"));
        assert_eq!(sub.next().await.unwrap().payload, Bytes::from_static(b"b"));
        assert!(sub.next().await.is_none());
        drop(sub);
    }

    #[test]
    fn transport_is_object_safe() {
        fn _assert_object_safe(_: &Arc<dyn Transport>) {}
    }
}
