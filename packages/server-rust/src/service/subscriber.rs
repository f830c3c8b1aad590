//! Queue-group subscriber: binds command subjects and feeds the dispatcher.
//!
//! One listener task per bound subject. Each delivered message is handed to
//! [`RpcDispatcher::spawn`]. When the shutdown signal flips, a listener
//! unsubscribes from the group so the transport stops routing commands to this
//! instance, then dispatches whatever was already buffered before exiting.

use std::sync::Arc;

use cent_core::transport::{Subscription, Transport, TransportError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::dispatcher::RpcDispatcher;

/// Binding a subject failed; the server aborts startup.
#[derive(Debug, thiserror::Error)]
pub enum BindError {
    #[error("cannot bind subject {subject} in queue group {group}")]
    Subscribe {
        subject: String,
        group: String,
        #[source]
        source: TransportError,
    },
}

pub struct QueueGroupSubscriber {
    transport: Arc<dyn Transport>,
    group: String,
    dispatcher: RpcDispatcher,
    shutdown: watch::Receiver<bool>,
    listeners: Vec<(String, JoinHandle<()>)>,
}

impl std::fmt::Debug for QueueGroupSubscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueGroupSubscriber")
            .field("group", &self.group)
            .field("bound", &self.bound())
            .finish_non_exhaustive()
    }
}

impl QueueGroupSubscriber {
    #[must_use]
    pub fn new(
        transport: Arc<dyn Transport>,
        group: impl Into<String>,
        dispatcher: RpcDispatcher,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            transport,
            group: group.into(),
            dispatcher,
            shutdown,
            listeners: Vec::new(),
        }
    }

    #[must_use]
    pub fn group(&self) -> &str {
        &self.group
    }

    /// Joins the queue group on `subject` and starts its listener.
    ///
    /// # Errors
    ///
    /// Returns [`BindError::Subscribe`] naming the subject when the transport
    /// refuses the subscription.
    pub async fn bind(&mut self, subject: &str) -> Result<(), BindError> {
        let subscription = self
            .transport
            .queue_subscribe(subject, &self.group)
            .await
            .map_err(|source| BindError::Subscribe {
                subject: subject.to_string(),
                group: self.group.clone(),
                source,
            })?;

        let handle = tokio::spawn(listen(
            subscription,
            self.dispatcher.clone(),
            self.shutdown.clone(),
        ));
        self.listeners.push((subject.to_string(), handle));
        debug!(subject, group = %self.group, "subject bound");
        Ok(())
    }

    /// Binds every subject in order, stopping at the first failure.
    ///
    /// # Errors
    ///
    /// Returns the first [`BindError`]. Subjects bound before it stay bound
    /// until shutdown or [`abort`](Self::abort).
    pub async fn bind_all<'a>(
        &mut self,
        subjects: impl IntoIterator<Item = &'a str>,
    ) -> Result<usize, BindError> {
        let mut bound = 0;
        for subject in subjects {
            self.bind(subject).await?;
            bound += 1;
        }
        info!(count = bound, group = %self.group, "command subjects bound");
        Ok(bound)
    }

    /// Number of subjects with a running listener.
    #[must_use]
    pub fn bound(&self) -> usize {
        self.listeners.len()
    }

    #[must_use]
    pub fn subjects(&self) -> Vec<&str> {
        self.listeners.iter().map(|(s, _)| s.as_str()).collect()
    }

    /// Waits for every listener to exit. Call after triggering shutdown.
    pub async fn join(&mut self) {
        for (subject, handle) in self.listeners.drain(..) {
            if let Err(e) = handle.await {
                warn!(subject = %subject, error = %e, "listener task failed");
            }
        }
    }

    /// Stops every listener without waiting for a shutdown signal.
    ///
    /// Used to release partial bindings when startup fails; nothing has been
    /// delivered yet, so buffered commands are not drained.
    pub async fn abort(&mut self) {
        for (_, handle) in &self.listeners {
            handle.abort();
        }
        for (subject, handle) in self.listeners.drain(..) {
            match handle.await {
                Err(e) if !e.is_cancelled() => {
                    warn!(subject = %subject, error = %e, "listener task failed");
                }
                _ => {}
            }
        }
    }
}

async fn listen(
    mut subscription: Subscription,
    dispatcher: RpcDispatcher,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        if *shutdown.borrow() {
            break;
        }
        tokio::select! {
            msg = subscription.next() => match msg {
                Some(msg) => {
                    dispatcher.spawn(msg);
                }
                None => {
                    debug!(subject = subscription.subject(), "subscription closed");
                    return;
                }
            },
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }

    // Commands already delivered to this instance still get a reply.
    subscription.close();
    let mut drained = 0_usize;
    while let Some(msg) = subscription.next().await {
        dispatcher.spawn(msg);
        drained += 1;
    }
    if drained > 0 {
        debug!(subject = subscription.subject(), drained, "dispatched buffered commands");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use bytes::Bytes;
    use cent_core::envelope;
    use cent_core::transport::{InMemoryTransport, Message};

    use super::*;
    use crate::lifecycle::shutdown::ShutdownController;
    use crate::service::config::ServerConfig;
    use crate::service::middleware::build_operation_pipeline;
    use crate::service::operation::{HandlerFuture, OperationResponse};
    use crate::service::registry::{OperationDescriptor, OperationRegistry};
    use crate::service::router::OperationRouter;

    fn echo_dispatcher(
        transport: Arc<dyn Transport>,
        shutdown: Arc<ShutdownController>,
    ) -> RpcDispatcher {
        let mut registry = OperationRegistry::new();
        registry
            .register(OperationDescriptor {
                subject: "cent.echo",
                handler: Arc::new(|p: Bytes| -> HandlerFuture {
                    Box::pin(async move { Ok(OperationResponse::with_data(p.to_vec())) })
                }),
            })
            .unwrap();
        let pipeline = build_operation_pipeline(
            OperationRouter::new(Arc::new(registry)),
            &ServerConfig::default(),
        );
        RpcDispatcher::new(pipeline, transport, shutdown)
    }

    #[tokio::test]
    async fn bound_subject_answers_requests() {
        let bus = InMemoryTransport::new();
        let shutdown = Arc::new(ShutdownController::new());
        let transport: Arc<dyn Transport> = Arc::new(bus.clone());
        let mut subscriber = QueueGroupSubscriber::new(
            Arc::clone(&transport),
            "cent",
            echo_dispatcher(Arc::clone(&transport), Arc::clone(&shutdown)),
            shutdown.shutdown_receiver(),
        );

        assert_eq!(subscriber.bind_all(["cent.echo"]).await.unwrap(), 1);
        assert_eq!(subscriber.subjects(), vec!["cent.echo"]);

        let reply = bus
            .request("cent.echo", Bytes::from_static(b"hello"), Duration::from_secs(1))
            .await
            .unwrap();
        let env = envelope::decode(&reply.payload).unwrap();
        assert!(env.success);
        assert_eq!(env.data, Some(b"hello".to_vec()));
    }

    #[tokio::test]
    async fn shutdown_unsubscribes_listeners() {
        let bus = InMemoryTransport::new();
        let shutdown = Arc::new(ShutdownController::new());
        let transport: Arc<dyn Transport> = Arc::new(bus.clone());
        let mut subscriber = QueueGroupSubscriber::new(
            Arc::clone(&transport),
            "cent",
            echo_dispatcher(Arc::clone(&transport), Arc::clone(&shutdown)),
            shutdown.shutdown_receiver(),
        );
        subscriber.bind("cent.echo").await.unwrap();
        assert_eq!(bus.subscriber_count("cent.echo"), 1);

        shutdown.trigger_shutdown();
        subscriber.join().await;

        assert_eq!(subscriber.bound(), 0);
        assert_eq!(bus.subscriber_count("cent.echo"), 0);
        let err = bus
            .request("cent.echo", Bytes::new(), Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::NoResponders { .. }));
    }

    #[tokio::test]
    async fn buffered_commands_are_answered_on_shutdown() {
        let bus = InMemoryTransport::new();
        let shutdown = Arc::new(ShutdownController::new());
        let transport: Arc<dyn Transport> = Arc::new(bus.clone());
        let mut replies = bus.subscribe("_INBOX.drain").await.unwrap();
        let mut subscriber = QueueGroupSubscriber::new(
            Arc::clone(&transport),
            "cent",
            echo_dispatcher(Arc::clone(&transport), Arc::clone(&shutdown)),
            shutdown.shutdown_receiver(),
        );
        subscriber.bind("cent.echo").await.unwrap();

        for body in ["one", "two", "three"] {
            bus.publish_with_reply("cent.echo", "_INBOX.drain", Bytes::from(body))
                .await
                .unwrap();
        }
        shutdown.trigger_shutdown();
        subscriber.join().await;
        assert_eq!(bus.subscriber_count("cent.echo"), 0);

        let mut answered = Vec::new();
        for _ in 0..3 {
            let msg = tokio::time::timeout(Duration::from_secs(1), replies.next())
                .await
                .unwrap()
                .unwrap();
            let env = envelope::decode(&msg.payload).unwrap();
            assert!(env.success);
            answered.push(env.data.unwrap());
        }
        answered.sort();
        assert_eq!(answered, vec![b"one".to_vec(), b"three".to_vec(), b"two".to_vec()]);
    }

    #[tokio::test]
    async fn abort_releases_bindings_without_shutdown() {
        let bus = InMemoryTransport::new();
        let shutdown = Arc::new(ShutdownController::new());
        let transport: Arc<dyn Transport> = Arc::new(bus.clone());
        let mut subscriber = QueueGroupSubscriber::new(
            Arc::clone(&transport),
            "cent",
            echo_dispatcher(Arc::clone(&transport), Arc::clone(&shutdown)),
            shutdown.shutdown_receiver(),
        );
        subscriber.bind("cent.echo").await.unwrap();

        subscriber.abort().await;

        assert_eq!(subscriber.bound(), 0);
        assert_eq!(bus.subscriber_count("cent.echo"), 0);
        assert!(!shutdown.is_shutting_down());
    }

    struct RefusingTransport;

    #[async_trait]
    impl Transport for RefusingTransport {
        async fn publish(&self, _: &str, _: Bytes) -> Result<(), TransportError> {
            Ok(())
        }
        async fn publish_with_reply(&self, _: &str, _: &str, _: Bytes) -> Result<(), TransportError> {
            Ok(())
        }
        async fn request(&self, subject: &str, _: Bytes, _: Duration) -> Result<Message, TransportError> {
            Err(TransportError::NoResponders {
                subject: subject.to_string(),
            })
        }
        async fn subscribe(&self, _: &str) -> Result<Subscription, TransportError> {
            Err(TransportError::Subscribe("permission denied".into()))
        }
        async fn queue_subscribe(&self, _: &str, _: &str) -> Result<Subscription, TransportError> {
            Err(TransportError::Subscribe("permission denied".into()))
        }
    }

    #[tokio::test]
    async fn refused_binding_names_the_subject() {
        let shutdown = Arc::new(ShutdownController::new());
        let transport: Arc<dyn Transport> = Arc::new(RefusingTransport);
        let mut subscriber = QueueGroupSubscriber::new(
            Arc::clone(&transport),
            "cent",
            echo_dispatcher(Arc::clone(&transport), Arc::clone(&shutdown)),
            shutdown.shutdown_receiver(),
        );

        let err = subscriber
            .bind_all(["cent.plan.list", "cent.plan.get.id"])
            .await
            .unwrap_err();
        let BindError::Subscribe { subject, group, .. } = &err;
        assert_eq!(subject, "cent.plan.list");
        assert_eq!(group, "cent");
        assert!(err.to_string().contains("cent.plan.list"));
        assert_eq!(subscriber.bound(), 0);
    }
}
