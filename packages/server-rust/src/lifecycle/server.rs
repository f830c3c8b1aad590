//! Gateway server with deferred startup lifecycle.
//!
//! `new()` wires shared state, `start()` attaches the event forwarder and binds
//! every command subject, and `serve()` runs until the shutdown future
//! resolves, then drains. Callers can inspect the registry and health state
//! between `start()` and `serve()`.

use std::future::Future;
use std::sync::Arc;

use anyhow::Context as _;
use cent_core::transport::Transport;
use tracing::{info, warn};

use super::shutdown::{HealthState, ShutdownController};
use crate::events::{EventForwarder, EventPublisher};
use crate::provider::DomainProvider;
use crate::service::config::ServerConfig;
use crate::service::dispatcher::RpcDispatcher;
use crate::service::handlers::build_registry;
use crate::service::middleware::build_operation_pipeline;
use crate::service::registry::OperationRegistry;
use crate::service::router::OperationRouter;
use crate::service::subscriber::QueueGroupSubscriber;

/// One gateway instance.
///
/// 1. `new()` -- allocates the shutdown controller, binds nothing
/// 2. `start()` -- starts event forwarding and joins the queue group on every command subject
/// 3. `serve()` -- marks Ready, waits for shutdown, then drains in-flight dispatches
pub struct CentServer {
    config: ServerConfig,
    provider: Arc<dyn DomainProvider>,
    transport: Arc<dyn Transport>,
    events: Arc<dyn EventPublisher>,
    shutdown: Arc<ShutdownController>,
    registry: Option<Arc<OperationRegistry>>,
    subscriber: Option<QueueGroupSubscriber>,
    forwarder: Option<EventForwarder>,
}

impl std::fmt::Debug for CentServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CentServer")
            .field("config", &self.config)
            .field("health", &self.shutdown.health_state())
            .field("subscriber", &self.subscriber)
            .finish_non_exhaustive()
    }
}

impl CentServer {
    #[must_use]
    pub fn new(
        config: ServerConfig,
        provider: Arc<dyn DomainProvider>,
        transport: Arc<dyn Transport>,
        events: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            config,
            provider,
            transport,
            events,
            shutdown: Arc::new(ShutdownController::new()),
            registry: None,
            subscriber: None,
            forwarder: None,
        }
    }

    #[must_use]
    pub fn shutdown_controller(&self) -> Arc<ShutdownController> {
        Arc::clone(&self.shutdown)
    }

    #[must_use]
    pub fn health(&self) -> HealthState {
        self.shutdown.health_state()
    }

    /// The command table, available once `start()` has succeeded.
    #[must_use]
    pub fn registry(&self) -> Option<Arc<OperationRegistry>> {
        self.registry.clone()
    }

    /// Attaches the event forwarder and binds every command subject.
    ///
    /// Returns the number of bound subjects.
    ///
    /// # Errors
    ///
    /// Returns an error if the server was already started, the command table
    /// is inconsistent, or the transport refuses a subscription. On a refused
    /// subscription, subjects bound so far are released without signalling
    /// shutdown, so `start()` may be called again.
    pub async fn start(&mut self) -> anyhow::Result<usize> {
        anyhow::ensure!(self.subscriber.is_none(), "server already started");

        let registry = Arc::new(build_registry(&self.provider).context("building command table")?);

        // Attached once; a retried start() reuses the same forwarder.
        if self.forwarder.is_none() {
            let forwarder = EventForwarder::start(Arc::clone(&self.events), &self.config);
            forwarder.attach(self.provider.as_ref());
            self.forwarder = Some(forwarder);
        }

        let pipeline = build_operation_pipeline(OperationRouter::new(Arc::clone(&registry)), &self.config);
        let dispatcher = RpcDispatcher::new(
            pipeline,
            Arc::clone(&self.transport),
            Arc::clone(&self.shutdown),
        );
        let mut subscriber = QueueGroupSubscriber::new(
            Arc::clone(&self.transport),
            self.config.queue_group.clone(),
            dispatcher,
            self.shutdown.shutdown_receiver(),
        );

        let bound = match subscriber.bind_all(registry.subjects().iter().copied()).await {
            Ok(bound) => bound,
            Err(e) => {
                subscriber.abort().await;
                return Err(e).context("binding command subjects");
            }
        };

        info!(
            subjects = bound,
            group = %self.config.queue_group,
            "gateway started"
        );
        self.registry = Some(registry);
        self.subscriber = Some(subscriber);
        Ok(bound)
    }

    /// Serves commands until `shutdown` resolves, then shuts down gracefully.
    ///
    /// After the shutdown signal:
    /// 1. Health state moves to Draining and every listener unsubscribes
    /// 2. Waits up to `drain_timeout` for in-flight dispatches
    /// 3. Publishes queued events and stops the publish worker
    ///
    /// # Errors
    ///
    /// Returns an error if `start()` was not called first.
    pub async fn serve(self, shutdown: impl Future<Output = ()> + Send) -> anyhow::Result<()> {
        let (Some(mut subscriber), Some(mut forwarder)) = (self.subscriber, self.forwarder) else {
            anyhow::bail!("start() must be called before serve()");
        };
        let controller = self.shutdown;

        controller.set_ready();
        info!("serving commands");

        shutdown.await;

        info!("shutdown requested, unsubscribing");
        controller.trigger_shutdown();
        subscriber.join().await;

        let in_flight = controller.in_flight_count();
        if in_flight > 0 {
            info!(in_flight, "draining in-flight dispatches");
        }
        if controller.wait_for_drain(self.config.drain_timeout).await {
            info!("all dispatches drained");
        } else {
            warn!(
                remaining = controller.in_flight_count(),
                "drain timeout expired with dispatches still running"
            );
        }

        forwarder.stop().await;
        info!("gateway stopped");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use bytes::Bytes;
    use cent_core::subject;
    use cent_core::transport::{InMemoryTransport, Message, Subscription, TransportError};
    use cent_core::types::Customer;
    use cent_core::Client;

    use super::*;
    use crate::events::TransportPublisher;
    use crate::provider::MemoryProvider;

    /// Refuses the queue subscription on `refused` once, then behaves like the bus.
    struct RefusesOnce {
        bus: InMemoryTransport,
        refused: &'static str,
        tripped: AtomicBool,
    }

    #[async_trait]
    impl Transport for RefusesOnce {
        async fn publish(&self, subject: &str, payload: Bytes) -> Result<(), TransportError> {
            self.bus.publish(subject, payload).await
        }
        async fn publish_with_reply(
            &self,
            subject: &str,
            reply: &str,
            payload: Bytes,
        ) -> Result<(), TransportError> {
            self.bus.publish_with_reply(subject, reply, payload).await
        }
        async fn request(
            &self,
            subject: &str,
            payload: Bytes,
            timeout: Duration,
        ) -> Result<Message, TransportError> {
            self.bus.request(subject, payload, timeout).await
        }
        async fn subscribe(&self, subject: &str) -> Result<Subscription, TransportError> {
            self.bus.subscribe(subject).await
        }
        async fn queue_subscribe(
            &self,
            subject: &str,
            group: &str,
        ) -> Result<Subscription, TransportError> {
            if subject == self.refused && !self.tripped.swap(true, Ordering::SeqCst) {
                return Err(TransportError::Subscribe("permission denied".into()));
            }
            self.bus.queue_subscribe(subject, group).await
        }
    }

    fn server(bus: &InMemoryTransport) -> CentServer {
        let transport: Arc<dyn Transport> = Arc::new(bus.clone());
        CentServer::new(
            ServerConfig::default(),
            Arc::new(MemoryProvider::new()),
            Arc::clone(&transport),
            Arc::new(TransportPublisher::new(transport)),
        )
    }

    #[tokio::test]
    async fn new_binds_nothing() {
        let bus = InMemoryTransport::new();
        let server = server(&bus);
        assert_eq!(server.health(), HealthState::Starting);
        assert!(server.registry().is_none());
        assert_eq!(bus.subscriber_count(subject::commands::PLAN_LIST), 0);
    }

    #[tokio::test]
    async fn start_binds_every_command_subject() {
        let bus = InMemoryTransport::new();
        let mut server = server(&bus);

        let bound = server.start().await.unwrap();

        assert_eq!(bound, subject::commands::ALL.len());
        assert_eq!(server.registry().unwrap().len(), bound);
        for subject in subject::commands::ALL {
            assert_eq!(bus.subscriber_count(subject), 1, "{subject}");
        }
    }

    #[tokio::test]
    async fn start_twice_is_rejected() {
        let bus = InMemoryTransport::new();
        let mut server = server(&bus);
        server.start().await.unwrap();
        assert!(server.start().await.is_err());
    }

    #[tokio::test]
    async fn serve_requires_start() {
        let bus = InMemoryTransport::new();
        let err = server(&bus).serve(async {}).await.unwrap_err();
        assert!(err.to_string().contains("start()"));
    }

    #[tokio::test]
    async fn serve_drains_and_stops() {
        let bus = InMemoryTransport::new();
        let mut server = server(&bus);
        server.start().await.unwrap();
        let controller = server.shutdown_controller();

        server.serve(async {}).await.unwrap();

        assert_eq!(controller.health_state(), HealthState::Stopped);
        assert_eq!(bus.subscriber_count(subject::commands::PLAN_LIST), 0);
    }

    #[tokio::test]
    async fn failed_start_can_be_retried() {
        let bus = InMemoryTransport::new();
        let transport: Arc<dyn Transport> = Arc::new(RefusesOnce {
            bus: bus.clone(),
            refused: subject::commands::SYNC,
            tripped: AtomicBool::new(false),
        });
        let mut server = CentServer::new(
            ServerConfig::default(),
            Arc::new(MemoryProvider::new()),
            Arc::clone(&transport),
            Arc::new(TransportPublisher::new(Arc::clone(&transport))),
        );
        let controller = server.shutdown_controller();

        let err = server.start().await.unwrap_err();
        assert!(format!("{err:#}").contains(subject::commands::SYNC));
        assert!(!controller.is_shutting_down());
        assert_eq!(controller.health_state(), HealthState::Starting);
        for subject in subject::commands::ALL {
            assert_eq!(bus.subscriber_count(subject), 0, "{subject}");
        }

        assert_eq!(server.start().await.unwrap(), subject::commands::ALL.len());
        for subject in subject::commands::ALL {
            assert_eq!(bus.subscriber_count(subject), 1, "{subject}");
        }

        let mut added = bus.subscribe(subject::events::CUSTOMER_ADDED).await.unwrap();
        Client::with_timeout(Arc::new(bus.clone()), Duration::from_secs(1))
            .add_customer(&Customer {
                name: "Ada".into(),
                ..Customer::default()
            })
            .await
            .unwrap();
        assert!(tokio::time::timeout(Duration::from_secs(1), added.next())
            .await
            .unwrap()
            .is_some());
        assert!(tokio::time::timeout(Duration::from_millis(50), added.next())
            .await
            .is_err());

        server.serve(async {}).await.unwrap();
        assert_eq!(controller.health_state(), HealthState::Stopped);
    }
}
