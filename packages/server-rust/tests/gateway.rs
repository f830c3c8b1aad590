//! End-to-end request/reply and event flows over the in-memory transport.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use cent_core::codec;
use cent_core::subject::{commands, events};
use cent_core::transport::{InMemoryTransport, Transport};
use cent_core::types::{Customer, Plan, Price, Subscription, SubscriptionUser};
use cent_core::{Client, ClientError};
use cent_server::events::PublishError;
use cent_server::{
    CentServer, EventPublisher, HealthState, MemoryProvider, ServerConfig, TransportPublisher,
};
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

struct Running {
    provider: Arc<MemoryProvider>,
    stop: oneshot::Sender<()>,
    task: JoinHandle<anyhow::Result<()>>,
}

impl Running {
    async fn shutdown(self) {
        let _ = self.stop.send(());
        self.task.await.unwrap().unwrap();
    }
}

async fn launch(bus: &InMemoryTransport, events: Arc<dyn EventPublisher>) -> Running {
    let provider = Arc::new(MemoryProvider::new());
    let mut server = CentServer::new(
        ServerConfig::default(),
        provider.clone(),
        Arc::new(bus.clone()),
        events,
    );
    server.start().await.unwrap();

    let (stop, stopped) = oneshot::channel::<()>();
    let task = tokio::spawn(server.serve(async move {
        let _ = stopped.await;
    }));
    Running {
        provider,
        stop,
        task,
    }
}

async fn launch_default(bus: &InMemoryTransport) -> Running {
    launch(bus, Arc::new(TransportPublisher::new(Arc::new(bus.clone())))).await
}

fn client(bus: &InMemoryTransport) -> Client {
    Client::with_timeout(Arc::new(bus.clone()), Duration::from_secs(2))
}

/// Adds customer 1, plan 2 and price 3 through the gateway.
async fn seed(client: &Client) {
    client
        .add_customer(&Customer {
            name: "Ada".into(),
            email: "ada@example.com".into(),
            ..Customer::default()
        })
        .await
        .unwrap();
    client
        .add_plan(&Plan {
            name: "Pro".into(),
            active: true,
            ..Plan::default()
        })
        .await
        .unwrap();
    client
        .add_price(&Price {
            plan_id: 2,
            currency: "usd".into(),
            amount: 1500,
            ..Price::default()
        })
        .await
        .unwrap();
}

fn subscription(active: bool) -> Subscription {
    Subscription {
        customer_id: 1,
        price_id: 3,
        active,
        ..Subscription::default()
    }
}

#[derive(Default)]
struct RecordingPublisher {
    sent: Mutex<Vec<(String, Bytes)>>,
}

impl RecordingPublisher {
    fn subjects(&self) -> Vec<String> {
        self.sent.lock().iter().map(|(s, _)| s.clone()).collect()
    }
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn publish(&self, subject: &str, payload: Bytes) -> Result<(), PublishError> {
        self.sent.lock().push((subject.to_string(), payload));
        Ok(())
    }
}

struct FailingPublisher;

#[async_trait]
impl EventPublisher for FailingPublisher {
    async fn publish(&self, _subject: &str, _payload: Bytes) -> Result<(), PublishError> {
        Err(PublishError::JetStream("stream unavailable".into()))
    }
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

#[tokio::test]
async fn customer_round_trip_through_gateway() {
    let bus = InMemoryTransport::new();
    let server = launch_default(&bus).await;
    let client = client(&bus);
    seed(&client).await;

    let customer = client.get_customer_by_id(1).await.unwrap();
    assert_eq!(customer.name, "Ada");
    assert_eq!(customer.provider_id, "cus_1");

    let by_email = client.get_customer_by_email("ada@example.com").await.unwrap();
    assert_eq!(by_email, customer);

    server.shutdown().await;
}

#[tokio::test]
async fn non_numeric_id_is_a_bad_request() {
    let bus = InMemoryTransport::new();
    let server = launch_default(&bus).await;
    let client = client(&bus);

    let err = client
        .call(commands::PLAN_GET_BY_ID, b"abc".to_vec())
        .await
        .unwrap_err();

    assert!(matches!(&err, ClientError::Remote(msg) if msg == "bad request"));
    assert_eq!(server.provider.calls(), 0);
    server.shutdown().await;
}

#[tokio::test]
async fn provider_errors_are_passed_through() {
    let bus = InMemoryTransport::new();
    let server = launch_default(&bus).await;

    let err = client(&bus).get_plan_by_id(99).await.unwrap_err();

    assert!(matches!(&err, ClientError::Remote(msg) if msg == "plan not found"));
    server.shutdown().await;
}

#[tokio::test]
async fn seat_count_and_checkout() {
    let bus = InMemoryTransport::new();
    let server = launch_default(&bus).await;
    let client = client(&bus);
    seed(&client).await;
    let sub = server.provider.insert_subscription(subscription(true)).unwrap();

    for username in ["ada", "grace", "linus"] {
        client
            .add_subscription_user(&SubscriptionUser {
                subscription_id: sub.id,
                username: username.into(),
            })
            .await
            .unwrap();
    }
    assert_eq!(client.count_subscription_users(sub.id).await.unwrap(), 3);
    assert_eq!(
        client.list_subscription_usernames(sub.id).await.unwrap(),
        vec!["ada", "grace", "linus"]
    );

    let url = client
        .checkout(&cent_core::types::CheckoutRequest {
            customer_id: 1,
            price_id: 3,
            redirect_url: "https://example.com/done".into(),
        })
        .await
        .unwrap();
    assert!(url.starts_with("https://checkout.invalid/session/"));

    server.shutdown().await;
}

#[tokio::test]
async fn failed_event_publish_does_not_fail_the_command() {
    let bus = InMemoryTransport::new();
    let server = launch(&bus, Arc::new(FailingPublisher)).await;
    let client = client(&bus);

    client
        .add_customer(&Customer {
            name: "Ada".into(),
            ..Customer::default()
        })
        .await
        .unwrap();

    assert_eq!(client.list_customers().await.unwrap().len(), 1);
    server.shutdown().await;
}

#[tokio::test]
async fn queue_group_answers_each_request_exactly_once() {
    let bus = InMemoryTransport::new();
    let mut instances = Vec::new();
    for _ in 0..3 {
        instances.push(launch_default(&bus).await);
    }
    let client = client(&bus);

    let calls: Vec<_> = (0..30)
        .map(|_| {
            let client = client.clone();
            tokio::spawn(async move { client.list_plans().await })
        })
        .collect();
    for call in calls {
        assert!(call.await.unwrap().unwrap().is_empty());
    }

    let handled: u64 = instances.iter().map(|i| i.provider.calls()).sum();
    assert_eq!(handled, 30);

    for instance in instances {
        instance.shutdown().await;
    }
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

#[tokio::test]
async fn subscription_events_follow_primary_then_derived_order() {
    let bus = InMemoryTransport::new();
    let publisher = Arc::new(RecordingPublisher::default());
    let server = launch(&bus, publisher.clone()).await;
    seed(&client(&bus)).await;

    let sub = server.provider.insert_subscription(subscription(true)).unwrap();
    server.provider.set_subscription_active(sub.id, false).unwrap();
    server.provider.set_subscription_active(sub.id, false).unwrap();
    server.provider.set_subscription_active(sub.id, true).unwrap();
    server.shutdown().await;

    let subscription_events: Vec<String> = publisher
        .subjects()
        .into_iter()
        .filter(|s| s.starts_with("cent.subscription."))
        .collect();
    assert_eq!(
        subscription_events,
        vec![
            events::SUBSCRIPTION_ADDED,
            events::SUBSCRIPTION_ACTIVATED,
            events::SUBSCRIPTION_UPDATED,
            events::SUBSCRIPTION_DEACTIVATED,
            events::SUBSCRIPTION_UPDATED,
            events::SUBSCRIPTION_UPDATED,
            events::SUBSCRIPTION_ACTIVATED,
        ]
    );

    let (_, last_body) = publisher.sent.lock().last().cloned().unwrap();
    let published: Subscription = codec::decode(&last_body).unwrap();
    assert!(published.active);
    assert_eq!(published.id, sub.id);
}

#[tokio::test]
async fn events_reach_bus_subscribers_as_bare_entities() {
    let bus = InMemoryTransport::new();
    let mut added = bus.subscribe(events::CUSTOMER_ADDED).await.unwrap();
    let server = launch_default(&bus).await;

    client(&bus)
        .add_customer(&Customer {
            name: "Grace".into(),
            ..Customer::default()
        })
        .await
        .unwrap();

    let msg = tokio::time::timeout(Duration::from_secs(1), added.next())
        .await
        .unwrap()
        .unwrap();
    let customer: Customer = codec::decode(&msg.payload).unwrap();
    assert_eq!(customer.name, "Grace");
    assert_eq!(customer.id, 1);

    server.shutdown().await;
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

#[tokio::test]
async fn stopped_server_leaves_no_responders() {
    let bus = InMemoryTransport::new();
    let server = launch_default(&bus).await;
    let client = client(&bus);
    assert!(client.list_plans().await.is_ok());

    server.shutdown().await;

    let err = client.list_plans().await.unwrap_err();
    assert!(matches!(err, ClientError::NoResponders { .. }));
    for subject in commands::ALL {
        assert_eq!(bus.subscriber_count(subject), 0, "{subject}");
    }
}

#[tokio::test]
async fn health_moves_to_stopped_after_serve() {
    let bus = InMemoryTransport::new();
    let transport: Arc<dyn Transport> = Arc::new(bus.clone());
    let mut server = CentServer::new(
        ServerConfig::default(),
        Arc::new(MemoryProvider::new()),
        Arc::clone(&transport),
        Arc::new(TransportPublisher::new(transport)),
    );
    let controller = server.shutdown_controller();
    assert_eq!(controller.health_state(), HealthState::Starting);

    server.start().await.unwrap();
    let (stop, stopped) = oneshot::channel::<()>();
    let task = tokio::spawn(server.serve(async move {
        let _ = stopped.await;
    }));

    client(&bus).list_plans().await.unwrap();
    assert_eq!(controller.health_state(), HealthState::Ready);

    stop.send(()).unwrap();
    task.await.unwrap().unwrap();
    assert_eq!(controller.health_state(), HealthState::Stopped);
}
