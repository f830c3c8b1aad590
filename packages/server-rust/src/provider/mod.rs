//! Domain provider boundary.
//!
//! The gateway never computes billing results itself. Every command subject is
//! served by one [`DomainProvider`] method, and lifecycle changes inside the
//! provider are observed through callbacks registered with
//! [`DomainProvider::on_event`].

pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use cent_core::types::{
    CheckoutRequest, Customer, Plan, Price, Subscription, SubscriptionUser,
};
use dashmap::DashMap;

pub use memory::MemoryProvider;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors returned by provider operations.
///
/// The gateway forwards the display text verbatim in failure envelopes; it
/// never branches on the variant.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("{entity} not found")]
    NotFound { entity: &'static str },
    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
    #[error("{entity} already exists: {key}")]
    Conflict { entity: &'static str, key: String },
    #[error("payment processor error: {0}")]
    Upstream(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

// ---------------------------------------------------------------------------
// Lifecycle events
// ---------------------------------------------------------------------------

/// Kinds of lifecycle events a provider emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    CustomerAdded,
    CustomerRemoved,
    CustomerUpdated,
    PlanAdded,
    PlanRemoved,
    PlanUpdated,
    PriceAdded,
    PriceRemoved,
    PriceUpdated,
    SubscriptionAdded,
    SubscriptionRemoved,
    SubscriptionUpdated,
    SubscriptionUserAdded,
    SubscriptionUserRemoved,
}

impl EventKind {
    pub const ALL: [EventKind; 14] = [
        EventKind::CustomerAdded,
        EventKind::CustomerRemoved,
        EventKind::CustomerUpdated,
        EventKind::PlanAdded,
        EventKind::PlanRemoved,
        EventKind::PlanUpdated,
        EventKind::PriceAdded,
        EventKind::PriceRemoved,
        EventKind::PriceUpdated,
        EventKind::SubscriptionAdded,
        EventKind::SubscriptionRemoved,
        EventKind::SubscriptionUpdated,
        EventKind::SubscriptionUserAdded,
        EventKind::SubscriptionUserRemoved,
    ];
}

/// A lifecycle change inside the provider.
///
/// Update events carry both snapshots so observers can derive transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomainEvent {
    CustomerAdded(Customer),
    CustomerRemoved(Customer),
    CustomerUpdated { previous: Customer, current: Customer },
    PlanAdded(Plan),
    PlanRemoved(Plan),
    PlanUpdated { previous: Plan, current: Plan },
    PriceAdded(Price),
    PriceRemoved(Price),
    PriceUpdated { previous: Price, current: Price },
    SubscriptionAdded(Subscription),
    SubscriptionRemoved(Subscription),
    SubscriptionUpdated {
        previous: Subscription,
        current: Subscription,
    },
    SubscriptionUserAdded(SubscriptionUser),
    SubscriptionUserRemoved(SubscriptionUser),
}

impl DomainEvent {
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            Self::CustomerAdded(_) => EventKind::CustomerAdded,
            Self::CustomerRemoved(_) => EventKind::CustomerRemoved,
            Self::CustomerUpdated { .. } => EventKind::CustomerUpdated,
            Self::PlanAdded(_) => EventKind::PlanAdded,
            Self::PlanRemoved(_) => EventKind::PlanRemoved,
            Self::PlanUpdated { .. } => EventKind::PlanUpdated,
            Self::PriceAdded(_) => EventKind::PriceAdded,
            Self::PriceRemoved(_) => EventKind::PriceRemoved,
            Self::PriceUpdated { .. } => EventKind::PriceUpdated,
            Self::SubscriptionAdded(_) => EventKind::SubscriptionAdded,
            Self::SubscriptionRemoved(_) => EventKind::SubscriptionRemoved,
            Self::SubscriptionUpdated { .. } => EventKind::SubscriptionUpdated,
            Self::SubscriptionUserAdded(_) => EventKind::SubscriptionUserAdded,
            Self::SubscriptionUserRemoved(_) => EventKind::SubscriptionUserRemoved,
        }
    }
}

/// Callback invoked synchronously by the provider for each matching event.
///
/// Callbacks must not block: they run inside the domain operation that
/// triggered them.
pub type EventCallback = Arc<dyn Fn(&DomainEvent) + Send + Sync>;

/// Per-kind callback lists with fan-out delivery.
///
/// Providers embed one of these to implement [`DomainProvider::on_event`].
#[derive(Default)]
pub struct EventCallbacks {
    callbacks: DashMap<EventKind, Vec<EventCallback>>,
}

impl EventCallbacks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `callback` to the list for `kind`.
    pub fn register(&self, kind: EventKind, callback: EventCallback) {
        self.callbacks.entry(kind).or_default().push(callback);
    }

    /// Invokes every callback registered for the event's kind, in
    /// registration order.
    pub fn emit(&self, event: &DomainEvent) {
        // Clone the list so callbacks may register further callbacks.
        let listeners: Vec<EventCallback> = self
            .callbacks
            .get(&event.kind())
            .map(|entry| entry.value().clone())
            .unwrap_or_default();
        for callback in listeners {
            callback(event);
        }
    }

    /// Number of callbacks registered for `kind`.
    #[must_use]
    pub fn count(&self, kind: EventKind) -> usize {
        self.callbacks.get(&kind).map_or(0, |entry| entry.len())
    }
}

impl std::fmt::Debug for EventCallbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventCallbacks")
            .field("kinds", &self.callbacks.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// DomainProvider trait
// ---------------------------------------------------------------------------

/// Billing operations the gateway exposes over the transport.
///
/// Implementations must be safe for concurrent use; the gateway dispatches
/// commands in parallel without any locking of its own.
///
/// Used as `Arc<dyn DomainProvider>`.
#[async_trait]
pub trait DomainProvider: Send + Sync + 'static {
    // Customers
    async fn add_customer(&self, customer: Customer) -> Result<(), ProviderError>;
    async fn update_customer(&self, customer: Customer) -> Result<Customer, ProviderError>;
    async fn get_customer_by_id(&self, id: i64) -> Result<Customer, ProviderError>;
    async fn get_customer_by_provider_id(&self, provider_id: String)
        -> Result<Customer, ProviderError>;
    async fn get_customer_by_email(&self, email: String) -> Result<Customer, ProviderError>;
    async fn list_customers(&self) -> Result<Vec<Customer>, ProviderError>;
    async fn remove_customer_by_provider_id(&self, provider_id: String)
        -> Result<(), ProviderError>;

    // Plans
    async fn add_plan(&self, plan: Plan) -> Result<(), ProviderError>;
    async fn update_plan(&self, plan: Plan) -> Result<Plan, ProviderError>;
    async fn get_plan_by_id(&self, id: i64) -> Result<Plan, ProviderError>;
    async fn get_plan_by_provider_id(&self, provider_id: String) -> Result<Plan, ProviderError>;
    async fn get_plan_by_name(&self, name: String) -> Result<Plan, ProviderError>;
    async fn get_plan_by_price_id(&self, price_id: i64) -> Result<Plan, ProviderError>;
    async fn get_plan_by_subscription_id(&self, subscription_id: i64)
        -> Result<Plan, ProviderError>;
    async fn list_plans(&self) -> Result<Vec<Plan>, ProviderError>;
    async fn list_active_plans(&self) -> Result<Vec<Plan>, ProviderError>;
    async fn list_plans_by_username(&self, username: String) -> Result<Vec<Plan>, ProviderError>;
    async fn remove_plan_by_provider_id(&self, provider_id: String) -> Result<(), ProviderError>;

    // Prices
    async fn add_price(&self, price: Price) -> Result<(), ProviderError>;
    async fn get_price_by_id(&self, id: i64) -> Result<Price, ProviderError>;
    async fn get_price_by_provider_id(&self, provider_id: String) -> Result<Price, ProviderError>;
    async fn list_prices(&self) -> Result<Vec<Price>, ProviderError>;
    async fn list_prices_by_plan_id(&self, plan_id: i64) -> Result<Vec<Price>, ProviderError>;

    // Subscriptions
    async fn get_subscription_by_id(&self, id: i64) -> Result<Subscription, ProviderError>;
    async fn get_subscription_by_provider_id(
        &self,
        provider_id: String,
    ) -> Result<Subscription, ProviderError>;
    async fn list_subscriptions(&self) -> Result<Vec<Subscription>, ProviderError>;
    async fn list_subscriptions_by_username(
        &self,
        username: String,
    ) -> Result<Vec<Subscription>, ProviderError>;
    async fn list_subscriptions_by_plan_id(
        &self,
        plan_id: i64,
    ) -> Result<Vec<Subscription>, ProviderError>;
    async fn list_subscriptions_by_customer_id(
        &self,
        customer_id: i64,
    ) -> Result<Vec<Subscription>, ProviderError>;

    // Seats
    async fn add_subscription_user(&self, user: SubscriptionUser) -> Result<(), ProviderError>;
    async fn remove_subscription_user(&self, user: SubscriptionUser)
        -> Result<(), ProviderError>;
    async fn list_subscription_usernames(
        &self,
        subscription_id: i64,
    ) -> Result<Vec<String>, ProviderError>;
    async fn count_subscription_users(&self, subscription_id: i64) -> Result<i64, ProviderError>;

    // Payment processor
    async fn sync(&self) -> Result<(), ProviderError>;
    async fn checkout(&self, request: CheckoutRequest) -> Result<String, ProviderError>;

    /// Registers `callback` for every future event of `kind`.
    fn on_event(&self, kind: EventKind, callback: EventCallback);
}
