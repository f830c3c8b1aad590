//! In-memory [`DomainProvider`] used by tests and by `centd` when no external
//! billing backend is wired in.
//!
//! Assigns sequential ids, enforces uniqueness of provider ids, and emits
//! lifecycle events after its state lock is released so callbacks may call
//! back into the provider.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use cent_core::types::{
    CheckoutRequest, Customer, Plan, Price, Subscription, SubscriptionUser, PROVIDER_STRIPE,
};
use parking_lot::RwLock;
use tracing::debug;

use super::{DomainEvent, DomainProvider, EventCallback, EventCallbacks, EventKind, ProviderError};

/// Base of the URLs returned by [`DomainProvider::checkout`].
pub const CHECKOUT_URL_BASE: &str = "https://checkout.invalid/session/";

#[derive(Debug, Default)]
struct State {
    next_id: i64,
    customers: BTreeMap<i64, Customer>,
    plans: BTreeMap<i64, Plan>,
    prices: BTreeMap<i64, Price>,
    subscriptions: BTreeMap<i64, Subscription>,
    seats: BTreeMap<i64, BTreeSet<String>>,
    checkouts: u64,
    syncs: u64,
}

impl State {
    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn plan_of_price(&self, price_id: i64) -> Result<&Plan, ProviderError> {
        let price = self.prices.get(&price_id).ok_or(not_found("price"))?;
        self.plans.get(&price.plan_id).ok_or(not_found("plan"))
    }

    fn plan_id_of_subscription(&self, subscription: &Subscription) -> Option<i64> {
        self.prices.get(&subscription.price_id).map(|p| p.plan_id)
    }

    fn subscriptions_of(&self, username: &str) -> Vec<Subscription> {
        self.seats
            .iter()
            .filter(|(_, users)| users.contains(username))
            .filter_map(|(id, _)| self.subscriptions.get(id).cloned())
            .collect()
    }
}

fn not_found(entity: &'static str) -> ProviderError {
    ProviderError::NotFound { entity }
}

fn conflict(entity: &'static str, key: &str) -> ProviderError {
    ProviderError::Conflict {
        entity,
        key: key.to_string(),
    }
}

fn fill_provider(provider: &mut String, provider_id: &mut String, prefix: &str, id: i64) {
    if provider.is_empty() {
        *provider = PROVIDER_STRIPE.to_string();
    }
    if provider_id.is_empty() {
        *provider_id = format!("{prefix}_{id}");
    }
}

/// Thread-safe in-memory billing store.
#[derive(Debug, Default)]
pub struct MemoryProvider {
    state: RwLock<State>,
    callbacks: EventCallbacks,
    calls: AtomicU64,
}

impl MemoryProvider {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of [`DomainProvider`] methods invoked so far (excluding `on_event`).
    #[must_use]
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Number of completed [`DomainProvider::sync`] calls.
    #[must_use]
    pub fn syncs(&self) -> u64 {
        self.state.read().syncs
    }

    fn touch(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }

    fn emit(&self, event: &DomainEvent) {
        debug!(kind = ?event.kind(), "domain event");
        self.callbacks.emit(event);
    }

    /// Records a subscription created on the payment processor side (checkout
    /// completion, webhook, or sync) and emits `SubscriptionAdded`.
    ///
    /// # Errors
    ///
    /// Returns an error if the customer or price does not exist, or if the
    /// provider id is already taken.
    pub fn insert_subscription(
        &self,
        mut subscription: Subscription,
    ) -> Result<Subscription, ProviderError> {
        {
            let mut state = self.state.write();
            if !state.customers.contains_key(&subscription.customer_id) {
                return Err(not_found("customer"));
            }
            if !state.prices.contains_key(&subscription.price_id) {
                return Err(not_found("price"));
            }
            if !subscription.provider_id.is_empty()
                && state
                    .subscriptions
                    .values()
                    .any(|s| s.provider_id == subscription.provider_id)
            {
                return Err(conflict("subscription", &subscription.provider_id));
            }
            subscription.id = state.allocate_id();
            fill_provider(
                &mut subscription.provider,
                &mut subscription.provider_id,
                "sub",
                subscription.id,
            );
            state
                .subscriptions
                .insert(subscription.id, subscription.clone());
        }
        self.emit(&DomainEvent::SubscriptionAdded(subscription.clone()));
        Ok(subscription)
    }

    /// Changes a subscription's `active` flag and emits `SubscriptionUpdated`
    /// with both snapshots, even when the flag is unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::NotFound`] if no subscription has `id`.
    pub fn set_subscription_active(
        &self,
        id: i64,
        active: bool,
    ) -> Result<Subscription, ProviderError> {
        let (previous, current) = {
            let mut state = self.state.write();
            let entry = state
                .subscriptions
                .get_mut(&id)
                .ok_or(not_found("subscription"))?;
            let previous = entry.clone();
            entry.active = active;
            (previous, entry.clone())
        };
        self.emit(&DomainEvent::SubscriptionUpdated {
            previous,
            current: current.clone(),
        });
        Ok(current)
    }

    /// Deletes a subscription and its seats, emitting `SubscriptionRemoved`.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::NotFound`] if no subscription has `id`.
    pub fn remove_subscription(&self, id: i64) -> Result<Subscription, ProviderError> {
        let removed = {
            let mut state = self.state.write();
            let removed = state
                .subscriptions
                .remove(&id)
                .ok_or(not_found("subscription"))?;
            state.seats.remove(&id);
            removed
        };
        self.emit(&DomainEvent::SubscriptionRemoved(removed.clone()));
        Ok(removed)
    }
}

#[async_trait]
impl DomainProvider for MemoryProvider {
    // -- Customers ----------------------------------------------------------

    async fn add_customer(&self, mut customer: Customer) -> Result<(), ProviderError> {
        self.touch();
        {
            let mut state = self.state.write();
            if !customer.provider_id.is_empty()
                && state
                    .customers
                    .values()
                    .any(|c| c.provider_id == customer.provider_id)
            {
                return Err(conflict("customer", &customer.provider_id));
            }
            customer.id = state.allocate_id();
            fill_provider(
                &mut customer.provider,
                &mut customer.provider_id,
                "cus",
                customer.id,
            );
            state.customers.insert(customer.id, customer.clone());
        }
        self.emit(&DomainEvent::CustomerAdded(customer));
        Ok(())
    }

    async fn update_customer(&self, customer: Customer) -> Result<Customer, ProviderError> {
        self.touch();
        let (previous, current) = {
            let mut state = self.state.write();
            let entry = state
                .customers
                .get_mut(&customer.id)
                .ok_or(not_found("customer"))?;
            let previous = entry.clone();
            entry.name = customer.name;
            entry.email = customer.email;
            (previous, entry.clone())
        };
        self.emit(&DomainEvent::CustomerUpdated {
            previous,
            current: current.clone(),
        });
        Ok(current)
    }

    async fn get_customer_by_id(&self, id: i64) -> Result<Customer, ProviderError> {
        self.touch();
        self.state
            .read()
            .customers
            .get(&id)
            .cloned()
            .ok_or(not_found("customer"))
    }

    async fn get_customer_by_provider_id(
        &self,
        provider_id: String,
    ) -> Result<Customer, ProviderError> {
        self.touch();
        self.state
            .read()
            .customers
            .values()
            .find(|c| c.provider_id == provider_id)
            .cloned()
            .ok_or(not_found("customer"))
    }

    async fn get_customer_by_email(&self, email: String) -> Result<Customer, ProviderError> {
        self.touch();
        self.state
            .read()
            .customers
            .values()
            .find(|c| c.email == email)
            .cloned()
            .ok_or(not_found("customer"))
    }

    async fn list_customers(&self) -> Result<Vec<Customer>, ProviderError> {
        self.touch();
        Ok(self.state.read().customers.values().cloned().collect())
    }

    async fn remove_customer_by_provider_id(
        &self,
        provider_id: String,
    ) -> Result<(), ProviderError> {
        self.touch();
        let removed = {
            let mut state = self.state.write();
            let id = state
                .customers
                .values()
                .find(|c| c.provider_id == provider_id)
                .map(|c| c.id)
                .ok_or(not_found("customer"))?;
            state.customers.remove(&id)
        };
        if let Some(customer) = removed {
            self.emit(&DomainEvent::CustomerRemoved(customer));
        }
        Ok(())
    }

    // -- Plans --------------------------------------------------------------

    async fn add_plan(&self, mut plan: Plan) -> Result<(), ProviderError> {
        self.touch();
        if plan.name.is_empty() {
            return Err(ProviderError::Invalid {
                field: "name",
                reason: "must not be empty".to_string(),
            });
        }
        {
            let mut state = self.state.write();
            if !plan.provider_id.is_empty()
                && state.plans.values().any(|p| p.provider_id == plan.provider_id)
            {
                return Err(conflict("plan", &plan.provider_id));
            }
            plan.id = state.allocate_id();
            fill_provider(&mut plan.provider, &mut plan.provider_id, "prod", plan.id);
            state.plans.insert(plan.id, plan.clone());
        }
        self.emit(&DomainEvent::PlanAdded(plan));
        Ok(())
    }

    async fn update_plan(&self, plan: Plan) -> Result<Plan, ProviderError> {
        self.touch();
        let (previous, current) = {
            let mut state = self.state.write();
            let entry = state.plans.get_mut(&plan.id).ok_or(not_found("plan"))?;
            let previous = entry.clone();
            entry.name = plan.name;
            entry.description = plan.description;
            entry.active = plan.active;
            (previous, entry.clone())
        };
        self.emit(&DomainEvent::PlanUpdated {
            previous,
            current: current.clone(),
        });
        Ok(current)
    }

    async fn get_plan_by_id(&self, id: i64) -> Result<Plan, ProviderError> {
        self.touch();
        self.state
            .read()
            .plans
            .get(&id)
            .cloned()
            .ok_or(not_found("plan"))
    }

    async fn get_plan_by_provider_id(&self, provider_id: String) -> Result<Plan, ProviderError> {
        self.touch();
        self.state
            .read()
            .plans
            .values()
            .find(|p| p.provider_id == provider_id)
            .cloned()
            .ok_or(not_found("plan"))
    }

    async fn get_plan_by_name(&self, name: String) -> Result<Plan, ProviderError> {
        self.touch();
        self.state
            .read()
            .plans
            .values()
            .find(|p| p.name == name)
            .cloned()
            .ok_or(not_found("plan"))
    }

    async fn get_plan_by_price_id(&self, price_id: i64) -> Result<Plan, ProviderError> {
        self.touch();
        self.state.read().plan_of_price(price_id).cloned()
    }

    async fn get_plan_by_subscription_id(
        &self,
        subscription_id: i64,
    ) -> Result<Plan, ProviderError> {
        self.touch();
        let state = self.state.read();
        let subscription = state
            .subscriptions
            .get(&subscription_id)
            .ok_or(not_found("subscription"))?;
        state.plan_of_price(subscription.price_id).cloned()
    }

    async fn list_plans(&self) -> Result<Vec<Plan>, ProviderError> {
        self.touch();
        Ok(self.state.read().plans.values().cloned().collect())
    }

    async fn list_active_plans(&self) -> Result<Vec<Plan>, ProviderError> {
        self.touch();
        Ok(self
            .state
            .read()
            .plans
            .values()
            .filter(|p| p.active)
            .cloned()
            .collect())
    }

    async fn list_plans_by_username(&self, username: String) -> Result<Vec<Plan>, ProviderError> {
        self.touch();
        let state = self.state.read();
        let plan_ids: BTreeSet<i64> = state
            .subscriptions_of(&username)
            .iter()
            .filter_map(|s| state.plan_id_of_subscription(s))
            .collect();
        Ok(plan_ids
            .iter()
            .filter_map(|id| state.plans.get(id).cloned())
            .collect())
    }

    async fn remove_plan_by_provider_id(&self, provider_id: String) -> Result<(), ProviderError> {
        self.touch();
        let removed = {
            let mut state = self.state.write();
            let id = state
                .plans
                .values()
                .find(|p| p.provider_id == provider_id)
                .map(|p| p.id)
                .ok_or(not_found("plan"))?;
            state.plans.remove(&id)
        };
        if let Some(plan) = removed {
            self.emit(&DomainEvent::PlanRemoved(plan));
        }
        Ok(())
    }

    // -- Prices -------------------------------------------------------------

    async fn add_price(&self, mut price: Price) -> Result<(), ProviderError> {
        self.touch();
        if price.amount < 0 {
            return Err(ProviderError::Invalid {
                field: "amount",
                reason: "must not be negative".to_string(),
            });
        }
        {
            let mut state = self.state.write();
            if !state.plans.contains_key(&price.plan_id) {
                return Err(not_found("plan"));
            }
            if !price.provider_id.is_empty()
                && state
                    .prices
                    .values()
                    .any(|p| p.provider_id == price.provider_id)
            {
                return Err(conflict("price", &price.provider_id));
            }
            price.id = state.allocate_id();
            fill_provider(&mut price.provider, &mut price.provider_id, "price", price.id);
            state.prices.insert(price.id, price.clone());
        }
        self.emit(&DomainEvent::PriceAdded(price));
        Ok(())
    }

    async fn get_price_by_id(&self, id: i64) -> Result<Price, ProviderError> {
        self.touch();
        self.state
            .read()
            .prices
            .get(&id)
            .cloned()
            .ok_or(not_found("price"))
    }

    async fn get_price_by_provider_id(&self, provider_id: String) -> Result<Price, ProviderError> {
        self.touch();
        self.state
            .read()
            .prices
            .values()
            .find(|p| p.provider_id == provider_id)
            .cloned()
            .ok_or(not_found("price"))
    }

    async fn list_prices(&self) -> Result<Vec<Price>, ProviderError> {
        self.touch();
        Ok(self.state.read().prices.values().cloned().collect())
    }

    async fn list_prices_by_plan_id(&self, plan_id: i64) -> Result<Vec<Price>, ProviderError> {
        self.touch();
        Ok(self
            .state
            .read()
            .prices
            .values()
            .filter(|p| p.plan_id == plan_id)
            .cloned()
            .collect())
    }

    // -- Subscriptions ------------------------------------------------------

    async fn get_subscription_by_id(&self, id: i64) -> Result<Subscription, ProviderError> {
        self.touch();
        self.state
            .read()
            .subscriptions
            .get(&id)
            .cloned()
            .ok_or(not_found("subscription"))
    }

    async fn get_subscription_by_provider_id(
        &self,
        provider_id: String,
    ) -> Result<Subscription, ProviderError> {
        self.touch();
        self.state
            .read()
            .subscriptions
            .values()
            .find(|s| s.provider_id == provider_id)
            .cloned()
            .ok_or(not_found("subscription"))
    }

    async fn list_subscriptions(&self) -> Result<Vec<Subscription>, ProviderError> {
        self.touch();
        Ok(self.state.read().subscriptions.values().cloned().collect())
    }

    async fn list_subscriptions_by_username(
        &self,
        username: String,
    ) -> Result<Vec<Subscription>, ProviderError> {
        self.touch();
        Ok(self.state.read().subscriptions_of(&username))
    }

    async fn list_subscriptions_by_plan_id(
        &self,
        plan_id: i64,
    ) -> Result<Vec<Subscription>, ProviderError> {
        self.touch();
        let state = self.state.read();
        Ok(state
            .subscriptions
            .values()
            .filter(|s| state.plan_id_of_subscription(s) == Some(plan_id))
            .cloned()
            .collect())
    }

    async fn list_subscriptions_by_customer_id(
        &self,
        customer_id: i64,
    ) -> Result<Vec<Subscription>, ProviderError> {
        self.touch();
        Ok(self
            .state
            .read()
            .subscriptions
            .values()
            .filter(|s| s.customer_id == customer_id)
            .cloned()
            .collect())
    }

    // -- Seats --------------------------------------------------------------

    async fn add_subscription_user(&self, user: SubscriptionUser) -> Result<(), ProviderError> {
        self.touch();
        if user.username.is_empty() {
            return Err(ProviderError::Invalid {
                field: "username",
                reason: "must not be empty".to_string(),
            });
        }
        {
            let mut state = self.state.write();
            if !state.subscriptions.contains_key(&user.subscription_id) {
                return Err(not_found("subscription"));
            }
            let seats = state.seats.entry(user.subscription_id).or_default();
            if !seats.insert(user.username.clone()) {
                return Err(conflict("seat", &user.username));
            }
        }
        self.emit(&DomainEvent::SubscriptionUserAdded(user));
        Ok(())
    }

    async fn remove_subscription_user(&self, user: SubscriptionUser) -> Result<(), ProviderError> {
        self.touch();
        {
            let mut state = self.state.write();
            let removed = state
                .seats
                .get_mut(&user.subscription_id)
                .is_some_and(|seats| seats.remove(&user.username));
            if !removed {
                return Err(not_found("seat"));
            }
        }
        self.emit(&DomainEvent::SubscriptionUserRemoved(user));
        Ok(())
    }

    async fn list_subscription_usernames(
        &self,
        subscription_id: i64,
    ) -> Result<Vec<String>, ProviderError> {
        self.touch();
        Ok(self
            .state
            .read()
            .seats
            .get(&subscription_id)
            .map(|seats| seats.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn count_subscription_users(&self, subscription_id: i64) -> Result<i64, ProviderError> {
        self.touch();
        let count = self
            .state
            .read()
            .seats
            .get(&subscription_id)
            .map_or(0, BTreeSet::len);
        i64::try_from(count).map_err(|e| ProviderError::Other(e.into()))
    }

    // -- Payment processor --------------------------------------------------

    async fn sync(&self) -> Result<(), ProviderError> {
        self.touch();
        self.state.write().syncs += 1;
        Ok(())
    }

    async fn checkout(&self, request: CheckoutRequest) -> Result<String, ProviderError> {
        self.touch();
        let mut state = self.state.write();
        if !state.customers.contains_key(&request.customer_id) {
            return Err(not_found("customer"));
        }
        if !state.prices.contains_key(&request.price_id) {
            return Err(not_found("price"));
        }
        state.checkouts += 1;
        Ok(format!("{CHECKOUT_URL_BASE}{}", state.checkouts))
    }

    fn on_event(&self, kind: EventKind, callback: EventCallback) {
        self.callbacks.register(kind, callback);
    }
}
