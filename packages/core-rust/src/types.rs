//! Billing entities carried in request, reply, and event payloads.
//!
//! Every struct is `#[serde(default)]` so a peer running an older or newer
//! build can omit or add fields without breaking decoding.

use serde::{Deserialize, Serialize};

/// Name of the payment processor that owns the provider-side identifiers.
pub const PROVIDER_STRIPE: &str = "stripe";

/// A paying customer.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Customer {
    pub id: i64,
    pub provider: String,
    pub provider_id: String,
    pub name: String,
    pub email: String,
}

/// A product that can be subscribed to through one or more prices.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Plan {
    pub id: i64,
    pub provider: String,
    pub provider_id: String,
    pub name: String,
    pub description: String,
    pub active: bool,
}

/// Billing interval of a price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Schedule {
    #[default]
    Monthly,
    Annual,
}

/// A recurring price attached to a plan. `amount` is in the currency's minor unit.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Price {
    pub id: i64,
    pub plan_id: i64,
    pub provider: String,
    pub provider_id: String,
    pub currency: String,
    pub amount: i64,
    pub schedule: Schedule,
    pub trial_days: i32,
}

/// A customer's subscription to a price.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Subscription {
    pub id: i64,
    pub customer_id: i64,
    pub price_id: i64,
    pub provider: String,
    pub provider_id: String,
    pub active: bool,
}

/// A seat: one username granted access under a subscription.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SubscriptionUser {
    pub subscription_id: i64,
    pub username: String,
}

/// Input for creating a hosted checkout session.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckoutRequest {
    pub customer_id: i64,
    pub price_id: i64,
    pub redirect_url: String,
}
