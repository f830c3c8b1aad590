//! Typed request/reply client for the `cent.*` command subjects.
//!
//! A [`Client`] is cheap to clone and safe to share across tasks: every call is
//! an independent transport request with its own reply inbox and timeout.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::codec::{self, CodecError};
use crate::envelope::{self, EnvelopeError};
use crate::subject::commands;
use crate::transport::{Transport, TransportError};
use crate::types::{CheckoutRequest, Customer, Plan, Price, Subscription, SubscriptionUser};

/// Timeout applied by [`Client::new`] when none is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors returned by [`Client`] calls.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// No reply arrived in time. The server may still complete the operation.
    #[error("request on {subject} timed out after {timeout_ms}ms")]
    Timeout { subject: String, timeout_ms: u64 },
    #[error("no server is listening on {subject}")]
    NoResponders { subject: String },
    #[error("transport error: {0}")]
    Transport(TransportError),
    /// The server answered with a failure envelope; carries its error text.
    #[error("{0}")]
    Remote(String),
    #[error(transparent)]
    Envelope(#[from] EnvelopeError),
    #[error(transparent)]
    Codec(#[from] CodecError),
}

impl From<TransportError> for ClientError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Timeout {
                subject,
                timeout_ms,
            } => Self::Timeout {
                subject,
                timeout_ms,
            },
            TransportError::NoResponders { subject } => Self::NoResponders { subject },
            other => Self::Transport(other),
        }
    }
}

/// Client stub that issues commands and unwraps reply envelopes.
#[derive(Clone)]
pub struct Client {
    transport: Arc<dyn Transport>,
    timeout: Duration,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Creates a client using [`DEFAULT_TIMEOUT`].
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self::with_timeout(transport, DEFAULT_TIMEOUT)
    }

    #[must_use]
    pub fn with_timeout(transport: Arc<dyn Transport>, timeout: Duration) -> Self {
        Self { transport, timeout }
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Sends raw request bytes to `subject` and returns the reply's data.
    ///
    /// # Errors
    ///
    /// - [`ClientError::Timeout`] if no reply arrives within the client timeout
    /// - [`ClientError::Remote`] with the server's error text on a failure envelope
    /// - [`ClientError::Envelope`] if the reply is not an envelope
    pub async fn call(&self, subject: &str, payload: Vec<u8>) -> Result<Vec<u8>, ClientError> {
        self.call_with_timeout(subject, payload, self.timeout).await
    }

    /// Like [`Client::call`] with an explicit timeout for this call only.
    ///
    /// # Errors
    ///
    /// See [`Client::call`].
    pub async fn call_with_timeout(
        &self,
        subject: &str,
        payload: Vec<u8>,
        timeout: Duration,
    ) -> Result<Vec<u8>, ClientError> {
        debug!(subject = subject, bytes = payload.len(), "request");
        let reply = self
            .transport
            .request(subject, Bytes::from(payload), timeout)
            .await?;
        envelope::decode(&reply.payload)?
            .into_result()
            .map_err(ClientError::Remote)
    }

    async fn fetch<T: DeserializeOwned>(
        &self,
        subject: &str,
        payload: Vec<u8>,
    ) -> Result<T, ClientError> {
        let data = self.call(subject, payload).await?;
        Ok(codec::decode(&data)?)
    }

    async fn send<T: Serialize + ?Sized>(&self, subject: &str, value: &T) -> Result<(), ClientError> {
        self.call(subject, codec::encode(value)?).await?;
        Ok(())
    }

    // ---------------------------------------------------------------------------
    // Customers
    // ---------------------------------------------------------------------------

    /// # Errors
    ///
    /// Fails with the server's error text if the customer cannot be created.
    pub async fn add_customer(&self, customer: &Customer) -> Result<(), ClientError> {
        self.send(commands::CUSTOMER_ADD, customer).await
    }

    /// Updates a customer and returns the stored result.
    ///
    /// # Errors
    ///
    /// Fails if the customer does not exist or the call fails.
    pub async fn update_customer(&self, customer: &Customer) -> Result<Customer, ClientError> {
        self.fetch(commands::CUSTOMER_UPDATE, codec::encode(customer)?)
            .await
    }

    /// # Errors
    ///
    /// Fails if no customer has `id`.
    pub async fn get_customer_by_id(&self, id: i64) -> Result<Customer, ClientError> {
        self.fetch(commands::CUSTOMER_GET_BY_ID, codec::encode_id(id))
            .await
    }

    /// # Errors
    ///
    /// Fails if no customer has `provider_id`.
    pub async fn get_customer_by_provider_id(
        &self,
        provider_id: &str,
    ) -> Result<Customer, ClientError> {
        self.fetch(
            commands::CUSTOMER_GET_BY_PROVIDER_ID,
            codec::encode_text(provider_id),
        )
        .await
    }

    /// # Errors
    ///
    /// Fails if no customer has `email`.
    pub async fn get_customer_by_email(&self, email: &str) -> Result<Customer, ClientError> {
        self.fetch(commands::CUSTOMER_GET_BY_EMAIL, codec::encode_text(email))
            .await
    }

    /// # Errors
    ///
    /// Fails if the call fails.
    pub async fn list_customers(&self) -> Result<Vec<Customer>, ClientError> {
        self.fetch(commands::CUSTOMER_LIST, Vec::new()).await
    }

    /// # Errors
    ///
    /// Fails if the customer cannot be removed.
    pub async fn remove_customer_by_provider_id(
        &self,
        provider_id: &str,
    ) -> Result<(), ClientError> {
        self.call(
            commands::CUSTOMER_REMOVE_BY_PROVIDER_ID,
            codec::encode_text(provider_id),
        )
        .await?;
        Ok(())
    }

    // ---------------------------------------------------------------------------
    // Plans
    // ---------------------------------------------------------------------------

    /// # Errors
    ///
    /// Fails with the server's error text if the plan cannot be created.
    pub async fn add_plan(&self, plan: &Plan) -> Result<(), ClientError> {
        self.send(commands::PLAN_ADD, plan).await
    }

    /// # Errors
    ///
    /// Fails if the plan does not exist or the call fails.
    pub async fn update_plan(&self, plan: &Plan) -> Result<Plan, ClientError> {
        self.fetch(commands::PLAN_UPDATE, codec::encode(plan)?).await
    }

    /// # Errors
    ///
    /// Fails if no plan has `id`.
    pub async fn get_plan_by_id(&self, id: i64) -> Result<Plan, ClientError> {
        self.fetch(commands::PLAN_GET_BY_ID, codec::encode_id(id)).await
    }

    /// # Errors
    ///
    /// Fails if no plan has `provider_id`.
    pub async fn get_plan_by_provider_id(&self, provider_id: &str) -> Result<Plan, ClientError> {
        self.fetch(
            commands::PLAN_GET_BY_PROVIDER_ID,
            codec::encode_text(provider_id),
        )
        .await
    }

    /// # Errors
    ///
    /// Fails if no plan is named `name`.
    pub async fn get_plan_by_name(&self, name: &str) -> Result<Plan, ClientError> {
        self.fetch(commands::PLAN_GET_BY_NAME, codec::encode_text(name))
            .await
    }

    /// # Errors
    ///
    /// Fails if the price or its plan does not exist.
    pub async fn get_plan_by_price_id(&self, price_id: i64) -> Result<Plan, ClientError> {
        self.fetch(commands::PLAN_GET_BY_PRICE_ID, codec::encode_id(price_id))
            .await
    }

    /// # Errors
    ///
    /// Fails if the subscription or its plan does not exist.
    pub async fn get_plan_by_subscription_id(
        &self,
        subscription_id: i64,
    ) -> Result<Plan, ClientError> {
        self.fetch(
            commands::PLAN_GET_BY_SUBSCRIPTION_ID,
            codec::encode_id(subscription_id),
        )
        .await
    }

    /// # Errors
    ///
    /// Fails if the call fails.
    pub async fn list_plans(&self) -> Result<Vec<Plan>, ClientError> {
        self.fetch(commands::PLAN_LIST, Vec::new()).await
    }

    /// # Errors
    ///
    /// Fails if the call fails.
    pub async fn list_active_plans(&self) -> Result<Vec<Plan>, ClientError> {
        self.fetch(commands::PLAN_LIST_ACTIVE, Vec::new()).await
    }

    /// Plans `username` holds a seat under.
    ///
    /// # Errors
    ///
    /// Fails if the call fails.
    pub async fn list_plans_by_username(&self, username: &str) -> Result<Vec<Plan>, ClientError> {
        self.fetch(commands::PLAN_LIST_BY_USERNAME, codec::encode_text(username))
            .await
    }

    /// # Errors
    ///
    /// Fails if the plan cannot be removed.
    pub async fn remove_plan_by_provider_id(&self, provider_id: &str) -> Result<(), ClientError> {
        self.call(
            commands::PLAN_REMOVE_BY_PROVIDER_ID,
            codec::encode_text(provider_id),
        )
        .await?;
        Ok(())
    }

    // ---------------------------------------------------------------------------
    // Prices
    // ---------------------------------------------------------------------------

    /// # Errors
    ///
    /// Fails with the server's error text if the price cannot be created.
    pub async fn add_price(&self, price: &Price) -> Result<(), ClientError> {
        self.send(commands::PRICE_ADD, price).await
    }

    /// # Errors
    ///
    /// Fails if no price has `id`.
    pub async fn get_price_by_id(&self, id: i64) -> Result<Price, ClientError> {
        self.fetch(commands::PRICE_GET_BY_ID, codec::encode_id(id)).await
    }

    /// # Errors
    ///
    /// Fails if no price has `provider_id`.
    pub async fn get_price_by_provider_id(&self, provider_id: &str) -> Result<Price, ClientError> {
        self.fetch(
            commands::PRICE_GET_BY_PROVIDER_ID,
            codec::encode_text(provider_id),
        )
        .await
    }

    /// # Errors
    ///
    /// Fails if the call fails.
    pub async fn list_prices(&self) -> Result<Vec<Price>, ClientError> {
        self.fetch(commands::PRICE_LIST, Vec::new()).await
    }

    /// # Errors
    ///
    /// Fails if the call fails.
    pub async fn list_prices_by_plan_id(&self, plan_id: i64) -> Result<Vec<Price>, ClientError> {
        self.fetch(commands::PRICE_LIST_BY_PLAN_ID, codec::encode_id(plan_id))
            .await
    }

    // ---------------------------------------------------------------------------
    // Subscriptions
    // ---------------------------------------------------------------------------

    /// # Errors
    ///
    /// Fails if no subscription has `id`.
    pub async fn get_subscription_by_id(&self, id: i64) -> Result<Subscription, ClientError> {
        self.fetch(commands::SUBSCRIPTION_GET_BY_ID, codec::encode_id(id))
            .await
    }

    /// # Errors
    ///
    /// Fails if no subscription has `provider_id`.
    pub async fn get_subscription_by_provider_id(
        &self,
        provider_id: &str,
    ) -> Result<Subscription, ClientError> {
        self.fetch(
            commands::SUBSCRIPTION_GET_BY_PROVIDER_ID,
            codec::encode_text(provider_id),
        )
        .await
    }

    /// # Errors
    ///
    /// Fails if the call fails.
    pub async fn list_subscriptions(&self) -> Result<Vec<Subscription>, ClientError> {
        self.fetch(commands::SUBSCRIPTION_LIST, Vec::new()).await
    }

    /// # Errors
    ///
    /// Fails if the call fails.
    pub async fn list_subscriptions_by_username(
        &self,
        username: &str,
    ) -> Result<Vec<Subscription>, ClientError> {
        self.fetch(
            commands::SUBSCRIPTION_LIST_BY_USERNAME,
            codec::encode_text(username),
        )
        .await
    }

    /// # Errors
    ///
    /// Fails if the call fails.
    pub async fn list_subscriptions_by_plan_id(
        &self,
        plan_id: i64,
    ) -> Result<Vec<Subscription>, ClientError> {
        self.fetch(
            commands::SUBSCRIPTION_LIST_BY_PLAN_ID,
            codec::encode_id(plan_id),
        )
        .await
    }

    /// # Errors
    ///
    /// Fails if the call fails.
    pub async fn list_subscriptions_by_customer_id(
        &self,
        customer_id: i64,
    ) -> Result<Vec<Subscription>, ClientError> {
        self.fetch(
            commands::SUBSCRIPTION_LIST_BY_CUSTOMER_ID,
            codec::encode_id(customer_id),
        )
        .await
    }

    // ---------------------------------------------------------------------------
    // Seats
    // ---------------------------------------------------------------------------

    /// Grants `user.username` a seat under `user.subscription_id`.
    ///
    /// # Errors
    ///
    /// Fails if the subscription does not exist or the seat cannot be added.
    pub async fn add_subscription_user(&self, user: &SubscriptionUser) -> Result<(), ClientError> {
        self.send(commands::SUBSCRIPTION_USER_ADD, user).await
    }

    /// # Errors
    ///
    /// Fails if the seat cannot be removed.
    pub async fn remove_subscription_user(
        &self,
        user: &SubscriptionUser,
    ) -> Result<(), ClientError> {
        self.send(commands::SUBSCRIPTION_USER_REMOVE, user).await
    }

    /// Usernames holding a seat under `subscription_id`.
    ///
    /// # Errors
    ///
    /// Fails if the call fails.
    pub async fn list_subscription_usernames(
        &self,
        subscription_id: i64,
    ) -> Result<Vec<String>, ClientError> {
        self.fetch(
            commands::SUBSCRIPTION_USER_LIST,
            codec::encode_id(subscription_id),
        )
        .await
    }

    /// # Errors
    ///
    /// Fails if the call fails.
    pub async fn count_subscription_users(&self, subscription_id: i64) -> Result<i64, ClientError> {
        self.fetch(
            commands::SUBSCRIPTION_USER_COUNT,
            codec::encode_id(subscription_id),
        )
        .await
    }

    // ---------------------------------------------------------------------------
    // Provider operations
    // ---------------------------------------------------------------------------

    /// Asks the server to resynchronize with the payment processor.
    ///
    /// # Errors
    ///
    /// Fails with the server's error text if synchronization fails.
    pub async fn sync(&self) -> Result<(), ClientError> {
        self.call(commands::SYNC, Vec::new()).await?;
        Ok(())
    }

    /// Creates a hosted checkout session and returns its URL.
    ///
    /// # Errors
    ///
    /// Fails with the server's error text if the session cannot be created.
    pub async fn checkout(&self, request: &CheckoutRequest) -> Result<String, ClientError> {
        self.fetch(commands::CHECKOUT, codec::encode(request)?).await
    }
}
