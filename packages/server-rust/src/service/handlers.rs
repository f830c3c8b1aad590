//! Handler table: one [`OperationDescriptor`] per command subject.
//!
//! Every handler follows the same shape: decode the request payload, call the
//! provider, encode the result. Payloads that fail to decode are rejected with
//! [`OperationError::BadRequest`] before the provider is reached.

use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;
use cent_core::codec::{self, CodecError};
use cent_core::subject::commands;
use cent_core::types::{CheckoutRequest, Customer, Plan, Price, SubscriptionUser};
use serde::Serialize;
use tracing::debug;

use super::operation::{Handler, HandlerFuture, OperationError, OperationResponse};
use super::registry::{OperationDescriptor, OperationRegistry, RegistryError};
use crate::provider::{DomainProvider, ProviderError};

type Provider = Arc<dyn DomainProvider>;

// ---------------------------------------------------------------------------
// Decoders and encoders
// ---------------------------------------------------------------------------

/// For subjects that take no input; the payload is ignored.
#[allow(clippy::unnecessary_wraps)]
fn no_input(_payload: &[u8]) -> Result<(), CodecError> {
    Ok(())
}

fn entity<T: serde::de::DeserializeOwned>(payload: &[u8]) -> Result<T, CodecError> {
    codec::decode(payload)
}

#[allow(clippy::unnecessary_wraps, clippy::needless_pass_by_value)]
fn reply_empty<T>(_value: T) -> Result<Option<Vec<u8>>, CodecError> {
    Ok(None)
}

#[allow(clippy::needless_pass_by_value)]
fn reply_encoded<T: Serialize>(value: T) -> Result<Option<Vec<u8>>, CodecError> {
    codec::encode(&value).map(Some)
}

// ---------------------------------------------------------------------------
// describe
// ---------------------------------------------------------------------------

/// Builds the descriptor for `subject` from its decode, call, and encode steps.
fn describe<Req, Res, D, C, Fut, E>(
    subject: &'static str,
    provider: &Provider,
    decode: D,
    call: C,
    encode: E,
) -> OperationDescriptor
where
    Req: Send + 'static,
    Res: Send + 'static,
    D: Fn(&[u8]) -> Result<Req, CodecError> + Send + Sync + 'static,
    C: Fn(Provider, Req) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Res, ProviderError>> + Send + 'static,
    E: Fn(Res) -> Result<Option<Vec<u8>>, CodecError> + Send + Sync + 'static,
{
    let provider = Arc::clone(provider);
    let call = Arc::new(call);
    let encode = Arc::new(encode);

    let handler: Handler = Arc::new(move |payload: Bytes| -> HandlerFuture {
        let request = decode(&payload[..]);
        let provider = Arc::clone(&provider);
        let call = Arc::clone(&call);
        let encode = Arc::clone(&encode);
        Box::pin(async move {
            let request = request.map_err(|e| {
                debug!(subject = subject, error = %e, "rejecting undecodable request");
                OperationError::BadRequest
            })?;
            let result = call(provider, request).await?;
            Ok(OperationResponse {
                data: encode(result)?,
            })
        })
    });

    OperationDescriptor { subject, handler }
}

// ---------------------------------------------------------------------------
// Table
// ---------------------------------------------------------------------------

/// Descriptors for every command subject, in subject-table order.
#[must_use]
#[allow(clippy::too_many_lines)]
pub fn descriptors(provider: &Provider) -> Vec<OperationDescriptor> {
    let p = provider;
    vec![
        // Customers
        describe(
            commands::CUSTOMER_ADD,
            p,
            entity::<Customer>,
            |p, c| async move { p.add_customer(c).await },
            reply_empty,
        ),
        describe(
            commands::CUSTOMER_UPDATE,
            p,
            entity::<Customer>,
            |p, c| async move { p.update_customer(c).await },
            reply_encoded,
        ),
        describe(
            commands::CUSTOMER_GET_BY_ID,
            p,
            codec::decode_id,
            |p, id| async move { p.get_customer_by_id(id).await },
            reply_encoded,
        ),
        describe(
            commands::CUSTOMER_GET_BY_PROVIDER_ID,
            p,
            codec::decode_text,
            |p, pid| async move { p.get_customer_by_provider_id(pid).await },
            reply_encoded,
        ),
        describe(
            commands::CUSTOMER_GET_BY_EMAIL,
            p,
            codec::decode_text,
            |p, email| async move { p.get_customer_by_email(email).await },
            reply_encoded,
        ),
        describe(
            commands::CUSTOMER_LIST,
            p,
            no_input,
            |p, ()| async move { p.list_customers().await },
            reply_encoded,
        ),
        describe(
            commands::CUSTOMER_REMOVE_BY_PROVIDER_ID,
            p,
            codec::decode_text,
            |p, pid| async move { p.remove_customer_by_provider_id(pid).await },
            reply_empty,
        ),
        // Plans
        describe(
            commands::PLAN_ADD,
            p,
            entity::<Plan>,
            |p, plan| async move { p.add_plan(plan).await },
            reply_empty,
        ),
        describe(
            commands::PLAN_UPDATE,
            p,
            entity::<Plan>,
            |p, plan| async move { p.update_plan(plan).await },
            reply_encoded,
        ),
        describe(
            commands::PLAN_GET_BY_ID,
            p,
            codec::decode_id,
            |p, id| async move { p.get_plan_by_id(id).await },
            reply_encoded,
        ),
        describe(
            commands::PLAN_GET_BY_PROVIDER_ID,
            p,
            codec::decode_text,
            |p, pid| async move { p.get_plan_by_provider_id(pid).await },
            reply_encoded,
        ),
        describe(
            commands::PLAN_GET_BY_NAME,
            p,
            codec::decode_text,
            |p, name| async move { p.get_plan_by_name(name).await },
            reply_encoded,
        ),
        describe(
            commands::PLAN_GET_BY_PRICE_ID,
            p,
            codec::decode_id,
            |p, id| async move { p.get_plan_by_price_id(id).await },
            reply_encoded,
        ),
        describe(
            commands::PLAN_GET_BY_SUBSCRIPTION_ID,
            p,
            codec::decode_id,
            |p, id| async move { p.get_plan_by_subscription_id(id).await },
            reply_encoded,
        ),
        describe(
            commands::PLAN_LIST,
            p,
            no_input,
            |p, ()| async move { p.list_plans().await },
            reply_encoded,
        ),
        describe(
            commands::PLAN_LIST_ACTIVE,
            p,
            no_input,
            |p, ()| async move { p.list_active_plans().await },
            reply_encoded,
        ),
        describe(
            commands::PLAN_LIST_BY_USERNAME,
            p,
            codec::decode_text,
            |p, username| async move { p.list_plans_by_username(username).await },
            reply_encoded,
        ),
        describe(
            commands::PLAN_REMOVE_BY_PROVIDER_ID,
            p,
            codec::decode_text,
            |p, pid| async move { p.remove_plan_by_provider_id(pid).await },
            reply_empty,
        ),
        // Prices
        describe(
            commands::PRICE_ADD,
            p,
            entity::<Price>,
            |p, price| async move { p.add_price(price).await },
            reply_empty,
        ),
        describe(
            commands::PRICE_GET_BY_ID,
            p,
            codec::decode_id,
            |p, id| async move { p.get_price_by_id(id).await },
            reply_encoded,
        ),
        describe(
            commands::PRICE_GET_BY_PROVIDER_ID,
            p,
            codec::decode_text,
            |p, pid| async move { p.get_price_by_provider_id(pid).await },
            reply_encoded,
        ),
        describe(
            commands::PRICE_LIST,
            p,
            no_input,
            |p, ()| async move { p.list_prices().await },
            reply_encoded,
        ),
        describe(
            commands::PRICE_LIST_BY_PLAN_ID,
            p,
            codec::decode_id,
            |p, id| async move { p.list_prices_by_plan_id(id).await },
            reply_encoded,
        ),
        // Subscriptions
        describe(
            commands::SUBSCRIPTION_GET_BY_ID,
            p,
            codec::decode_id,
            |p, id| async move { p.get_subscription_by_id(id).await },
            reply_encoded,
        ),
        describe(
            commands::SUBSCRIPTION_GET_BY_PROVIDER_ID,
            p,
            codec::decode_text,
            |p, pid| async move { p.get_subscription_by_provider_id(pid).await },
            reply_encoded,
        ),
        describe(
            commands::SUBSCRIPTION_LIST,
            p,
            no_input,
            |p, ()| async move { p.list_subscriptions().await },
            reply_encoded,
        ),
        describe(
            commands::SUBSCRIPTION_LIST_BY_USERNAME,
            p,
            codec::decode_text,
            |p, username| async move { p.list_subscriptions_by_username(username).await },
            reply_encoded,
        ),
        describe(
            commands::SUBSCRIPTION_LIST_BY_PLAN_ID,
            p,
            codec::decode_id,
            |p, id| async move { p.list_subscriptions_by_plan_id(id).await },
            reply_encoded,
        ),
        describe(
            commands::SUBSCRIPTION_LIST_BY_CUSTOMER_ID,
            p,
            codec::decode_id,
            |p, id| async move { p.list_subscriptions_by_customer_id(id).await },
            reply_encoded,
        ),
        // Seats
        describe(
            commands::SUBSCRIPTION_USER_ADD,
            p,
            entity::<SubscriptionUser>,
            |p, user| async move { p.add_subscription_user(user).await },
            reply_empty,
        ),
        describe(
            commands::SUBSCRIPTION_USER_REMOVE,
            p,
            entity::<SubscriptionUser>,
            |p, user| async move { p.remove_subscription_user(user).await },
            reply_empty,
        ),
        describe(
            commands::SUBSCRIPTION_USER_LIST,
            p,
            codec::decode_id,
            |p, id| async move { p.list_subscription_usernames(id).await },
            reply_encoded,
        ),
        describe(
            commands::SUBSCRIPTION_USER_COUNT,
            p,
            codec::decode_id,
            |p, id| async move { p.count_subscription_users(id).await },
            reply_encoded,
        ),
        // Payment processor
        describe(
            commands::SYNC,
            p,
            no_input,
            |p, ()| async move { p.sync().await },
            reply_empty,
        ),
        describe(
            commands::CHECKOUT,
            p,
            entity::<CheckoutRequest>,
            |p, request| async move { p.checkout(request).await },
            reply_encoded,
        ),
    ]
}

/// Builds the registry serving every command subject with `provider`.
///
/// # Errors
///
/// Returns [`RegistryError::DuplicateSubject`] if the handler table maps a
/// subject twice.
pub fn build_registry(provider: &Provider) -> Result<OperationRegistry, RegistryError> {
    let mut registry = OperationRegistry::new();
    registry.register_all(descriptors(provider))?;
    Ok(registry)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
