//! Subject table shared by the server and the client stub.
//!
//! Subjects are the only addressing mechanism on the bus. They are split
//! into two disjoint namespaces:
//!
//! - [`commands`]: request/reply subjects served through a queue group
//! - [`events`]: one-way publish subjects, fanned out to every subscriber
//!
//! All subjects share the [`PREFIX`] namespace and follow the
//! `cent.<entity>.<verb>[.<qualifier>]` shape.

/// Namespace shared by every subject.
pub const PREFIX: &str = "cent";

/// Request/reply subjects. Each one maps to exactly one server handler.
pub mod commands {
    pub const CUSTOMER_ADD: &str = "cent.customer.add";
    pub const CUSTOMER_UPDATE: &str = "cent.customer.update";
    pub const CUSTOMER_GET_BY_ID: &str = "cent.customer.get.id";
    pub const CUSTOMER_GET_BY_PROVIDER_ID: &str = "cent.customer.get.provider_id";
    pub const CUSTOMER_GET_BY_EMAIL: &str = "cent.customer.get.email";
    pub const CUSTOMER_LIST: &str = "cent.customer.list";
    pub const CUSTOMER_REMOVE_BY_PROVIDER_ID: &str = "cent.customer.remove.provider_id";

    pub const PLAN_ADD: &str = "cent.plan.add";
    pub const PLAN_UPDATE: &str = "cent.plan.update";
    pub const PLAN_GET_BY_ID: &str = "cent.plan.get.id";
    pub const PLAN_GET_BY_PROVIDER_ID: &str = "cent.plan.get.provider_id";
    pub const PLAN_GET_BY_NAME: &str = "cent.plan.get.name";
    pub const PLAN_GET_BY_PRICE_ID: &str = "cent.plan.get.price_id";
    pub const PLAN_GET_BY_SUBSCRIPTION_ID: &str = "cent.plan.get.subscription_id";
    pub const PLAN_LIST: &str = "cent.plan.list";
    pub const PLAN_LIST_ACTIVE: &str = "cent.plan.list.active";
    pub const PLAN_LIST_BY_USERNAME: &str = "cent.plan.list.username";
    pub const PLAN_REMOVE_BY_PROVIDER_ID: &str = "cent.plan.remove.provider_id";

    pub const PRICE_ADD: &str = "cent.price.add";
    pub const PRICE_GET_BY_ID: &str = "cent.price.get.id";
    pub const PRICE_GET_BY_PROVIDER_ID: &str = "cent.price.get.provider_id";
    pub const PRICE_LIST: &str = "cent.price.list";
    pub const PRICE_LIST_BY_PLAN_ID: &str = "cent.price.list.plan_id";

    pub const SUBSCRIPTION_GET_BY_ID: &str = "cent.subscription.get.id";
    pub const SUBSCRIPTION_GET_BY_PROVIDER_ID: &str = "cent.subscription.get.provider_id";
    pub const SUBSCRIPTION_LIST: &str = "cent.subscription.list";
    pub const SUBSCRIPTION_LIST_BY_USERNAME: &str = "cent.subscription.list.username";
    pub const SUBSCRIPTION_LIST_BY_PLAN_ID: &str = "cent.subscription.list.plan_id";
    pub const SUBSCRIPTION_LIST_BY_CUSTOMER_ID: &str = "cent.subscription.list.customer_id";

    pub const SUBSCRIPTION_USER_ADD: &str = "cent.subscription.user.add";
    pub const SUBSCRIPTION_USER_REMOVE: &str = "cent.subscription.user.remove";
    pub const SUBSCRIPTION_USER_LIST: &str = "cent.subscription.user.list";
    pub const SUBSCRIPTION_USER_COUNT: &str = "cent.subscription.user.count";

    pub const SYNC: &str = "cent.sync";
    pub const CHECKOUT: &str = "cent.checkout";

    /// Every command subject, in registration order.
    pub const ALL: &[&str] = &[
        CUSTOMER_ADD,
        CUSTOMER_UPDATE,
        CUSTOMER_GET_BY_ID,
        CUSTOMER_GET_BY_PROVIDER_ID,
        CUSTOMER_GET_BY_EMAIL,
        CUSTOMER_LIST,
        CUSTOMER_REMOVE_BY_PROVIDER_ID,
        PLAN_ADD,
        PLAN_UPDATE,
        PLAN_GET_BY_ID,
        PLAN_GET_BY_PROVIDER_ID,
        PLAN_GET_BY_NAME,
        PLAN_GET_BY_PRICE_ID,
        PLAN_GET_BY_SUBSCRIPTION_ID,
        PLAN_LIST,
        PLAN_LIST_ACTIVE,
        PLAN_LIST_BY_USERNAME,
        PLAN_REMOVE_BY_PROVIDER_ID,
        PRICE_ADD,
        PRICE_GET_BY_ID,
        PRICE_GET_BY_PROVIDER_ID,
        PRICE_LIST,
        PRICE_LIST_BY_PLAN_ID,
        SUBSCRIPTION_GET_BY_ID,
        SUBSCRIPTION_GET_BY_PROVIDER_ID,
        SUBSCRIPTION_LIST,
        SUBSCRIPTION_LIST_BY_USERNAME,
        SUBSCRIPTION_LIST_BY_PLAN_ID,
        SUBSCRIPTION_LIST_BY_CUSTOMER_ID,
        SUBSCRIPTION_USER_ADD,
        SUBSCRIPTION_USER_REMOVE,
        SUBSCRIPTION_USER_LIST,
        SUBSCRIPTION_USER_COUNT,
        SYNC,
        CHECKOUT,
    ];
}

/// One-way event subjects. Payloads are bare encoded entities, no envelope.
pub mod events {
    pub const CUSTOMER_ADDED: &str = "cent.customer.added";
    pub const CUSTOMER_REMOVED: &str = "cent.customer.removed";
    pub const CUSTOMER_UPDATED: &str = "cent.customer.updated";

    pub const PLAN_ADDED: &str = "cent.plan.added";
    pub const PLAN_REMOVED: &str = "cent.plan.removed";
    pub const PLAN_UPDATED: &str = "cent.plan.updated";

    pub const PRICE_ADDED: &str = "cent.price.added";
    pub const PRICE_REMOVED: &str = "cent.price.removed";
    pub const PRICE_UPDATED: &str = "cent.price.updated";

    pub const SUBSCRIPTION_ADDED: &str = "cent.subscription.added";
    pub const SUBSCRIPTION_REMOVED: &str = "cent.subscription.removed";
    pub const SUBSCRIPTION_UPDATED: &str = "cent.subscription.updated";
    pub const SUBSCRIPTION_ACTIVATED: &str = "cent.subscription.activated";
    pub const SUBSCRIPTION_DEACTIVATED: &str = "cent.subscription.deactivated";

    pub const SUBSCRIPTION_USER_ADDED: &str = "cent.subscription.user.added";
    pub const SUBSCRIPTION_USER_REMOVED: &str = "cent.subscription.user.removed";

    pub const ALL: &[&str] = &[
        CUSTOMER_ADDED,
        CUSTOMER_REMOVED,
        CUSTOMER_UPDATED,
        PLAN_ADDED,
        PLAN_REMOVED,
        PLAN_UPDATED,
        PRICE_ADDED,
        PRICE_REMOVED,
        PRICE_UPDATED,
        SUBSCRIPTION_ADDED,
        SUBSCRIPTION_REMOVED,
        SUBSCRIPTION_UPDATED,
        SUBSCRIPTION_ACTIVATED,
        SUBSCRIPTION_DEACTIVATED,
        SUBSCRIPTION_USER_ADDED,
        SUBSCRIPTION_USER_REMOVED,
    ];
}

/// Returns `true` if `subject` is a registered request/reply subject.
#[must_use]
pub fn is_command(subject: &str) -> bool {
    commands::ALL.contains(&subject)
}

/// Returns `true` if `subject` is a one-way event subject.
#[must_use]
pub fn is_event(subject: &str) -> bool {
    events::ALL.contains(&subject)
}
