//! Provider lifecycle events published on event subjects.

pub mod forwarder;
pub mod publisher;

pub use forwarder::{EventForwarder, EventMapping, ForwarderStats, PublishTask};
#[cfg(feature = "nats")]
pub use publisher::JetStreamPublisher;
pub use publisher::{EventPublisher, PublishError, TransportPublisher};
