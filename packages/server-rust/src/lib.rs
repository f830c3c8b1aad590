//! cent gateway server: serves billing commands over a message bus and
//! forwards provider lifecycle events.

pub mod events;
pub mod lifecycle;
pub mod provider;
pub mod service;

pub use events::{EventForwarder, EventPublisher, TransportPublisher};
pub use lifecycle::{CentServer, HealthState, ShutdownController};
pub use provider::{DomainEvent, DomainProvider, EventKind, MemoryProvider, ProviderError};
pub use service::ServerConfig;
