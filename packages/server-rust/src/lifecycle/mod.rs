//! Server startup, serving and graceful shutdown.

pub mod server;
pub mod shutdown;

pub use server::CentServer;
pub use shutdown::{HealthState, InFlightGuard, ShutdownController};
