//! Command serving: registry, dispatch pipeline and queue-group binding.
//!
//! 1. **Handlers** (`handlers`): one descriptor per command subject
//! 2. **Registry** (`registry`): subject to handler table, built once
//! 3. **Middleware** (`middleware`): Tower layers (load-shedding, metrics)
//! 4. **Dispatch** (`dispatcher`): pipeline call plus envelope reply
//! 5. **Subscriber** (`subscriber`): queue-group listeners per subject
//! 6. **Background workers** (`worker`): queued tasks with a periodic tick

pub mod config;
pub mod dispatcher;
pub mod handlers;
pub mod middleware;
pub mod operation;
pub mod registry;
pub mod router;
pub mod subscriber;
pub mod worker;

pub use config::ServerConfig;
pub use dispatcher::RpcDispatcher;
pub use handlers::build_registry;
pub use operation::{OperationError, OperationRequest, OperationResponse};
pub use registry::{OperationDescriptor, OperationRegistry, RegistryError};
pub use router::OperationRouter;
pub use subscriber::{BindError, QueueGroupSubscriber};
pub use worker::{BackgroundRunnable, BackgroundWorker, WorkerHandle};
