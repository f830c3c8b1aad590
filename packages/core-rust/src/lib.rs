//! cent core: subject table, payload and envelope codecs, billing entities,
//! the publish/subscribe transport abstraction, and the typed client stub.

pub mod client;
pub mod codec;
pub mod envelope;
pub mod subject;
pub mod transport;
pub mod types;

pub use client::{Client, ClientError};
pub use codec::CodecError;
pub use envelope::{Envelope, EnvelopeError};
pub use transport::{InMemoryTransport, Message, Subscription, Transport, TransportError};
