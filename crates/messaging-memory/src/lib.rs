//! In-memory implementation of the messaging collaborators: a pub/sub
//! transport and durable-style streams with pull consumers.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Pull consumers over in-memory streams.
pub mod consumer;

/// Append-only in-memory message logs.
pub mod stream;

/// In-process pub/sub with wildcard subscriptions and request/reply.
pub mod transport;

pub use consumer::{ConsumerInfo, MemoryConsumer, MemoryConsumerOptions};
pub use stream::{MemoryStream, MemoryStreamOptions};
pub use transport::{MemoryTransport, MemoryTransportOptions};
