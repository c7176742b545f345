//! Message dispatch and middleware pipeline for pub/sub transports and
//! durable queues.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Codecs and content type negotiation.
pub mod codec;

/// Consumer dispatch and consume sessions.
pub mod dispatch;

mod error;

/// The handler contract.
pub mod handler;

/// Messages and their capabilities.
pub mod message;

/// Composable handler wrappers.
pub mod middleware;

/// Durable-queue consumer interface.
pub mod queue;

/// Subject-pattern routing.
pub mod router;

/// Wait-for-state primitive.
pub mod state;

/// Subject patterns and matching.
pub mod subject;

/// Pub/sub transport interface.
pub mod transport;

/// Typed payload wrappers.
pub mod typed;

pub use codec::{Codec, CodecRegistry, SharedCodec};
pub use dispatch::{ConsumeOptions, ConsumeSession, consume, serve};
pub use error::{BoxError, Error, Result};
pub use handler::{BoxHandler, Handler, handler_fn};
pub use message::Message;
pub use middleware::{Chain, Middleware, chain};
pub use router::{Route, Router};
pub use typed::{TypedMessage, TypedPublisher};
