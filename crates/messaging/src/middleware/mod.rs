//! Composable wrappers around handlers.
//!
//! Ordering is the caller's responsibility. In particular [`SwallowErrors`]
//! hides failures from everything it wraps, so it belongs at the outermost
//! position, outside [`AckOnResult`] and anything else that reacts to errors.

mod ack;
mod content_type;
mod logging;
mod recover;
mod swallow;

pub use ack::AckOnResult;
pub use content_type::DefaultContentType;
pub use logging::Logging;
pub use recover::{PanicInfo, Recover, RecoverPolicy};
pub use swallow::SwallowErrors;

use crate::handler::BoxHandler;

use std::fmt;
use std::sync::Arc;

/// Transforms a handler into another handler.
pub trait Middleware: Send + Sync + 'static {
    /// Wraps `next`, returning the composed handler.
    fn layer(&self, next: BoxHandler) -> BoxHandler;
}

impl<F> Middleware for F
where
    F: Fn(BoxHandler) -> BoxHandler + Send + Sync + 'static,
{
    fn layer(&self, next: BoxHandler) -> BoxHandler {
        self(next)
    }
}

/// Composes `middlewares` around `terminal`.
///
/// The result is `middlewares[0](middlewares[1](...(terminal)))`: the first
/// middleware is outermost, so it runs first on the way in and last on the way
/// out.
#[must_use]
pub fn chain(terminal: BoxHandler, middlewares: &[Arc<dyn Middleware>]) -> BoxHandler {
    middlewares
        .iter()
        .rev()
        .fold(terminal, |next, middleware| middleware.layer(next))
}

/// Builder collecting middlewares in outermost-first order.
#[derive(Clone, Default)]
pub struct Chain {
    middlewares: Vec<Arc<dyn Middleware>>,
}

impl Chain {
    /// Creates an empty chain.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a middleware inside the ones already added.
    #[must_use]
    pub fn with<M>(mut self, middleware: M) -> Self
    where
        M: Middleware,
    {
        self.middlewares.push(Arc::new(middleware));
        self
    }

    /// Composes the chain around `terminal`.
    #[must_use]
    pub fn handler(&self, terminal: BoxHandler) -> BoxHandler {
        chain(terminal, &self.middlewares)
    }
}

impl fmt::Debug for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chain")
            .field("len", &self.middlewares.len())
            .finish()
    }
}
