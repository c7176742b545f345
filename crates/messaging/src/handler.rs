use crate::error::Result;
use crate::message::Message;

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// Processes one inbound message.
///
/// `cancel` is scoped to the message: it fires when the enclosing session is
/// cancelled, and handlers doing long work should watch it.
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    /// Handles the message.
    async fn handle(&self, cancel: CancellationToken, message: Message) -> Result<()>;
}

/// A shareable, type-erased handler.
pub type BoxHandler = Arc<dyn Handler>;

/// Adapts an async closure into a [`Handler`].
pub struct HandlerFn<F> {
    f: F,
}

impl<F> fmt::Debug for HandlerFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerFn").finish_non_exhaustive()
    }
}

#[async_trait]
impl<F, Fut> Handler for HandlerFn<F>
where
    F: Fn(CancellationToken, Message) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    async fn handle(&self, cancel: CancellationToken, message: Message) -> Result<()> {
        (self.f)(cancel, message).await
    }
}

/// Wraps an async closure as a [`BoxHandler`].
pub fn handler_fn<F, Fut>(f: F) -> BoxHandler
where
    F: Fn(CancellationToken, Message) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    Arc::new(HandlerFn { f })
}
