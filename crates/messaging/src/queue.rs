use crate::error::{BoxError, Error, Result};
use crate::message::Message;

use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::stream::{self, BoxStream, Stream, StreamExt};

/// Per-message callback registered with [`QueueConsumer::consume`].
///
/// The pull loop awaits the returned future before delivering the next
/// message, so a callback that waits applies backpressure to the loop.
pub type MessageCallback = Arc<dyn Fn(Message) -> BoxFuture<'static, ()> + Send + Sync>;

/// Control over a running pull loop.
#[async_trait]
pub trait ConsumeHandle: fmt::Debug + Send + Sync {
    /// Asks the loop to stop delivering. Messages already handed to the
    /// callback are not affected.
    fn stop(&self);

    /// Resolves once the loop has exited and will invoke the callback no more,
    /// immediately if it already has.
    async fn stopped(&self);
}

/// A durable-queue pull consumer.
#[async_trait]
pub trait QueueConsumer: fmt::Debug + Send + Sync + 'static {
    /// Name of the consumer, for diagnostics.
    fn name(&self) -> &str;

    /// Pulls up to `max` messages that are available now.
    async fn fetch(&self, max: usize) -> Result<Batch, BoxError>;

    /// Starts a pull loop delivering every message to `callback`.
    async fn consume(&self, callback: MessageCallback)
    -> Result<Box<dyn ConsumeHandle>, BoxError>;
}

/// Messages returned by a single fetch, read in delivery order.
pub struct Batch {
    messages: BoxStream<'static, Result<Message, BoxError>>,
}

impl Batch {
    /// Wraps a stream of fetched messages.
    pub fn new<S>(messages: S) -> Self
    where
        S: Stream<Item = Result<Message, BoxError>> + Send + 'static,
    {
        Self {
            messages: messages.boxed(),
        }
    }

    /// A batch over already materialized messages.
    #[must_use]
    pub fn from_messages(messages: Vec<Message>) -> Self {
        Self::new(stream::iter(messages.into_iter().map(Ok)))
    }

    /// The next message, or `Ok(None)` once the batch is exhausted.
    ///
    /// # Errors
    ///
    /// Returns the queue's failure as `Error::Transport`.
    pub async fn next_message(&mut self) -> Result<Option<Message>> {
        match self.messages.next().await {
            Some(Ok(message)) => Ok(Some(message)),
            Some(Err(e)) => Err(Error::Transport(e)),
            None => Ok(None),
        }
    }
}

impl Stream for Batch {
    type Item = Result<Message, BoxError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.messages.poll_next_unpin(cx)
    }
}

impl fmt::Debug for Batch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Batch").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use http::HeaderMap;

    #[tokio::test]
    async fn test_batch_ends_with_none() {
        let mut batch = Batch::from_messages(vec![
            Message::new("a", HeaderMap::new(), "1"),
            Message::new("a", HeaderMap::new(), "2"),
        ]);

        assert_eq!(batch.next_message().await.unwrap().unwrap().payload(), "1");
        assert_eq!(batch.next_message().await.unwrap().unwrap().payload(), "2");
        assert!(batch.next_message().await.unwrap().is_none());
        assert!(batch.next_message().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_batch_surfaces_queue_errors() {
        let failure: BoxError = "consumer deleted".into();
        let mut batch = Batch::new(stream::iter(vec![Err(failure)]));

        match batch.next_message().await {
            Err(Error::Transport(e)) => assert_eq!(e.to_string(), "consumer deleted"),
            other => panic!("expected Transport, got {other:?}"),
        }
    }
}
