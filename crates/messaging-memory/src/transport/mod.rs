mod error;

pub use error::Error;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use http::HeaderMap;
use parking_lot::RwLock;
use proven_messaging::BoxError;
use proven_messaging::Message;
use proven_messaging::message::Responder;
use proven_messaging::subject::{Pattern, validate_subject};
use proven_messaging::transport::{Publisher, Subscription, Transport};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::debug;
use uuid::Uuid;

/// Prefix of the reply subjects created for requests.
pub const INBOX_PREFIX: &str = "_INBOX";

/// Options for the in-memory transport.
#[derive(Clone, Debug)]
pub struct MemoryTransportOptions {
    /// How long [`Transport::request`] waits for a reply.
    pub request_timeout: Duration,
}

impl Default for MemoryTransportOptions {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug)]
struct Subscriber {
    pattern: Pattern,
    sender: mpsc::UnboundedSender<Message>,
}

#[derive(Debug)]
struct Inner {
    options: MemoryTransportOptions,
    subscribers: RwLock<Vec<Subscriber>>,
}

/// An in-process pub/sub transport with wildcard subscriptions and
/// request/reply. Clones share the same subscription table.
#[derive(Clone, Debug)]
pub struct MemoryTransport {
    inner: Arc<Inner>,
}

impl MemoryTransport {
    /// Creates a transport with no subscribers.
    #[must_use]
    pub fn new(options: MemoryTransportOptions) -> Self {
        Self {
            inner: Arc::new(Inner {
                options,
                subscribers: RwLock::new(Vec::new()),
            }),
        }
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner
            .subscribers
            .read()
            .iter()
            .filter(|subscriber| !subscriber.sender.is_closed())
            .count()
    }

    /// Publishes a message whose receivers can respond to `reply`.
    ///
    /// Returns how many subscriptions received it.
    ///
    /// # Errors
    ///
    /// Returns `Error::Subject` if `subject` is not a valid concrete subject.
    pub fn publish_with_reply(
        &self,
        subject: &str,
        reply: Option<&str>,
        headers: HeaderMap,
        payload: Bytes,
    ) -> Result<usize, Error> {
        validate_subject(subject)?;

        let mut message = Message::new(subject, headers, payload);
        if let Some(reply) = reply {
            message = message.with_responder(Responder::new(reply, Arc::new(self.clone())));
        }

        let mut subscribers = self.inner.subscribers.write();
        subscribers.retain(|subscriber| !subscriber.sender.is_closed());

        let delivered = subscribers
            .iter()
            .filter(|subscriber| subscriber.pattern.matches(subject))
            .filter(|subscriber| subscriber.sender.send(message.clone()).is_ok())
            .count();
        drop(subscribers);

        debug!("published {} to {} subscribers", subject, delivered);

        Ok(delivered)
    }

    pub(crate) fn subscribe_pattern(&self, pattern: &str) -> Result<Subscription, Error> {
        let pattern = Pattern::parse(pattern)?;
        let (sender, receiver) = mpsc::unbounded_channel();

        debug!("subscribing to {}", pattern);
        self.inner
            .subscribers
            .write()
            .push(Subscriber { pattern, sender });

        Ok(UnboundedReceiverStream::new(receiver).boxed())
    }

    async fn send_request(
        &self,
        subject: &str,
        headers: HeaderMap,
        payload: Bytes,
    ) -> Result<Message, Error> {
        let inbox = format!("{INBOX_PREFIX}.{}", Uuid::new_v4().simple());
        let mut replies = self.subscribe_pattern(&inbox)?;

        if self.publish_with_reply(subject, Some(&inbox), headers, payload)? == 0 {
            return Err(Error::NoResponders(subject.to_string()));
        }

        match tokio::time::timeout(self.inner.options.request_timeout, replies.next()).await {
            Ok(Some(reply)) => Ok(reply),
            Ok(None) => Err(Error::NoResponders(subject.to_string())),
            Err(_) => Err(Error::Timeout(subject.to_string())),
        }
    }
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new(MemoryTransportOptions::default())
    }
}

#[async_trait]
impl Publisher for MemoryTransport {
    async fn publish(
        &self,
        subject: &str,
        headers: HeaderMap,
        payload: Bytes,
    ) -> Result<(), BoxError> {
        self.publish_with_reply(subject, None, headers, payload)?;

        Ok(())
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn subscribe(&self, subject: &str) -> Result<Subscription, BoxError> {
        Ok(self.subscribe_pattern(subject)?)
    }

    async fn request(
        &self,
        subject: &str,
        headers: HeaderMap,
        payload: Bytes,
    ) -> Result<Message, BoxError> {
        Ok(self.send_request(subject, headers, payload).await?)
    }
}
