use crate::error::BoxError;
use crate::message::Message;

use std::fmt::Debug;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use http::HeaderMap;

/// Stream of messages delivered to a subscription. Ends when the subscription
/// is closed by the transport.
pub type Subscription = BoxStream<'static, Message>;

/// The publish half of a pub/sub transport.
#[async_trait]
pub trait Publisher: Debug + Send + Sync + 'static {
    /// Publishes `payload` on `subject`.
    async fn publish(
        &self,
        subject: &str,
        headers: HeaderMap,
        payload: Bytes,
    ) -> Result<(), BoxError>;
}

/// A pub/sub transport with subscriptions and request/reply.
///
/// Connection management, reconnects and retries belong to implementations.
#[async_trait]
pub trait Transport: Publisher {
    /// Subscribes to a subject or wildcard pattern.
    async fn subscribe(&self, subject: &str) -> Result<Subscription, BoxError>;

    /// Publishes a request and waits for the first reply.
    async fn request(
        &self,
        subject: &str,
        headers: HeaderMap,
        payload: Bytes,
    ) -> Result<Message, BoxError>;
}
