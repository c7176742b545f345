use crate::codec::{Codec, CodecRegistry, SharedCodec};
use crate::error::{Error, Result};
use crate::message::Message;
use crate::transport::Publisher;

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use http::header::CONTENT_TYPE;
use http::{HeaderMap, HeaderValue};
use serde::Serialize;
use serde::de::DeserializeOwned;

/// A message together with its payload, decoded once at construction.
#[derive(Clone, Debug)]
pub struct TypedMessage<T> {
    codec: SharedCodec,
    message: Message,
    payload: T,
}

impl<T> TypedMessage<T>
where
    T: DeserializeOwned,
{
    /// Decodes the payload of `message` with `codec`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Decode` if the payload is not a valid `T` for the codec.
    pub fn new(codec: SharedCodec, message: Message) -> Result<Self> {
        let payload = codec.decode(message.payload()).map_err(Error::Decode)?;

        Ok(Self {
            codec,
            message,
            payload,
        })
    }

    /// Decodes the payload of `message` with the codec its content type selects.
    ///
    /// # Errors
    ///
    /// Returns `Error::UnsupportedContentType` or `Error::Decode`.
    pub fn negotiate(registry: &CodecRegistry, message: Message) -> Result<Self> {
        let codec = registry.choose(message.headers())?;
        Self::new(codec, message)
    }
}

impl<T> TypedMessage<T> {
    /// The decoded payload.
    #[must_use]
    pub const fn payload(&self) -> &T {
        &self.payload
    }

    /// The underlying message.
    #[must_use]
    pub const fn message(&self) -> &Message {
        &self.message
    }

    /// The codec the payload was decoded with.
    #[must_use]
    pub fn codec(&self) -> &dyn Codec {
        self.codec.as_ref()
    }

    /// Splits into the message and the decoded payload.
    pub fn into_parts(self) -> (Message, T) {
        (self.message, self.payload)
    }

    /// Replies with `reply` encoded by the codec this message was decoded with.
    ///
    /// # Errors
    ///
    /// Returns `Error::Encode`, `Error::UnsupportedContentType` if the codec's
    /// tag is not a valid header value, `Error::NotSupported` if the message
    /// cannot be responded to, or the transport's failure.
    pub async fn respond<R>(&self, mut headers: HeaderMap, reply: &R) -> Result<()>
    where
        R: Serialize + ?Sized + Sync,
    {
        let payload = self.codec.encode(reply).map_err(Error::Encode)?;
        headers.insert(CONTENT_TYPE, self.codec.content_type_header()?);

        self.message.respond(headers, payload).await
    }
}

/// Publishes values of `T`, encoded with the codec the outbound headers select.
pub struct TypedPublisher<T: ?Sized> {
    publisher: Arc<dyn Publisher>,
    registry: Arc<CodecRegistry>,
    _marker: PhantomData<fn(&T)>,
}

impl<T> TypedPublisher<T>
where
    T: Serialize + ?Sized,
{
    /// Creates a publisher over `publisher`, negotiating codecs with `registry`.
    pub fn new(publisher: Arc<dyn Publisher>, registry: Arc<CodecRegistry>) -> Self {
        Self {
            publisher,
            registry,
            _marker: PhantomData,
        }
    }

    /// Encodes and publishes `value`.
    ///
    /// Without a `Content-Type` in `headers` the registry's default codec is used
    /// and its content type is added to the outbound headers.
    ///
    /// # Errors
    ///
    /// Returns `Error::UnsupportedContentType`, `Error::Encode`, or the
    /// publisher's failure as `Error::Transport`.
    pub async fn publish(&self, subject: &str, mut headers: HeaderMap, value: &T) -> Result<()> {
        let codec = self.registry.choose(&headers)?;
        let payload = codec.encode(value).map_err(Error::Encode)?;

        if headers.get(CONTENT_TYPE).is_none_or(HeaderValue::is_empty) {
            headers.insert(CONTENT_TYPE, codec.content_type_header()?);
        }

        self.publisher
            .publish(subject, headers, payload)
            .await
            .map_err(Error::Transport)
    }
}

impl<T: ?Sized> Clone for TypedPublisher<T> {
    fn clone(&self) -> Self {
        Self {
            publisher: self.publisher.clone(),
            registry: self.registry.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T: ?Sized> fmt::Debug for TypedPublisher<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypedPublisher")
            .field("publisher", &self.publisher)
            .field("registry", &self.registry)
            .finish()
    }
}
