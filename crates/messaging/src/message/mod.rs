use crate::error::{BoxError, Error, Result};
use crate::transport::Publisher;

use std::fmt::Debug;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use http::header::CONTENT_TYPE;
use http::{HeaderMap, HeaderName, HeaderValue};

/// Queue-assigned delivery metadata.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Metadata {
    /// Name of the stream the message was stored in.
    pub stream: String,

    /// Name of the consumer that delivered the message.
    pub consumer: String,

    /// Position of the message in the stream.
    pub stream_sequence: u64,

    /// Position of this delivery in the consumer.
    pub consumer_sequence: u64,

    /// Number of times the message has been delivered, including this one.
    pub delivered: u64,

    /// Messages still pending for the consumer after this one.
    pub pending: u64,

    /// When the message was stored.
    pub timestamp: DateTime<Utc>,
}

/// The kinds of acknowledgement a durable queue understands.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AckKind {
    /// Processing succeeded.
    Ack,

    /// Processing failed; redeliver.
    Nak,

    /// Processing failed; never redeliver.
    Term {
        /// Optional reason recorded by the queue.
        reason: Option<String>,
    },

    /// Still working; extend the processing deadline.
    Progress,
}

impl AckKind {
    /// Whether this acknowledgement settles the delivery.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, Self::Progress)
    }
}

/// Queue-side acknowledgement of a single delivery.
#[async_trait]
pub trait Acknowledger: Debug + Send + Sync + 'static {
    /// Sends the acknowledgement to the queue.
    async fn acknowledge(&self, kind: AckKind) -> Result<(), BoxError>;
}

/// Where a reply to a message is sent.
#[derive(Clone, Debug)]
pub struct Responder {
    reply_to: String,
    publisher: Arc<dyn Publisher>,
}

impl Responder {
    /// Creates a responder publishing to `reply_to` through `publisher`.
    pub fn new(reply_to: impl Into<String>, publisher: Arc<dyn Publisher>) -> Self {
        Self {
            reply_to: reply_to.into(),
            publisher,
        }
    }

    /// The reply subject.
    #[must_use]
    pub fn reply_to(&self) -> &str {
        &self.reply_to
    }
}

/// State attached to messages delivered by a durable queue.
#[derive(Clone, Debug)]
pub struct QueueDelivery {
    acknowledged: Arc<AtomicBool>,
    in_progress: Arc<AtomicBool>,
    acknowledger: Arc<dyn Acknowledger>,
    metadata: Metadata,
}

/// The capability set of a message, fixed by where it came from.
#[derive(Clone, Debug)]
pub enum Source {
    /// Plain pub/sub delivery: no metadata, no acknowledgement.
    Core,

    /// Durable queue delivery: metadata and acknowledgement available.
    Queue(QueueDelivery),
}

/// An inbound message as seen by handlers.
///
/// Clones share acknowledgement state, so acknowledging through any clone
/// settles the delivery for all of them.
#[derive(Clone, Debug)]
pub struct Message {
    headers: HeaderMap,
    payload: Bytes,
    responder: Option<Responder>,
    source: Source,
    subject: String,
}

impl Message {
    /// Creates a plain pub/sub message.
    pub fn new(subject: impl Into<String>, headers: HeaderMap, payload: impl Into<Bytes>) -> Self {
        Self {
            headers,
            payload: payload.into(),
            responder: None,
            source: Source::Core,
            subject: subject.into(),
        }
    }

    /// Creates a message delivered by a durable queue.
    pub fn queued(
        subject: impl Into<String>,
        headers: HeaderMap,
        payload: impl Into<Bytes>,
        metadata: Metadata,
        acknowledger: Arc<dyn Acknowledger>,
    ) -> Self {
        Self {
            headers,
            payload: payload.into(),
            responder: None,
            source: Source::Queue(QueueDelivery {
                acknowledged: Arc::new(AtomicBool::new(false)),
                in_progress: Arc::new(AtomicBool::new(false)),
                acknowledger,
                metadata,
            }),
            subject: subject.into(),
        }
    }

    /// Attaches the respond capability.
    #[must_use]
    pub fn with_responder(mut self, responder: Responder) -> Self {
        self.responder = Some(responder);
        self
    }

    /// Returns the message with `name` set to `value`, replacing any existing values.
    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// The subject the message was published on.
    #[must_use]
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// The message headers.
    #[must_use]
    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// The raw body.
    #[must_use]
    pub const fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// The `Content-Type` header, if set and valid UTF-8.
    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        crate::codec::content_type(&self.headers)
    }

    /// The reply subject, if the message can be responded to.
    #[must_use]
    pub fn reply(&self) -> Option<&str> {
        self.responder.as_ref().map(Responder::reply_to)
    }

    /// The capability set of this message.
    #[must_use]
    pub const fn source(&self) -> &Source {
        &self.source
    }

    /// Queue metadata.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotSupported` for plain pub/sub messages.
    pub fn metadata(&self) -> Result<&Metadata> {
        match &self.source {
            Source::Queue(delivery) => Ok(&delivery.metadata),
            Source::Core => Err(Error::NotSupported("metadata")),
        }
    }

    /// Whether a terminal acknowledgement has been sent for this delivery.
    #[must_use]
    pub fn is_acknowledged(&self) -> bool {
        match &self.source {
            Source::Queue(delivery) => delivery.acknowledged.load(Ordering::Acquire),
            Source::Core => false,
        }
    }

    /// Acknowledges successful processing.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidOperation` if the message cannot be acknowledged or
    /// already was, and `Error::Transport` if the queue rejects the acknowledgement.
    pub async fn ack(&self) -> Result<()> {
        self.acknowledge(AckKind::Ack).await
    }

    /// Negatively acknowledges the message so the queue redelivers it.
    ///
    /// # Errors
    ///
    /// See [`Message::ack`].
    pub async fn nak(&self) -> Result<()> {
        self.acknowledge(AckKind::Nak).await
    }

    /// Terminates the message so the queue never redelivers it.
    ///
    /// # Errors
    ///
    /// See [`Message::ack`].
    pub async fn term(&self, reason: Option<String>) -> Result<()> {
        self.acknowledge(AckKind::Term { reason }).await
    }

    /// Tells the queue processing is still under way. May be sent once per
    /// delivery, before the message is acknowledged.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidOperation` if progress was already reported or
    /// the message is acknowledged; otherwise see [`Message::ack`].
    pub async fn in_progress(&self) -> Result<()> {
        self.acknowledge(AckKind::Progress).await
    }

    async fn acknowledge(&self, kind: AckKind) -> Result<()> {
        let Source::Queue(delivery) = &self.source else {
            return Err(Error::InvalidOperation(
                "message does not support acknowledgement",
            ));
        };

        let (flag, reason) = if kind.is_terminal() {
            (&delivery.acknowledged, "message already acknowledged")
        } else if delivery.acknowledged.load(Ordering::Acquire) {
            return Err(Error::InvalidOperation("message already acknowledged"));
        } else {
            (&delivery.in_progress, "progress already reported")
        };

        if flag
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(Error::InvalidOperation(reason));
        }

        if let Err(error) = delivery.acknowledger.acknowledge(kind).await {
            flag.store(false, Ordering::Release);
            return Err(Error::Transport(error));
        }

        Ok(())
    }

    /// Sends a reply to the message's reply subject.
    ///
    /// When `headers` has no `Content-Type`, the inbound message's content type is
    /// copied over so the reply uses the request's encoding.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotSupported` if the message has no reply subject, or the
    /// publisher's error as `Error::Transport`.
    pub async fn respond(&self, mut headers: HeaderMap, payload: impl Into<Bytes>) -> Result<()> {
        let responder = self
            .responder
            .as_ref()
            .ok_or(Error::NotSupported("respond"))?;

        if !headers.contains_key(CONTENT_TYPE) {
            if let Some(content_type) = self.headers.get(CONTENT_TYPE) {
                headers.insert(CONTENT_TYPE, content_type.clone());
            }
        }

        responder
            .publisher
            .publish(&responder.reply_to, headers, payload.into())
            .await
            .map_err(Error::Transport)
    }
}
