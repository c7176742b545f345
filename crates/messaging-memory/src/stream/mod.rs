mod error;

pub use error::Error;

use crate::consumer::{self, MemoryConsumer, MemoryConsumerOptions};
use crate::transport::MemoryTransport;

use std::sync::{Arc, Weak};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use http::HeaderMap;
use parking_lot::Mutex;
use proven_messaging::Message;
use proven_messaging::subject::{Pattern, validate_subject};
use tokio::sync::Notify;
use tracing::debug;

/// Options for in-memory streams.
#[derive(Clone, Debug, Default)]
pub struct MemoryStreamOptions {
    /// Most messages the stream holds; publishing beyond it fails. Unlimited if `None`.
    pub max_messages: Option<usize>,
}

#[derive(Clone, Debug)]
pub(crate) struct StoredMessage {
    pub headers: HeaderMap,
    pub payload: Bytes,
    pub subject: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug)]
struct Inner {
    appended: Notify,
    messages: Mutex<Vec<StoredMessage>>,
    name: String,
    options: MemoryStreamOptions,
}

/// An append-only, in-memory message log. Sequence numbers start at 0.
///
/// Clones share the same log.
#[derive(Clone, Debug)]
pub struct MemoryStream {
    inner: Arc<Inner>,
}

impl MemoryStream {
    /// Creates an empty stream.
    pub fn new(name: impl Into<String>, options: MemoryStreamOptions) -> Self {
        Self {
            inner: Arc::new(Inner {
                appended: Notify::new(),
                messages: Mutex::new(Vec::new()),
                name: name.into(),
                options,
            }),
        }
    }

    /// Creates a stream that captures everything published on `subjects`
    /// through `transport`. Capture ends when the stream is dropped.
    ///
    /// # Errors
    ///
    /// Returns `Error::Transport` if a subject pattern is malformed.
    pub fn new_with_subjects(
        name: impl Into<String>,
        options: MemoryStreamOptions,
        transport: &MemoryTransport,
        subjects: &[&str],
    ) -> Result<Self, Error> {
        let stream = Self::new(name, options);

        for subject in subjects {
            let mut subscription = transport.subscribe_pattern(subject)?;
            let weak: Weak<Inner> = Arc::downgrade(&stream.inner);

            tokio::spawn(async move {
                while let Some(message) = subscription.next().await {
                    let Some(inner) = weak.upgrade() else {
                        break;
                    };

                    let stream = Self { inner };
                    if let Err(e) = stream.publish(
                        message.subject(),
                        message.headers().clone(),
                        message.payload().clone(),
                    ) {
                        debug!("dropping captured message: {}", e);
                    }
                }
            });
        }

        Ok(stream)
    }

    /// Name of the stream.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Appends a message and returns its sequence number.
    ///
    /// # Errors
    ///
    /// Returns `Error::Subject` for malformed subjects and `Error::Full` when
    /// the stream is at `max_messages`.
    pub fn publish(
        &self,
        subject: &str,
        headers: HeaderMap,
        payload: impl Into<Bytes>,
    ) -> Result<u64, Error> {
        validate_subject(subject)?;

        let seq = {
            let mut messages = self.inner.messages.lock();

            if self
                .inner
                .options
                .max_messages
                .is_some_and(|max| messages.len() >= max)
            {
                return Err(Error::Full(self.inner.name.clone()));
            }

            let seq = messages.len() as u64;
            messages.push(StoredMessage {
                headers,
                payload: payload.into(),
                subject: subject.to_string(),
                timestamp: Utc::now(),
            });
            seq
        };

        debug!("appended {} to {} at {}", subject, self.inner.name, seq);
        self.inner.appended.notify_waiters();

        Ok(seq)
    }

    /// The message stored at `seq`.
    #[must_use]
    pub fn get(&self, seq: u64) -> Option<Message> {
        self.stored(seq)
            .map(|stored| Message::new(stored.subject, stored.headers, stored.payload))
    }

    /// Sequence number of the last message.
    #[must_use]
    pub fn last_seq(&self) -> Option<u64> {
        self.len().checked_sub(1)
    }

    /// Number of stored messages.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.inner.messages.lock().len() as u64
    }

    /// Whether the stream is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.messages.lock().is_empty()
    }

    /// Creates a pull consumer reading the stream from the beginning.
    ///
    /// # Errors
    ///
    /// Returns `consumer::Error::FilterSubject` if the filter subject is malformed.
    pub fn consumer(
        &self,
        name: impl Into<String>,
        options: MemoryConsumerOptions,
    ) -> Result<MemoryConsumer, consumer::Error> {
        MemoryConsumer::new(name.into(), self.clone(), options)
    }

    /// Messages from `from` onwards whose subject matches `filter`.
    pub(crate) fn count_matching(&self, from: u64, filter: Option<&Pattern>) -> u64 {
        let messages = self.inner.messages.lock();
        let from = usize::try_from(from).unwrap_or(usize::MAX);

        messages
            .iter()
            .skip(from)
            .filter(|stored| filter.is_none_or(|filter| filter.matches(&stored.subject)))
            .count() as u64
    }

    pub(crate) fn stored(&self, seq: u64) -> Option<StoredMessage> {
        let index = usize::try_from(seq).ok()?;

        self.inner.messages.lock().get(index).cloned()
    }

    pub(crate) fn appended(&self) -> &Notify {
        &self.inner.appended
    }
}
