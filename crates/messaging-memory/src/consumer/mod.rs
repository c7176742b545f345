mod error;

pub use error::Error;

use crate::stream::MemoryStream;

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use parking_lot::Mutex;
use proven_messaging::message::{AckKind, Acknowledger, Metadata};
use proven_messaging::queue::{Batch, ConsumeHandle, MessageCallback, QueueConsumer};
use proven_messaging::subject::Pattern;
use proven_messaging::{BoxError, Message};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Options for in-memory consumers.
#[derive(Clone, Debug, Default)]
pub struct MemoryConsumerOptions {
    /// Only deliver messages whose subject matches this pattern.
    pub filter_subject: Option<String>,

    /// Most times a message is delivered; a nak past this drops it. Unlimited if `None`.
    pub max_deliver: Option<u64>,
}

/// Delivery counters of a consumer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ConsumerInfo {
    /// Delivered messages not yet acked, naked or terminated.
    pub ack_pending: u64,

    /// Messages acknowledged successfully.
    pub acked: u64,

    /// Messages waiting to be delivered that pass the filter subject,
    /// redeliveries included.
    pub num_pending: u64,

    /// Deliveries beyond the first for a message.
    pub redelivered: u64,

    /// Messages terminated, or dropped after `max_deliver` deliveries.
    pub terminated: u64,
}

#[derive(Debug, Default)]
struct State {
    acked: u64,
    consumer_sequence: u64,
    deliveries: HashMap<u64, u64>,
    next_stream_sequence: u64,
    outstanding: HashSet<u64>,
    redeliver: VecDeque<u64>,
    redelivered: u64,
    terminated: u64,
}

#[derive(Debug)]
struct Inner {
    consuming: AtomicBool,
    filter: Option<Pattern>,
    name: String,
    options: MemoryConsumerOptions,
    requeued: Notify,
    state: Mutex<State>,
    stream: MemoryStream,
}

impl Inner {
    fn num_pending(&self, state: &State) -> u64 {
        self.stream
            .count_matching(state.next_stream_sequence, self.filter.as_ref())
            + state.redeliver.len() as u64
    }

    fn next_delivery(self: &Arc<Self>) -> Option<Message> {
        let mut state = self.state.lock();

        loop {
            let seq = if let Some(seq) = state.redeliver.pop_front() {
                seq
            } else if state.next_stream_sequence < self.stream.len() {
                state.next_stream_sequence += 1;
                state.next_stream_sequence - 1
            } else {
                return None;
            };

            let Some(stored) = self.stream.stored(seq) else {
                continue;
            };

            if self
                .filter
                .as_ref()
                .is_some_and(|filter| !filter.matches(&stored.subject))
            {
                continue;
            }

            let delivered = {
                let count = state.deliveries.entry(seq).or_insert(0);
                *count += 1;
                *count
            };
            if delivered > 1 {
                state.redelivered += 1;
            }

            let consumer_sequence = state.consumer_sequence;
            state.consumer_sequence += 1;
            state.outstanding.insert(seq);

            let metadata = Metadata {
                stream: self.stream.name().to_string(),
                consumer: self.name.clone(),
                stream_sequence: seq,
                consumer_sequence,
                delivered,
                pending: self.num_pending(&state),
                timestamp: stored.timestamp,
            };
            let acknowledger = Arc::new(MemoryAcknowledger {
                consumer: Arc::downgrade(self),
                stream_sequence: seq,
            });

            return Some(Message::queued(
                stored.subject,
                stored.headers,
                stored.payload,
                metadata,
                acknowledger,
            ));
        }
    }

    fn settle(&self, seq: u64, kind: AckKind) -> Result<(), Error> {
        let requeued = {
            let mut state = self.state.lock();

            if !state.outstanding.contains(&seq) {
                return Err(Error::NotPending(seq));
            }

            match kind {
                AckKind::Progress => {
                    debug!("{} still processing {}", self.name, seq);
                    false
                }
                AckKind::Ack => {
                    state.outstanding.remove(&seq);
                    state.deliveries.remove(&seq);
                    state.acked += 1;
                    false
                }
                AckKind::Term { reason } => {
                    state.outstanding.remove(&seq);
                    state.deliveries.remove(&seq);
                    state.terminated += 1;
                    debug!(
                        "{} terminated {}: {}",
                        self.name,
                        seq,
                        reason.as_deref().unwrap_or("no reason given")
                    );
                    false
                }
                AckKind::Nak => {
                    state.outstanding.remove(&seq);
                    let delivered = state.deliveries.get(&seq).copied().unwrap_or_default();

                    if self
                        .options
                        .max_deliver
                        .is_some_and(|max| delivered >= max)
                    {
                        warn!(
                            "{} dropping {} after {} deliveries",
                            self.name, seq, delivered
                        );
                        state.deliveries.remove(&seq);
                        state.terminated += 1;
                        false
                    } else {
                        debug!("{} redelivering {}", self.name, seq);
                        state.redeliver.push_back(seq);
                        true
                    }
                }
            }
        };

        if requeued {
            self.requeued.notify_waiters();
        }

        Ok(())
    }

    async fn pull_loop(
        self: Arc<Self>,
        callback: MessageCallback,
        stop: CancellationToken,
        done: CancellationToken,
    ) {
        let _done = done.drop_guard();
        let _consuming = ConsumingGuard(&self.consuming);
        debug!("{} pulling from {}", self.name, self.stream.name());

        while !stop.is_cancelled() {
            let appended = self.stream.appended().notified();
            let requeued = self.requeued.notified();
            tokio::pin!(appended, requeued);
            appended.as_mut().enable();
            requeued.as_mut().enable();

            if let Some(message) = self.next_delivery() {
                callback(message).await;
                continue;
            }

            tokio::select! {
                () = stop.cancelled() => {}
                () = &mut appended => {}
                () = &mut requeued => {}
            }
        }

        debug!("{} stopped pulling", self.name);
    }
}

/// Clears the consuming flag when the pull loop ends, including by panic.
struct ConsumingGuard<'a>(&'a AtomicBool);

impl Drop for ConsumingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[derive(Debug)]
struct MemoryAcknowledger {
    consumer: Weak<Inner>,
    stream_sequence: u64,
}

#[async_trait]
impl Acknowledger for MemoryAcknowledger {
    async fn acknowledge(&self, kind: AckKind) -> Result<(), BoxError> {
        let consumer = self.consumer.upgrade().ok_or(Error::ConsumerGone)?;
        consumer.settle(self.stream_sequence, kind)?;

        Ok(())
    }
}

#[derive(Debug)]
struct MemoryConsumeHandle {
    done: CancellationToken,
    stop: CancellationToken,
}

#[async_trait]
impl ConsumeHandle for MemoryConsumeHandle {
    fn stop(&self) {
        self.stop.cancel();
    }

    async fn stopped(&self) {
        self.done.cancelled().await;
    }
}

/// A pull consumer over a [`MemoryStream`], starting at sequence 0.
///
/// Deliveries stay pending until acked, naked or terminated; naked messages
/// are redelivered ahead of new ones. Clones share the same position.
#[derive(Clone, Debug)]
pub struct MemoryConsumer {
    inner: Arc<Inner>,
}

impl MemoryConsumer {
    pub(crate) fn new(
        name: String,
        stream: MemoryStream,
        options: MemoryConsumerOptions,
    ) -> Result<Self, Error> {
        let filter = options
            .filter_subject
            .as_deref()
            .map(Pattern::parse)
            .transpose()?;

        Ok(Self {
            inner: Arc::new(Inner {
                consuming: AtomicBool::new(false),
                filter,
                name,
                options,
                requeued: Notify::new(),
                state: Mutex::new(State::default()),
                stream,
            }),
        })
    }

    /// Current delivery counters.
    #[must_use]
    pub fn info(&self) -> ConsumerInfo {
        let state = self.inner.state.lock();

        ConsumerInfo {
            ack_pending: state.outstanding.len() as u64,
            acked: state.acked,
            num_pending: self.inner.num_pending(&state),
            redelivered: state.redelivered,
            terminated: state.terminated,
        }
    }
}

#[async_trait]
impl QueueConsumer for MemoryConsumer {
    fn name(&self) -> &str {
        &self.inner.name
    }

    async fn fetch(&self, max: usize) -> Result<Batch, BoxError> {
        let messages: Vec<Message> = std::iter::from_fn(|| self.inner.next_delivery())
            .take(max)
            .collect();

        Ok(Batch::from_messages(messages))
    }

    async fn consume(
        &self,
        callback: MessageCallback,
    ) -> Result<Box<dyn ConsumeHandle>, BoxError> {
        if self.inner.consuming.swap(true, Ordering::AcqRel) {
            return Err(Error::AlreadyConsuming(self.inner.name.clone()).into());
        }

        let done = CancellationToken::new();
        let stop = CancellationToken::new();
        tokio::spawn(
            self.inner
                .clone()
                .pull_loop(callback, stop.clone(), done.clone()),
        );

        Ok(Box::new(MemoryConsumeHandle { done, stop }))
    }
}
