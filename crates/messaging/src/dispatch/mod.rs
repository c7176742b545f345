//! Consumer dispatch: pulls messages from a queue or subscription and runs
//! them through a handler.
//!
//! Every message gets a cancellation token derived from the session's root
//! token. Cancelling the session stops delivery and, once the pull loop has
//! exited, waits for in-flight messages up to
//! [`ConsumeOptions::drain_timeout`]. In-flight handlers are never aborted;
//! they only see cancellation through their own token.

mod config;
mod error_handler;
mod submit;

pub use config::{ConsumeConfig, ConsumeOptions, ErrorPolicy, SubmitStrategy};
pub use error_handler::{ErrorHandler, LogErrors, PanicOnError};
pub use submit::{Inline, Pool, Spawn, Submitter};

use crate::error::{Error, Result};
use crate::handler::BoxHandler;
use crate::message::Message;
use crate::queue::{ConsumeHandle, MessageCallback, QueueConsumer};
use crate::transport::{Subscription, Transport};

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{FutureExt, StreamExt};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

struct Dispatcher {
    error_handler: Arc<dyn ErrorHandler>,
    handler: BoxHandler,
    root: CancellationToken,
    submitter: Arc<dyn Submitter>,
    tracker: TaskTracker,
}

impl Dispatcher {
    async fn dispatch(&self, message: Message) {
        let cancel = self.root.child_token();
        let error_handler = self.error_handler.clone();
        let handler = self.handler.clone();

        let work = self.tracker.track_future(async move {
            let subject = message.subject().to_string();

            if let Err(error) = handler.handle(cancel.clone(), message).await {
                error_handler.handle_error(&cancel, &subject, error);
            }
        });

        self.submitter.submit(work.boxed()).await;
    }

    fn into_callback(self) -> MessageCallback {
        let dispatcher = Arc::new(self);

        Arc::new(move |message: Message| {
            let dispatcher = dispatcher.clone();
            async move { dispatcher.dispatch(message).await }.boxed()
        })
    }
}

/// A running consume or serve loop.
#[derive(Clone, Debug)]
pub struct ConsumeSession {
    finished: CancellationToken,
    root: CancellationToken,
    tracker: TaskTracker,
}

impl ConsumeSession {
    fn start(
        name: String,
        root: CancellationToken,
        tracker: TaskTracker,
        handle: Box<dyn ConsumeHandle>,
        drain_timeout: Option<Duration>,
    ) -> Self {
        let finished = CancellationToken::new();

        tokio::spawn({
            let finished = finished.clone();
            let root = root.clone();
            let tracker = tracker.clone();

            async move {
                tokio::select! {
                    () = root.cancelled() => debug!("stopping {}", name),
                    () = handle.stopped() => debug!("{} ended on its own", name),
                }

                handle.stop();
                handle.stopped().await;

                tracker.close();
                drain(&name, &tracker, drain_timeout).await;

                info!("{} stopped", name);
                finished.cancel();
            }
        });

        Self {
            finished,
            root,
            tracker,
        }
    }

    /// Stops delivery and starts draining.
    pub fn cancel(&self) {
        self.root.cancel();
    }

    /// Whether teardown has completed.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished.is_cancelled()
    }

    /// Number of messages currently being processed.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Waits until the loop has stopped and in-flight work has drained or
    /// the drain timeout has passed.
    pub async fn wait(&self) {
        self.finished.cancelled().await;
    }
}

async fn drain(name: &str, tracker: &TaskTracker, drain_timeout: Option<Duration>) {
    match drain_timeout {
        None => tracker.wait().await,
        Some(timeout) if timeout.is_zero() => {
            if !tracker.is_empty() {
                debug!("{} left {} messages in flight", name, tracker.len());
            }
        }
        Some(timeout) => {
            if tokio::time::timeout(timeout, tracker.wait()).await.is_err() {
                warn!(
                    "{} drain timed out with {} messages in flight",
                    name,
                    tracker.len()
                );
            }
        }
    }
}

/// Consumes `consumer`, running every delivered message through `handler`.
///
/// Returns once the pull loop is registered. The session stops when `cancel`
/// (or [`ConsumeSession::cancel`]) fires, or when the queue ends the loop.
///
/// # Errors
///
/// Returns the queue's failure to start consuming as `Error::Transport`.
pub async fn consume(
    cancel: CancellationToken,
    consumer: &dyn QueueConsumer,
    handler: BoxHandler,
    options: ConsumeOptions,
) -> Result<ConsumeSession> {
    let root = cancel.child_token();
    let tracker = TaskTracker::new();
    let callback = Dispatcher {
        error_handler: options.error_handler,
        handler,
        root: root.clone(),
        submitter: options.submitter,
        tracker: tracker.clone(),
    }
    .into_callback();

    let handle = consumer.consume(callback).await.map_err(Error::Transport)?;
    let name = format!("consumer {}", consumer.name());
    info!("started {}", name);

    Ok(ConsumeSession::start(
        name,
        root,
        tracker,
        handle,
        options.drain_timeout,
    ))
}

/// Subscribes to `subject` on `transport` and runs every message through `handler`.
///
/// The core pub/sub counterpart of [`consume`], with the same session semantics.
///
/// # Errors
///
/// Returns the transport's failure to subscribe as `Error::Transport`.
pub async fn serve(
    cancel: CancellationToken,
    transport: &dyn Transport,
    subject: &str,
    handler: BoxHandler,
    options: ConsumeOptions,
) -> Result<ConsumeSession> {
    let subscription = transport
        .subscribe(subject)
        .await
        .map_err(Error::Transport)?;

    let root = cancel.child_token();
    let tracker = TaskTracker::new();
    let callback = Dispatcher {
        error_handler: options.error_handler,
        handler,
        root: root.clone(),
        submitter: options.submitter,
        tracker: tracker.clone(),
    }
    .into_callback();

    let handle = SubscriptionLoop::spawn(subscription, callback);
    let name = format!("subscription {subject}");
    info!("started {}", name);

    Ok(ConsumeSession::start(
        name,
        root,
        tracker,
        Box::new(handle),
        options.drain_timeout,
    ))
}

#[derive(Debug)]
struct SubscriptionLoop {
    done: CancellationToken,
    stop: CancellationToken,
}

impl SubscriptionLoop {
    fn spawn(subscription: Subscription, callback: MessageCallback) -> Self {
        let done = CancellationToken::new();
        let stop = CancellationToken::new();

        tokio::spawn({
            let done = done.clone();
            let stop = stop.clone();

            async move {
                // Declared first so the subscription is closed before `done` fires.
                let _done = done.drop_guard();
                let mut subscription = subscription;

                loop {
                    tokio::select! {
                        biased;
                        () = stop.cancelled() => break,
                        next = subscription.next() => match next {
                            Some(message) => callback(message).await,
                            None => break,
                        },
                    }
                }
            }
        });

        Self { done, stop }
    }
}

#[async_trait]
impl ConsumeHandle for SubscriptionLoop {
    fn stop(&self) {
        self.stop.cancel();
    }

    async fn stopped(&self) {
        self.done.cancelled().await;
    }
}
