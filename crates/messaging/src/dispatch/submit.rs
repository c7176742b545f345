use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use tokio::sync::Semaphore;

/// Schedules per-message work.
///
/// `submit` is awaited by the dispatch loop, so how long it takes to return
/// is the backpressure the strategy applies to the queue.
#[async_trait]
pub trait Submitter: Debug + Send + Sync + 'static {
    /// Schedules `work`.
    async fn submit(&self, work: BoxFuture<'static, ()>);
}

/// Runs each message to completion before the next is pulled.
#[derive(Clone, Copy, Debug, Default)]
pub struct Inline;

#[async_trait]
impl Submitter for Inline {
    async fn submit(&self, work: BoxFuture<'static, ()>) {
        work.await;
    }
}

/// Spawns every message as its own task and returns immediately.
///
/// Unbounded: nothing limits how many handlers run at once.
#[derive(Clone, Copy, Debug, Default)]
pub struct Spawn;

#[async_trait]
impl Submitter for Spawn {
    async fn submit(&self, work: BoxFuture<'static, ()>) {
        tokio::spawn(work);
    }
}

/// Spawns messages as tasks, at most `max_concurrency` at a time.
///
/// `submit` waits for a free slot, which stalls the pull loop while the pool
/// is full.
#[derive(Clone, Debug)]
pub struct Pool {
    max_concurrency: usize,
    semaphore: Arc<Semaphore>,
}

impl Pool {
    /// Creates a pool running at most `max_concurrency` handlers, never fewer than one.
    #[must_use]
    pub fn new(max_concurrency: usize) -> Self {
        let max_concurrency = max_concurrency.max(1);

        Self {
            max_concurrency,
            semaphore: Arc::new(Semaphore::new(max_concurrency)),
        }
    }

    /// The concurrency bound.
    #[must_use]
    pub const fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }
}

#[async_trait]
impl Submitter for Pool {
    async fn submit(&self, work: BoxFuture<'static, ()>) {
        // The semaphore is never closed, so acquisition only fails if that changes.
        match self.semaphore.clone().acquire_owned().await {
            Ok(permit) => {
                tokio::spawn(async move {
                    work.await;
                    drop(permit);
                });
            }
            Err(_) => work.await,
        }
    }
}
