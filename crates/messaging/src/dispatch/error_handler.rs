use crate::error::Error;

use std::fmt::Debug;

use tokio_util::sync::CancellationToken;
use tracing::error;

/// Receives failures from dispatched messages, once per failed message.
pub trait ErrorHandler: Debug + Send + Sync + 'static {
    /// Handles `error` raised while processing a message on `subject`.
    fn handle_error(&self, cancel: &CancellationToken, subject: &str, error: Error);
}

/// Panics on the first failure.
///
/// The panic unwinds the task running the message: with [`super::Spawn`] or
/// [`super::Pool`] that is the message's own task, with [`super::Inline`] it is
/// the consumer's pull loop.
#[derive(Clone, Copy, Debug, Default)]
pub struct PanicOnError;

impl ErrorHandler for PanicOnError {
    fn handle_error(&self, _cancel: &CancellationToken, subject: &str, error: Error) {
        panic!("unhandled error processing message on {subject}: {error}");
    }
}

/// Logs failures and keeps consuming.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogErrors;

impl ErrorHandler for LogErrors {
    fn handle_error(&self, _cancel: &CancellationToken, subject: &str, error: Error) {
        error!("error processing message on {}: {}", subject, error);
    }
}
