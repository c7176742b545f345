use super::Middleware;
use crate::error::{Error, Result};
use crate::handler::{BoxHandler, Handler};
use crate::message::Message;

use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::error;

/// A panic caught while handling a message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PanicInfo {
    /// Subject of the message being handled.
    pub subject: String,

    /// The panic payload rendered as text.
    pub message: String,
}

/// Built-in answers to a recovered panic.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RecoverPolicy {
    /// Log the panic and report success.
    #[default]
    Log,

    /// Log the panic and return `Error::Panic`.
    ReturnError,
}

type RecoverCallback = dyn Fn(PanicInfo) -> Result<()> + Send + Sync;

/// Catches panics from the wrapped handler.
///
/// The callback decides the outcome: `Ok(())` makes the call look like it
/// returned normally, an `Err` is returned to the caller instead. The panic is
/// never resumed.
#[derive(Clone)]
pub struct Recover {
    callback: Arc<RecoverCallback>,
}

impl Recover {
    /// Recovers with a custom callback.
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(PanicInfo) -> Result<()> + Send + Sync + 'static,
    {
        Self {
            callback: Arc::new(callback),
        }
    }

    /// Recovers with one of the built-in policies.
    #[must_use]
    pub fn with_policy(policy: RecoverPolicy) -> Self {
        Self::new(move |info: PanicInfo| {
            error!("recovered panic handling {}: {}", info.subject, info.message);

            match policy {
                RecoverPolicy::Log => Ok(()),
                RecoverPolicy::ReturnError => Err(Error::Panic(info.message)),
            }
        })
    }
}

impl Default for Recover {
    fn default() -> Self {
        Self::with_policy(RecoverPolicy::default())
    }
}

impl fmt::Debug for Recover {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Recover").finish_non_exhaustive()
    }
}

impl Middleware for Recover {
    fn layer(&self, next: BoxHandler) -> BoxHandler {
        Arc::new(RecoverHandler {
            callback: self.callback.clone(),
            next,
        })
    }
}

struct RecoverHandler {
    callback: Arc<RecoverCallback>,
    next: BoxHandler,
}

#[async_trait]
impl Handler for RecoverHandler {
    async fn handle(&self, cancel: CancellationToken, message: Message) -> Result<()> {
        let subject = message.subject().to_string();

        match AssertUnwindSafe(self.next.handle(cancel, message))
            .catch_unwind()
            .await
        {
            Ok(result) => result,
            Err(payload) => (self.callback)(PanicInfo {
                subject,
                message: panic_message(payload.as_ref()),
            }),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
