use super::Middleware;
use crate::error::{Error, Result};
use crate::handler::{BoxHandler, Handler};
use crate::message::{Message, Source};

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Settles queue deliveries from the handler's result.
///
/// Success acks, failure naks and the failure is still returned. Messages
/// without the acknowledgement capability, and deliveries the handler already
/// settled itself, are left alone.
#[derive(Clone, Copy, Debug, Default)]
pub struct AckOnResult;

impl Middleware for AckOnResult {
    fn layer(&self, next: BoxHandler) -> BoxHandler {
        Arc::new(AckOnResultHandler { next })
    }
}

struct AckOnResultHandler {
    next: BoxHandler,
}

#[async_trait]
impl Handler for AckOnResultHandler {
    async fn handle(&self, cancel: CancellationToken, message: Message) -> Result<()> {
        if matches!(message.source(), Source::Core) {
            return self.next.handle(cancel, message).await;
        }

        let result = self.next.handle(cancel, message.clone()).await;

        if message.is_acknowledged() {
            return result;
        }

        match result {
            Ok(()) => match message.ack().await {
                // Settled concurrently by a clone the handler kept.
                Ok(()) | Err(Error::InvalidOperation(_)) => Ok(()),
                Err(e) => Err(e),
            },
            Err(e) => {
                if let Err(nak_error) = message.nak().await {
                    warn!("failed to nak {}: {}", message.subject(), nak_error);
                }
                Err(e)
            }
        }
    }
}
