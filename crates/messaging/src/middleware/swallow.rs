use super::Middleware;
use crate::error::Result;
use crate::handler::{BoxHandler, Handler};
use crate::message::Message;

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Discards errors from the wrapped handler and always reports success.
///
/// Only safe as the outermost middleware: anything it wraps that reacts to
/// failures still sees them, but anything outside it never will.
#[derive(Clone, Copy, Debug, Default)]
pub struct SwallowErrors;

impl Middleware for SwallowErrors {
    fn layer(&self, next: BoxHandler) -> BoxHandler {
        Arc::new(SwallowErrorsHandler { next })
    }
}

struct SwallowErrorsHandler {
    next: BoxHandler,
}

#[async_trait]
impl Handler for SwallowErrorsHandler {
    async fn handle(&self, cancel: CancellationToken, message: Message) -> Result<()> {
        let subject = message.subject().to_string();

        if let Err(e) = self.next.handle(cancel, message).await {
            warn!("discarding error handling {}: {}", subject, e);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::error::Error;
    use crate::handler::handler_fn;

    use std::sync::atomic::{AtomicUsize, Ordering};

    use http::HeaderMap;
    use tracing_test::traced_test;

    #[tokio::test]
    #[traced_test]
    async fn test_failure_is_hidden_from_caller() {
        let calls = Arc::new(AtomicUsize::new(0));
        let failing = {
            let calls = calls.clone();
            handler_fn(move |_, _| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(Error::handler("always fails")) }
            })
        };

        let result = SwallowErrors
            .layer(failing)
            .handle(
                CancellationToken::new(),
                Message::new("jobs.run", HeaderMap::new(), ""),
            )
            .await;

        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(logs_contain("discarding error handling jobs.run: always fails"));
    }
}
