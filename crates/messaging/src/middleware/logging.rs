use super::Middleware;
use crate::error::Result;
use crate::handler::{BoxHandler, Handler};
use crate::message::Message;

use std::sync::Arc;

use async_trait::async_trait;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Emits one event per handled message with its subject, elapsed time and outcome.
#[derive(Clone, Copy, Debug, Default)]
pub struct Logging;

impl Middleware for Logging {
    fn layer(&self, next: BoxHandler) -> BoxHandler {
        Arc::new(LoggingHandler { next })
    }
}

struct LoggingHandler {
    next: BoxHandler,
}

#[async_trait]
impl Handler for LoggingHandler {
    async fn handle(&self, cancel: CancellationToken, message: Message) -> Result<()> {
        let subject = message.subject().to_string();
        let started = Instant::now();

        let result = self.next.handle(cancel, message).await;
        let elapsed = started.elapsed();

        match &result {
            Ok(()) => debug!("handled {} in {:?}", subject, elapsed),
            Err(e) => warn!("failed handling {} after {:?}: {}", subject, elapsed, e),
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::error::Error;
    use crate::handler::handler_fn;

    use http::HeaderMap;
    use tracing_test::traced_test;

    #[tokio::test]
    #[traced_test]
    async fn test_logs_success_and_failure() {
        let ok = Logging.layer(handler_fn(|_, _| async { Ok(()) }));
        let failing = Logging.layer(handler_fn(|_, _| async { Err(Error::handler("broken")) }));

        ok.handle(
            CancellationToken::new(),
            Message::new("good.subject", HeaderMap::new(), ""),
        )
        .await
        .unwrap();
        let result = failing
            .handle(
                CancellationToken::new(),
                Message::new("bad.subject", HeaderMap::new(), ""),
            )
            .await;

        assert!(result.is_err());
        assert!(logs_contain("handled good.subject in"));
        assert!(logs_contain("failed handling bad.subject after"));
        assert!(logs_contain("broken"));
    }
}
