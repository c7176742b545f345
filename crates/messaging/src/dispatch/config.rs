use super::error_handler::{ErrorHandler, LogErrors, PanicOnError};
use super::submit::{Inline, Pool, Spawn, Submitter};

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Options for [`super::consume`] and [`super::serve`].
#[derive(Clone, Debug)]
pub struct ConsumeOptions {
    /// How long teardown waits for in-flight messages once the session is
    /// cancelled. `None` waits for all of them, `Some(Duration::ZERO)` does not wait.
    pub drain_timeout: Option<Duration>,

    /// Receives per-message failures.
    pub error_handler: Arc<dyn ErrorHandler>,

    /// Schedules per-message work.
    pub submitter: Arc<dyn Submitter>,
}

impl ConsumeOptions {
    /// Replaces the submission strategy.
    #[must_use]
    pub fn with_submitter<S>(mut self, submitter: S) -> Self
    where
        S: Submitter,
    {
        self.submitter = Arc::new(submitter);
        self
    }

    /// Replaces the error handler.
    #[must_use]
    pub fn with_error_handler<H>(mut self, error_handler: H) -> Self
    where
        H: ErrorHandler,
    {
        self.error_handler = Arc::new(error_handler);
        self
    }

    /// Sets the drain timeout.
    #[must_use]
    pub const fn with_drain_timeout(mut self, drain_timeout: Option<Duration>) -> Self {
        self.drain_timeout = drain_timeout;
        self
    }
}

/// Spawns every message ([`Spawn`]), panics on the first failure
/// ([`PanicOnError`]) and drains without a timeout.
impl Default for ConsumeOptions {
    fn default() -> Self {
        Self {
            drain_timeout: None,
            error_handler: Arc::new(PanicOnError),
            submitter: Arc::new(Spawn),
        }
    }
}

/// Submission strategy named in configuration.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SubmitStrategy {
    /// [`Inline`].
    Inline,

    /// [`Spawn`].
    #[default]
    Spawn,

    /// [`Pool`].
    Pool {
        /// Most handlers running at once.
        max_concurrency: usize,
    },
}

/// Error policy named in configuration.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorPolicy {
    /// [`PanicOnError`].
    #[default]
    Panic,

    /// [`LogErrors`].
    Log,
}

/// Declarative form of [`ConsumeOptions`].
///
/// ```json
/// { "strategy": { "kind": "pool", "max_concurrency": 8 }, "error_policy": "log", "drain_timeout_ms": 5000 }
/// ```
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq, Serialize)]
#[serde(default)]
pub struct ConsumeConfig {
    /// Drain timeout in milliseconds; absent waits for all in-flight messages.
    pub drain_timeout_ms: Option<u64>,

    /// What happens to per-message failures.
    pub error_policy: ErrorPolicy,

    /// How per-message work is scheduled.
    pub strategy: SubmitStrategy,
}

impl From<ConsumeConfig> for ConsumeOptions {
    fn from(config: ConsumeConfig) -> Self {
        let submitter: Arc<dyn Submitter> = match config.strategy {
            SubmitStrategy::Inline => Arc::new(Inline),
            SubmitStrategy::Spawn => Arc::new(Spawn),
            SubmitStrategy::Pool { max_concurrency } => Arc::new(Pool::new(max_concurrency)),
        };

        let error_handler: Arc<dyn ErrorHandler> = match config.error_policy {
            ErrorPolicy::Panic => Arc::new(PanicOnError),
            ErrorPolicy::Log => Arc::new(LogErrors),
        };

        Self {
            drain_timeout: config.drain_timeout_ms.map(Duration::from_millis),
            error_handler,
            submitter,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_is_default() {
        let config: ConsumeConfig = serde_json::from_str("{}").unwrap();

        assert_eq!(config, ConsumeConfig::default());
        assert_eq!(config.strategy, SubmitStrategy::Spawn);
        assert_eq!(config.error_policy, ErrorPolicy::Panic);
    }

    #[test]
    fn test_full_config() {
        let config: ConsumeConfig = serde_json::from_str(
            r#"{
                "strategy": { "kind": "pool", "max_concurrency": 8 },
                "error_policy": "log",
                "drain_timeout_ms": 250
            }"#,
        )
        .unwrap();

        assert_eq!(
            config.strategy,
            SubmitStrategy::Pool { max_concurrency: 8 }
        );

        let options = ConsumeOptions::from(config);
        assert_eq!(options.drain_timeout, Some(Duration::from_millis(250)));
        assert!(format!("{:?}", options.submitter).contains("max_concurrency: 8"));
        assert_eq!(format!("{:?}", options.error_handler), "LogErrors");
    }

    #[test]
    fn test_unknown_strategy_rejected() {
        assert!(serde_json::from_str::<ConsumeConfig>(r#"{"strategy":{"kind":"fibers"}}"#).is_err());
    }
}
