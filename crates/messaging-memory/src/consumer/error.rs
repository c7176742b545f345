use thiserror::Error;

/// Errors from in-memory consumers.
#[derive(Debug, Error)]
pub enum Error {
    /// A pull loop is already running for this consumer.
    #[error("consumer '{0}' is already consuming")]
    AlreadyConsuming(String),

    /// The consumer was dropped before the acknowledgement arrived.
    #[error("consumer is gone")]
    ConsumerGone,

    /// The filter subject is malformed.
    #[error(transparent)]
    FilterSubject(#[from] proven_messaging::Error),

    /// The delivery is not awaiting acknowledgement.
    #[error("message {0} is not pending acknowledgement")]
    NotPending(u64),
}
