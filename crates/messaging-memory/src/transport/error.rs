use thiserror::Error;

/// Errors from the in-memory transport.
#[derive(Debug, Error)]
pub enum Error {
    /// The subject or subscription pattern is malformed.
    #[error(transparent)]
    Subject(#[from] proven_messaging::Error),

    /// A request was published but nothing is subscribed to its subject.
    #[error("no responders for request on '{0}'")]
    NoResponders(String),

    /// No reply arrived within the request timeout.
    #[error("request on '{0}' timed out")]
    Timeout(String),
}
