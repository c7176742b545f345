use thiserror::Error;

/// Errors from in-memory streams.
#[derive(Debug, Error)]
pub enum Error {
    /// The stream holds `max_messages` and rejects new ones.
    #[error("stream '{0}' is full")]
    Full(String),

    /// The subject is malformed.
    #[error(transparent)]
    Subject(#[from] proven_messaging::Error),

    /// Capturing subjects from the transport failed.
    #[error(transparent)]
    Transport(#[from] crate::transport::Error),
}
