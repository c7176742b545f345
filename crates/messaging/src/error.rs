use crate::codec::CodecError;

use thiserror::Error;

/// Boxed error carried across collaborator boundaries (transports, queues, handlers).
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors surfaced by the dispatch pipeline.
#[derive(Debug, Error)]
pub enum Error {
    /// No registered route matched the subject.
    #[error("no route found for subject '{subject}'")]
    NoRouteFound {
        /// The subject that failed to match.
        subject: String,
    },

    /// A subject pattern was rejected at registration time.
    #[error("invalid subject pattern '{pattern}': {reason}")]
    InvalidPattern {
        /// The offending pattern.
        pattern: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// The content type header named a codec that is not registered.
    #[error("unsupported content type '{0}'")]
    UnsupportedContentType(String),

    /// The payload could not be decoded with the negotiated codec.
    #[error("failed to decode payload: {0}")]
    Decode(#[source] CodecError),

    /// The payload could not be encoded with the negotiated codec.
    #[error("failed to encode payload: {0}")]
    Encode(#[source] CodecError),

    /// The message does not carry the requested capability.
    #[error("{0} is not supported by this message")]
    NotSupported(&'static str),

    /// The operation is not valid in the message's current state.
    #[error("invalid operation: {0}")]
    InvalidOperation(&'static str),

    /// Failure reported by the underlying transport or queue, passed through unchanged.
    #[error(transparent)]
    Transport(BoxError),

    /// Failure returned by application handler code.
    #[error(transparent)]
    Handler(BoxError),

    /// A handler panicked and the recovery policy turned the panic into an error.
    #[error("handler panicked: {0}")]
    Panic(String),

    /// A wait was abandoned because its cancellation token fired.
    #[error("operation cancelled")]
    Cancelled,
}

impl Error {
    /// Wraps an application error.
    pub fn handler<E>(error: E) -> Self
    where
        E: Into<BoxError>,
    {
        Self::Handler(error.into())
    }

    /// Wraps a transport or queue error.
    pub fn transport<E>(error: E) -> Self
    where
        E: Into<BoxError>,
    {
        Self::Transport(error.into())
    }

    /// Returns true for routing misses, which an outer fallback is expected to absorb.
    #[must_use]
    pub const fn is_no_route(&self) -> bool {
        matches!(self, Self::NoRouteFound { .. })
    }
}
