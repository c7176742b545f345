use crate::error::BoxError;

use thiserror::Error;

/// Errors produced by a codec while encoding or decoding a payload.
#[derive(Debug, Error)]
pub enum CodecError {
    /// JSON (de)serialization failed.
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// CBOR deserialization failed.
    #[error(transparent)]
    CborDeserialize(#[from] ciborium::de::Error<std::io::Error>),

    /// CBOR serialization failed.
    #[error(transparent)]
    CborSerialize(#[from] ciborium::ser::Error<std::io::Error>),

    /// The value did not fit the requested type, or the type could not be
    /// represented as a value.
    #[error(transparent)]
    Value(#[from] ciborium::value::Error),

    /// Failure reported by a codec outside this crate.
    #[error(transparent)]
    Custom(BoxError),
}
