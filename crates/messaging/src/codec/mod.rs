mod error;
mod registry;

pub use error::CodecError;
pub use registry::CodecRegistry;

use crate::error::{Error, Result};

use std::fmt::Debug;
use std::sync::Arc;

use bytes::Bytes;
use ciborium::Value;
use http::header::CONTENT_TYPE;
use http::{HeaderMap, HeaderValue};
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Content type tag of the JSON codec.
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Content type tag of the CBOR codec.
pub const CBOR_CONTENT_TYPE: &str = "application/cbor";

/// A codec shared between a registry and the messages it decoded.
pub type SharedCodec = Arc<dyn Codec>;

/// A paired encode/decode strategy identified by a content type tag.
///
/// Implementations convert between wire bytes and a self-describing
/// [`Value`]; typed access goes through [`encode`](trait.Codec.html#method.encode)
/// and [`decode`](trait.Codec.html#method.decode) on `dyn Codec`, so any
/// codec can be stored in a [`CodecRegistry`].
pub trait Codec: Debug + Send + Sync + 'static {
    /// Short name of the codec.
    fn name(&self) -> &str;

    /// Canonical content type tag written on outbound messages.
    fn content_type(&self) -> &str;

    /// Writes `value` in the codec's wire format.
    ///
    /// # Errors
    ///
    /// Returns a `CodecError` if the value cannot be represented.
    fn encode_value(&self, value: &Value) -> Result<Bytes, CodecError>;

    /// Reads a value from the codec's wire format.
    ///
    /// # Errors
    ///
    /// Returns a `CodecError` on malformed input.
    fn decode_value(&self, bytes: &[u8]) -> Result<Value, CodecError>;
}

impl dyn Codec {
    /// Serializes `value`.
    ///
    /// # Errors
    ///
    /// Returns the underlying serializer's error.
    pub fn encode<T>(&self, value: &T) -> Result<Bytes, CodecError>
    where
        T: Serialize + ?Sized,
    {
        let value = Value::serialized(value)?;
        self.encode_value(&value)
    }

    /// Deserializes a `T` from `bytes`.
    ///
    /// # Errors
    ///
    /// Returns the underlying deserializer's error on malformed input.
    pub fn decode<T>(&self, bytes: &[u8]) -> Result<T, CodecError>
    where
        T: DeserializeOwned,
    {
        Ok(self.decode_value(bytes)?.deserialized()?)
    }

    /// The content type tag as a header value.
    ///
    /// # Errors
    ///
    /// Returns `Error::UnsupportedContentType` if the tag is not a valid header value.
    pub fn content_type_header(&self) -> Result<HeaderValue> {
        HeaderValue::from_str(self.content_type())
            .map_err(|_| Error::UnsupportedContentType(self.content_type().to_string()))
    }
}

/// `application/json` via `serde_json`.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn name(&self) -> &str {
        "json"
    }

    fn content_type(&self) -> &str {
        JSON_CONTENT_TYPE
    }

    fn encode_value(&self, value: &Value) -> Result<Bytes, CodecError> {
        Ok(Bytes::from(serde_json::to_vec(value)?))
    }

    fn decode_value(&self, bytes: &[u8]) -> Result<Value, CodecError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// `application/cbor` via `ciborium`.
#[derive(Clone, Copy, Debug, Default)]
pub struct CborCodec;

impl Codec for CborCodec {
    fn name(&self) -> &str {
        "cbor"
    }

    fn content_type(&self) -> &str {
        CBOR_CONTENT_TYPE
    }

    fn encode_value(&self, value: &Value) -> Result<Bytes, CodecError> {
        let mut buffer = Vec::new();
        ciborium::ser::into_writer(value, &mut buffer)?;

        Ok(Bytes::from(buffer))
    }

    fn decode_value(&self, bytes: &[u8]) -> Result<Value, CodecError> {
        Ok(ciborium::de::from_reader(bytes)?)
    }
}

/// The JSON codec, ready to register.
#[must_use]
pub fn json() -> SharedCodec {
    Arc::new(JsonCodec)
}

/// The CBOR codec, ready to register.
#[must_use]
pub fn cbor() -> SharedCodec {
    Arc::new(CborCodec)
}

/// Reads the `Content-Type` header. Returns `None` when the header is absent
/// or not valid visible ASCII.
#[must_use]
pub fn content_type(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
}
