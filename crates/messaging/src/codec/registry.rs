use super::{CBOR_CONTENT_TYPE, JSON_CONTENT_TYPE, SharedCodec, cbor, json};
use crate::error::{Error, Result};

use std::collections::HashMap;

use http::HeaderMap;
use http::header::CONTENT_TYPE;
use mime::Mime;
use parking_lot::RwLock;

/// Maps content type tags to codecs.
///
/// Meant to be configured once at startup and shared; registration after that
/// is safe but takes a write lock that briefly blocks lookups.
#[derive(Debug)]
pub struct CodecRegistry {
    codecs: RwLock<HashMap<String, SharedCodec>>,
    default: SharedCodec,
}

impl CodecRegistry {
    /// Creates a registry seeded with the JSON and CBOR codecs, falling back to
    /// `default` when a message carries no content type. `default` is also
    /// registered under its own content type.
    #[must_use]
    pub fn new(default: SharedCodec) -> Self {
        let mut codecs = HashMap::new();
        codecs.insert(JSON_CONTENT_TYPE.to_string(), json());
        codecs.insert(CBOR_CONTENT_TYPE.to_string(), cbor());
        if let Ok(essence) = essence(default.content_type()) {
            codecs.insert(essence, default.clone());
        }

        Self {
            codecs: RwLock::new(codecs),
            default,
        }
    }

    /// The codec used when no content type is set.
    #[must_use]
    pub fn default_codec(&self) -> SharedCodec {
        self.default.clone()
    }

    /// Registers `codec` under `content_type`, replacing any codec already
    /// bound to it. A codec may be registered under several tags.
    ///
    /// # Errors
    ///
    /// Returns `Error::UnsupportedContentType` if `content_type` is not a valid MIME type.
    pub fn register(&self, content_type: &str, codec: SharedCodec) -> Result<()> {
        let essence = essence(content_type)?;
        self.codecs.write().insert(essence, codec);

        Ok(())
    }

    /// Finds the codec for a content type, ignoring any parameters.
    ///
    /// # Errors
    ///
    /// Returns `Error::UnsupportedContentType` if no codec is registered for it.
    pub fn lookup(&self, content_type: &str) -> Result<SharedCodec> {
        let essence = essence(content_type)?;

        self.codecs
            .read()
            .get(&essence)
            .cloned()
            .ok_or_else(|| Error::UnsupportedContentType(content_type.to_string()))
    }

    /// Selects the codec for a message from its `Content-Type` header.
    ///
    /// An absent or empty header selects the default codec; any other value
    /// must name a registered codec.
    ///
    /// # Errors
    ///
    /// Returns `Error::UnsupportedContentType` for unknown or unreadable values.
    pub fn choose(&self, headers: &HeaderMap) -> Result<SharedCodec> {
        let Some(value) = headers.get(CONTENT_TYPE) else {
            return Ok(self.default_codec());
        };

        if value.is_empty() {
            return Ok(self.default_codec());
        }

        let content_type = value.to_str().map_err(|_| {
            Error::UnsupportedContentType(String::from_utf8_lossy(value.as_bytes()).into_owned())
        })?;

        self.lookup(content_type)
    }
}

impl Default for CodecRegistry {
    fn default() -> Self {
        Self::new(json())
    }
}

fn essence(content_type: &str) -> Result<String> {
    let mime: Mime = content_type
        .trim()
        .parse()
        .map_err(|_| Error::UnsupportedContentType(content_type.to_string()))?;

    Ok(mime.essence_str().to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::codec::{Codec, CodecError};

    use std::sync::Arc;

    use bytes::Bytes;
    use ciborium::Value;
    use http::HeaderValue;
    use serde::{Deserialize, Serialize};

    fn headers(content_type: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
        headers
    }

    fn name_for(registry: &CodecRegistry, content_type: &'static str) -> String {
        registry
            .choose(&headers(content_type))
            .unwrap()
            .name()
            .to_string()
    }

    /// JSON behind a one-byte schema version prefix.
    #[derive(Debug)]
    struct VersionedJson {
        version: u8,
    }

    impl Codec for VersionedJson {
        fn name(&self) -> &str {
            "versioned-json"
        }

        fn content_type(&self) -> &str {
            "application/vnd.orders.v1+json"
        }

        fn encode_value(&self, value: &Value) -> Result<Bytes, CodecError> {
            let mut buffer = vec![self.version];
            serde_json::to_writer(&mut buffer, value)?;

            Ok(Bytes::from(buffer))
        }

        fn decode_value(&self, bytes: &[u8]) -> Result<Value, CodecError> {
            match bytes.split_first() {
                Some((version, rest)) if *version == self.version => {
                    Ok(serde_json::from_slice(rest)?)
                }
                _ => Err(CodecError::Custom(
                    format!("expected schema version {}", self.version).into(),
                )),
            }
        }
    }

    #[derive(Debug, Deserialize, PartialEq, Serialize)]
    struct Order {
        id: u64,
    }

    #[test]
    fn test_missing_header_uses_default() {
        let registry = CodecRegistry::new(cbor());

        assert_eq!(registry.choose(&HeaderMap::new()).unwrap().name(), "cbor");
        assert_eq!(name_for(&registry, ""), "cbor");
    }

    #[test]
    fn test_known_content_types() {
        let registry = CodecRegistry::default();

        assert_eq!(name_for(&registry, "application/json"), "json");
        assert_eq!(name_for(&registry, "application/cbor"), "cbor");
    }

    #[test]
    fn test_parameters_are_stripped() {
        let registry = CodecRegistry::default();

        assert_eq!(name_for(&registry, "application/json; charset=utf-8"), "json");
        assert_eq!(name_for(&registry, "Application/JSON"), "json");
    }

    #[test]
    fn test_unknown_content_type_never_defaults() {
        let registry = CodecRegistry::default();

        match registry.choose(&headers("application/xml")) {
            Err(Error::UnsupportedContentType(value)) => assert_eq!(value, "application/xml"),
            other => panic!("expected UnsupportedContentType, got {other:?}"),
        }
        assert!(matches!(
            registry.choose(&headers("not a mime type")),
            Err(Error::UnsupportedContentType(_))
        ));
    }

    #[test]
    fn test_register_alias() {
        let registry = CodecRegistry::default();
        assert!(registry.lookup("application/x-cbor").is_err());

        registry.register("application/x-cbor", cbor()).unwrap();

        assert_eq!(registry.lookup("application/x-cbor").unwrap().name(), "cbor");
    }

    #[test]
    fn test_register_custom_codec() {
        let registry = CodecRegistry::default();
        let codec: SharedCodec = Arc::new(VersionedJson { version: 1 });
        registry.register(codec.content_type(), Arc::clone(&codec)).unwrap();

        let chosen = registry
            .choose(&headers("application/vnd.orders.v1+json"))
            .unwrap();
        assert_eq!(chosen.name(), "versioned-json");

        let bytes = chosen.encode(&Order { id: 7 }).unwrap();
        assert_eq!(bytes, Bytes::from_static(b"\x01{\"id\":7}"));
        assert_eq!(chosen.decode::<Order>(&bytes).unwrap(), Order { id: 7 });

        assert!(matches!(
            chosen.decode::<Order>(b"{\"id\":7}"),
            Err(CodecError::Custom(_))
        ));
    }

    #[test]
    fn test_custom_default_codec_is_registered() {
        let registry = CodecRegistry::new(Arc::new(VersionedJson { version: 2 }));

        assert_eq!(registry.default_codec().name(), "versioned-json");
        assert_eq!(
            name_for(&registry, "application/vnd.orders.v1+json"),
            "versioned-json"
        );
        assert_eq!(name_for(&registry, "application/json"), "json");
    }
}
