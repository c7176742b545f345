use super::Middleware;
use crate::codec::Codec;
use crate::error::Result;
use crate::handler::{BoxHandler, Handler};
use crate::message::Message;

use std::sync::Arc;

use async_trait::async_trait;
use http::HeaderValue;
use http::header::CONTENT_TYPE;
use tokio_util::sync::CancellationToken;

/// Sets `Content-Type` on inbound messages that have none.
///
/// A header that is present, even with an empty value, is left untouched.
#[derive(Clone, Debug)]
pub struct DefaultContentType {
    value: HeaderValue,
}

impl DefaultContentType {
    /// Defaults to `value`.
    #[must_use]
    pub const fn new(value: HeaderValue) -> Self {
        Self { value }
    }

    /// Defaults to the content type of `codec`.
    ///
    /// # Errors
    ///
    /// Returns `Error::UnsupportedContentType` if the codec's tag is not a
    /// valid header value.
    pub fn for_codec(codec: &dyn Codec) -> Result<Self> {
        Ok(Self::new(codec.content_type_header()?))
    }
}

impl Middleware for DefaultContentType {
    fn layer(&self, next: BoxHandler) -> BoxHandler {
        Arc::new(DefaultContentTypeHandler {
            next,
            value: self.value.clone(),
        })
    }
}

struct DefaultContentTypeHandler {
    next: BoxHandler,
    value: HeaderValue,
}

#[async_trait]
impl Handler for DefaultContentTypeHandler {
    async fn handle(&self, cancel: CancellationToken, message: Message) -> Result<()> {
        let message = if message.headers().contains_key(CONTENT_TYPE) {
            message
        } else {
            message.with_header(CONTENT_TYPE, self.value.clone())
        };

        self.next.handle(cancel, message).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::codec::cbor;
    use crate::handler::handler_fn;

    use http::HeaderMap;
    use parking_lot::Mutex;

    async fn observed_content_type(headers: HeaderMap) -> Option<String> {
        let seen = Arc::new(Mutex::new(None));
        let inner = {
            let seen = seen.clone();
            handler_fn(move |_, message: Message| {
                let seen = seen.clone();
                async move {
                    *seen.lock() = message.content_type().map(str::to_string);
                    Ok(())
                }
            })
        };

        DefaultContentType::for_codec(cbor().as_ref())
            .unwrap()
            .layer(inner)
            .handle(CancellationToken::new(), Message::new("a", headers, ""))
            .await
            .unwrap();

        seen.lock().take()
    }

    #[tokio::test]
    async fn test_sets_missing_content_type() {
        assert_eq!(
            observed_content_type(HeaderMap::new()).await.as_deref(),
            Some("application/cbor")
        );
    }

    #[tokio::test]
    async fn test_keeps_explicit_content_type() {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        assert_eq!(
            observed_content_type(headers).await.as_deref(),
            Some("application/json")
        );
    }

    #[tokio::test]
    async fn test_keeps_present_but_empty_content_type() {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(""));

        assert_eq!(observed_content_type(headers).await.as_deref(), Some(""));
    }
}
