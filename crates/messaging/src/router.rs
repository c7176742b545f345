use crate::error::{Error, Result};
use crate::handler::{BoxHandler, Handler};
use crate::message::Message;
use crate::middleware::Middleware;
use crate::subject::Pattern;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// A set of subject patterns bound to a handler.
pub struct Route {
    handler: BoxHandler,
    patterns: Vec<Pattern>,
}

impl Route {
    /// Compiles `patterns` and binds them to `handler`.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidPattern` if any pattern is malformed.
    pub fn new<I, S>(patterns: I, handler: BoxHandler) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .map(|pattern| Pattern::parse(pattern.as_ref()))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { handler, patterns })
    }

    /// The compiled patterns.
    #[must_use]
    pub fn patterns(&self) -> &[Pattern] {
        &self.patterns
    }

    /// Whether any of the route's patterns matches `subject`.
    #[must_use]
    pub fn matches(&self, subject: &str) -> bool {
        self.patterns.iter().any(|pattern| pattern.matches(subject))
    }

    /// The bound handler.
    #[must_use]
    pub const fn handler(&self) -> &BoxHandler {
        &self.handler
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("patterns", &self.patterns)
            .finish_non_exhaustive()
    }
}

/// Dispatches messages to the first registered route whose patterns match.
///
/// Routes are tried in registration order and the first match wins; overlapping
/// patterns are not ranked by specificity. Registration takes `&mut self`, so a
/// router shared behind an `Arc` for dispatch can no longer be changed.
#[derive(Debug, Default)]
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    /// Creates an empty router.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a route.
    pub fn add(&mut self, route: Route) -> &mut Self {
        self.routes.push(route);
        self
    }

    /// Builder-style registration of `handler` for `patterns`.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidPattern` if any pattern is malformed.
    pub fn route<I, S>(mut self, patterns: I, handler: BoxHandler) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.routes.push(Route::new(patterns, handler)?);
        Ok(self)
    }

    /// The first route matching `subject`.
    #[must_use]
    pub fn find(&self, subject: &str) -> Option<&Route> {
        self.routes.iter().find(|route| route.matches(subject))
    }

    /// Number of registered routes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Whether no routes are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Turns the router into middleware that falls through to the next handler
    /// on a routing miss.
    #[must_use]
    pub fn into_middleware(self) -> Routing {
        Routing {
            router: Arc::new(self),
        }
    }
}

#[async_trait]
impl Handler for Router {
    async fn handle(&self, cancel: CancellationToken, message: Message) -> Result<()> {
        match self.find(message.subject()) {
            Some(route) => route.handler.handle(cancel, message).await,
            None => {
                debug!("no route found for subject {}", message.subject());
                Err(Error::NoRouteFound {
                    subject: message.subject().to_string(),
                })
            }
        }
    }
}

/// Middleware form of a [`Router`].
///
/// Subjects matching a route go to that route and its result, error or not, is
/// returned as is. Subjects matching no route go to the next handler.
#[derive(Clone, Debug)]
pub struct Routing {
    router: Arc<Router>,
}

impl Routing {
    /// Wraps a shared router.
    #[must_use]
    pub const fn new(router: Arc<Router>) -> Self {
        Self { router }
    }
}

impl Middleware for Routing {
    fn layer(&self, next: BoxHandler) -> BoxHandler {
        Arc::new(RoutingHandler {
            next,
            router: self.router.clone(),
        })
    }
}

struct RoutingHandler {
    next: BoxHandler,
    router: Arc<Router>,
}

#[async_trait]
impl Handler for RoutingHandler {
    async fn handle(&self, cancel: CancellationToken, message: Message) -> Result<()> {
        match self.router.find(message.subject()) {
            Some(route) => route.handler.handle(cancel, message).await,
            None => self.next.handle(cancel, message).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::handler::handler_fn;
    use crate::middleware::Chain;

    use http::HeaderMap;
    use parking_lot::Mutex;

    fn recording(label: &'static str, calls: &Arc<Mutex<Vec<String>>>) -> BoxHandler {
        let calls = calls.clone();
        handler_fn(move |_, message: Message| {
            let calls = calls.clone();
            async move {
                calls
                    .lock()
                    .push(format!("{label}:{}", message.subject()));
                Ok(())
            }
        })
    }

    fn failing() -> BoxHandler {
        handler_fn(|_, _| async { Err(Error::handler("route failed")) })
    }

    fn message(subject: &str) -> Message {
        Message::new(subject, HeaderMap::new(), "")
    }

    #[tokio::test]
    async fn test_first_match_wins() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let router = Router::new()
            .route(["x.*"], recording("first", &calls))
            .unwrap()
            .route(["x.y"], recording("second", &calls))
            .unwrap();

        router
            .handle(CancellationToken::new(), message("x.y"))
            .await
            .unwrap();

        assert_eq!(*calls.lock(), vec!["first:x.y".to_string()]);
    }

    #[tokio::test]
    async fn test_any_pattern_in_set_matches() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let router = Router::new()
            .route(["orders.created", "orders.*.retry"], recording("orders", &calls))
            .unwrap();

        router
            .handle(CancellationToken::new(), message("orders.created"))
            .await
            .unwrap();
        router
            .handle(CancellationToken::new(), message("orders.7.retry"))
            .await
            .unwrap();

        assert_eq!(calls.lock().len(), 2);
    }

    #[tokio::test]
    async fn test_no_route_found_carries_subject() {
        let router = Router::new()
            .route(["a.>"], handler_fn(|_, _| async { Ok(()) }))
            .unwrap();

        match router.handle(CancellationToken::new(), message("a")).await {
            Err(Error::NoRouteFound { subject }) => assert_eq!(subject, "a"),
            other => panic!("expected NoRouteFound, got {other:?}"),
        }
    }

    #[test]
    fn test_invalid_pattern_rejected_at_registration() {
        let result = Router::new().route(["a.>.b"], handler_fn(|_, _| async { Ok(()) }));

        assert!(matches!(result, Err(Error::InvalidPattern { .. })));
    }

    #[test]
    fn test_add_appends_in_order() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut router = Router::new();
        router
            .add(Route::new(["a"], recording("a", &calls)).unwrap())
            .add(Route::new(["b"], recording("b", &calls)).unwrap());

        assert_eq!(router.len(), 2);
        assert_eq!(router.find("b").unwrap().patterns()[0].as_str(), "b");
        assert!(router.find("c").is_none());
    }

    #[tokio::test]
    async fn test_routing_middleware_falls_through_on_miss() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let router = Router::new()
            .route(["orders.*"], recording("orders", &calls))
            .unwrap();
        let handler = Chain::new()
            .with(router.into_middleware())
            .handler(recording("fallback", &calls));

        handler
            .handle(CancellationToken::new(), message("orders.new"))
            .await
            .unwrap();
        handler
            .handle(CancellationToken::new(), message("users.new"))
            .await
            .unwrap();

        assert_eq!(
            *calls.lock(),
            vec!["orders:orders.new".to_string(), "fallback:users.new".to_string()]
        );
    }

    #[tokio::test]
    async fn test_routing_middleware_propagates_route_errors() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let router = Router::new().route(["orders.*"], failing()).unwrap();
        let handler = Chain::new()
            .with(router.into_middleware())
            .handler(recording("fallback", &calls));

        let result = handler
            .handle(CancellationToken::new(), message("orders.new"))
            .await;

        assert!(matches!(result, Err(Error::Handler(_))));
        assert!(calls.lock().is_empty());
    }
}
