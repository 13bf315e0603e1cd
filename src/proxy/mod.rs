//! Request routing: admin check, cache lookup, forward on miss.
//!
//! [`ProxyContext`] owns the process-wide state (the [`CacheStore`] and the
//! [`Forwarder`] with its connection pool). It is built once at startup and
//! shared with every connection task through an [`Arc`].

use std::sync::Arc;

use tracing::{debug, error};

use crate::admin;
use crate::cache::CacheStore;
use crate::config::ProxyConfig;
use crate::forward::Forwarder;
use crate::http::{Method, Request, Response, StatusCode};
use crate::server::{Server, ServerError};

/// Header reporting whether a response came from the cache.
pub const X_CACHE: &str = "X-Cache";

/// Body sent with a 502 when the origin could not be reached.
pub const FORWARD_ERROR_BODY: &str = "Error forwarding request.";

/// Shared state for the request handler.
pub struct ProxyContext {
    cache: CacheStore,
    forwarder: Forwarder,
}

impl ProxyContext {
    /// Creates a context with an empty cache that forwards misses through `forwarder`.
    pub fn new(forwarder: Forwarder) -> Self {
        Self {
            cache: CacheStore::new(),
            forwarder,
        }
    }

    /// Builds the context described by `config`.
    pub fn from_config(config: &ProxyConfig) -> Self {
        Self::new(Forwarder::new(config.origin.clone(), config.timeout))
    }

    /// The response cache.
    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    /// Handles one inbound request.
    ///
    /// A hit is always answered with `200` and the stored body: only bodies are
    /// cached, so the origin's status and headers are not replayed. Answers to
    /// `HEAD` carry no body and are relayed without being stored.
    pub async fn handle(&self, request: Request) -> Response {
        if admin::is_admin_path(request.path()) {
            return admin::clear_cache(&self.cache);
        }

        let key = request.path_and_query();
        debug!(method = %request.method(), key = %key, "received request");

        if let Some(body) = self.cache.lookup(&key) {
            debug!(key = %key, "cache hit");
            return Response::new(StatusCode::OK)
                .header(X_CACHE, "HIT")
                .body_bytes(body);
        }

        let origin = match self.forwarder.forward(&request).await {
            Ok(origin) => origin,
            Err(e) => {
                error!(key = %key, error = %e, "forwarding failed");
                return Response::new(StatusCode::BAD_GATEWAY).body(FORWARD_ERROR_BODY);
            }
        };

        debug!(key = %key, status = origin.status.as_u16(), "cache miss");
        if origin.status.is_success() && *request.method() != Method::Head {
            self.cache.insert(key, origin.body.clone());
        }

        let mut response = Response::new(origin.status).body_bytes(origin.body);
        response.headers_mut().overwrite_from(&origin.headers);
        response.set_header(X_CACHE, "MISS");
        response
    }
}

/// Runs the proxy on `server` until the process exits.
///
/// # Errors
///
/// Propagates listener failures from [`Server::run`].
pub async fn serve(server: Server, context: Arc<ProxyContext>) -> Result<(), ServerError> {
    server
        .run(move |request| {
            let context = Arc::clone(&context);
            async move { context.handle(request).await }
        })
        .await
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use bytes::Bytes;

    use super::*;

    fn parse(raw: &str) -> Request {
        Request::parse(raw.as_bytes()).unwrap().0
    }

    /// Context whose origin refuses every connection.
    async fn offline_context() -> ProxyContext {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        ProxyContext::new(Forwarder::new(
            format!("http://127.0.0.1:{port}"),
            Duration::from_secs(5),
        ))
    }

    #[tokio::test]
    async fn hit_served_without_origin() {
        let ctx = offline_context().await;
        ctx.cache().insert("/foo?x=1", Bytes::from_static(b"hello"));

        let response = ctx
            .handle(parse("DELETE /foo?x=1 HTTP/1.1\r\nHost: x\r\n\r\n"))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get("x-cache"), Some("HIT"));
        assert_eq!(response.payload().as_ref(), b"hello");
    }

    #[tokio::test]
    async fn hit_carries_no_content_type() {
        let ctx = offline_context().await;
        ctx.cache().insert("/foo", Bytes::from_static(b"hello"));

        let response = ctx
            .handle(parse("GET /foo HTTP/1.1\r\nHost: x\r\n\r\n"))
            .await;
        let wire = response.into_bytes();
        let text = std::str::from_utf8(&wire).unwrap();
        assert!(!text.to_ascii_lowercase().contains("content-type"));
        assert!(text.ends_with("\r\n\r\nhello"));
    }

    #[tokio::test]
    async fn origin_failure_is_502_and_not_cached() {
        let ctx = offline_context().await;

        let response = ctx
            .handle(parse("GET /foo HTTP/1.1\r\nHost: x\r\n\r\n"))
            .await;
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(response.payload().as_ref(), FORWARD_ERROR_BODY.as_bytes());
        assert!(ctx.cache().is_empty());
    }

    #[tokio::test]
    async fn admin_path_clears_for_any_method() {
        let ctx = offline_context().await;
        for method in ["GET", "POST", "PURGE"] {
            ctx.cache().insert("/foo", Bytes::from_static(b"x"));
            let raw = format!("{method} /admin/clear-cache?now=1 HTTP/1.1\r\nHost: x\r\n\r\n");
            let response = ctx.handle(parse(&raw)).await;
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(response.payload().as_ref(), b"Cache cleared.");
            assert!(response.headers().get("x-cache").is_none());
            assert!(ctx.cache().is_empty());
        }
    }
}
