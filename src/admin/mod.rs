//! Cache administration.
//!
//! The running proxy reserves [`CLEAR_CACHE_PATH`]: any request to it empties
//! the cache. [`trigger_clear`] is the other half, used by a separate short
//! lived invocation to hit that path on a proxy already listening locally.

use bytes::Bytes;
use http::Uri;
use http_body_util::{BodyExt, Empty};
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use thiserror::Error;
use tracing::info;

use crate::cache::CacheStore;
use crate::http::{Response, StatusCode};

/// Reserved path that clears the cache, whatever the method.
pub const CLEAR_CACHE_PATH: &str = "/admin/clear-cache";

/// Port `--clear-cache` targets when none is given.
pub const DEFAULT_ADMIN_PORT: u16 = 3000;

/// Body returned by the clear endpoint.
pub const CLEARED_BODY: &str = "Cache cleared.";

/// Returns `true` if `path` is the reserved admin path.
pub fn is_admin_path(path: &str) -> bool {
    path == CLEAR_CACHE_PATH
}

/// Empties `cache` and builds the confirmation response.
pub fn clear_cache(cache: &CacheStore) -> Response {
    let removed = cache.clear();
    info!(removed, "cache cleared");
    Response::new(StatusCode::OK).body(CLEARED_BODY)
}

/// Failures of the remote clear trigger.
#[derive(Debug, Error)]
pub enum AdminError {
    #[error("invalid admin URL {url:?}: {source}")]
    InvalidUri {
        url: String,
        #[source]
        source: http::uri::InvalidUri,
    },

    #[error("{0}")]
    Connect(#[from] hyper_util::client::legacy::Error),

    #[error("reading response: {0}")]
    Body(#[from] hyper::Error),
}

/// What the running proxy answered to a clear request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClearOutcome {
    pub status: StatusCode,
    pub body: String,
}

impl ClearOutcome {
    /// Returns `true` if the proxy acknowledged the clear with a 2xx.
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

/// URL of the clear endpoint on a local proxy listening on `port`.
pub fn clear_cache_url(port: u16) -> String {
    format!("http://localhost:{port}{CLEAR_CACHE_PATH}")
}

/// Asks the proxy on `localhost:<port>` to clear its cache.
///
/// # Errors
///
/// Returns [`AdminError::Connect`] when nothing is listening on the port, and
/// [`AdminError::Body`] when the connection drops mid-response.
pub async fn trigger_clear(port: u16) -> Result<ClearOutcome, AdminError> {
    let url = clear_cache_url(port);
    let uri: Uri = url
        .parse()
        .map_err(|source| AdminError::InvalidUri { url, source })?;

    let client = Client::builder(TokioExecutor::new()).build_http::<Empty<Bytes>>();
    let mut request = http::Request::new(Empty::new());
    *request.method_mut() = http::Method::POST;
    *request.uri_mut() = uri;

    let response = client.request(request).await?;
    let status = StatusCode::from_u16(response.status().as_u16());
    let body = response.into_body().collect().await?.to_bytes();

    Ok(ClearOutcome {
        status,
        body: String::from_utf8_lossy(&body).into_owned(),
    })
}
