//! Origin forwarding.
//!
//! [`Forwarder`] turns an inbound [`Request`] into a request against the
//! configured origin and buffers the full answer into an [`OriginResponse`].
//! All forwards share one pooled `hyper` client, so connections to the origin
//! are reused across requests.

use std::time::Duration;

use bytes::Bytes;
use http::header::{HeaderMap, HeaderName, HeaderValue};
use http::uri::InvalidUri;
use http::{Uri, method::InvalidMethod};
use http_body_util::{BodyExt, Full};
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use thiserror::Error;
use tracing::debug;

use crate::http::{Headers, Request, StatusCode};

/// Applied to the whole exchange (connect, send, read body) when no other
/// timeout is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(100);

type PooledClient = Client<HttpsConnector<HttpConnector>, Full<Bytes>>;

/// Reasons a forward can fail. Every variant is reported to the client as a 502.
#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("invalid target URL {url:?}: {source}")]
    InvalidUri {
        url: String,
        #[source]
        source: InvalidUri,
    },

    #[error("method not representable upstream: {0}")]
    InvalidMethod(#[from] InvalidMethod),

    #[error("origin request failed: {0}")]
    Request(#[from] hyper_util::client::legacy::Error),

    #[error("origin response body failed: {0}")]
    Body(#[from] hyper::Error),

    #[error("origin did not answer within {0:?}")]
    Timeout(Duration),
}

/// The origin's answer, fully buffered.
#[derive(Debug, Clone)]
pub struct OriginResponse {
    pub status: StatusCode,
    /// Response and content headers, in the order the origin sent them.
    pub headers: Headers,
    pub body: Bytes,
}

/// Sends cache misses to a single origin over a shared connection pool.
#[derive(Clone)]
pub struct Forwarder {
    client: PooledClient,
    origin: String,
    timeout: Duration,
}

impl Forwarder {
    /// Creates a forwarder for `origin` (scheme + authority, optionally a base
    /// path, with no trailing slash).
    pub fn new(origin: impl Into<String>, timeout: Duration) -> Self {
        let connector = hyper_rustls::HttpsConnectorBuilder::new()
            .with_webpki_roots()
            .https_or_http()
            .enable_http1()
            .build();

        Self {
            client: Client::builder(TokioExecutor::new()).build(connector),
            origin: origin.into(),
            timeout,
        }
    }

    /// Builds the upstream URL for `path_and_query`. No re-encoding is applied.
    pub fn target_url(&self, path_and_query: &str) -> String {
        format!("{}{}", self.origin, path_and_query)
    }

    /// Forwards `request` to the origin and buffers the response.
    ///
    /// # Errors
    ///
    /// Returns a [`ForwardError`] when the target URL or method cannot be
    /// expressed, the connection fails, the body is cut short, or the exchange
    /// exceeds the configured timeout.
    pub async fn forward(&self, request: &Request) -> Result<OriginResponse, ForwardError> {
        let url = self.target_url(&request.path_and_query());
        let uri: Uri = url
            .parse()
            .map_err(|source| ForwardError::InvalidUri { url, source })?;
        let method = http::Method::from_bytes(request.method().as_str().as_bytes())?;

        let mut outbound = http::Request::new(Full::new(request.body().clone()));
        *outbound.method_mut() = method;
        *outbound.uri_mut() = uri;
        *outbound.headers_mut() = outbound_headers(request.headers());

        let exchange = async {
            let response = self.client.request(outbound).await?;
            let (parts, body) = response.into_parts();
            let body = body.collect().await?.to_bytes();
            Ok::<_, ForwardError>((parts, body))
        };

        let (parts, body) = tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| ForwardError::Timeout(self.timeout))??;

        let mut headers = Headers::with_capacity(parts.headers.len());
        for (name, value) in &parts.headers {
            headers.insert(name.as_str(), String::from_utf8_lossy(value.as_bytes()));
        }

        Ok(OriginResponse {
            status: StatusCode::from_u16(parts.status.as_u16()),
            headers,
            body,
        })
    }
}

/// Copies inbound headers for the upstream request, leaving out `Host` so the
/// client derives it from the origin URL.
///
/// Entries the `http` crate refuses to represent are skipped rather than
/// failing the whole request.
fn outbound_headers(inbound: &Headers) -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(inbound.len());
    for (name, value) in inbound.iter() {
        if name.eq_ignore_ascii_case("host") {
            continue;
        }
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_bytes(value.as_bytes()),
        ) {
            (Ok(name), Ok(value)) => {
                headers.append(name, value);
            }
            _ => debug!(header = name, "skipping header the client cannot carry"),
        }
    }
    headers
}
