//! HTTP/1.1 request parsing using the [`httparse`] crate.

use bytes::{Bytes, BytesMut};
use thiserror::Error;
use tracing::debug;

use super::{Headers, Method};

/// Errors that can occur while parsing an HTTP/1.1 request.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("request is incomplete — more data needed")]
    Incomplete,

    #[error("HTTP parse error: {0}")]
    Parse(#[from] httparse::Error),

    #[error("missing required field: {field}")]
    MissingField { field: &'static str },

    #[error("invalid Content-Length header: {value:?}")]
    InvalidContentLength { value: String },

    #[error("unsupported Transfer-Encoding: {value:?}")]
    UnsupportedTransferEncoding { value: String },

    #[error("malformed chunked body")]
    InvalidChunk,
}

/// A fully parsed HTTP/1.1 request.
///
/// Created by [`Request::parse`] from a raw byte buffer. The path and query
/// are kept exactly as they appeared on the request line, since the proxy
/// forwards and caches them verbatim.
///
/// # Examples
///
/// ```
/// use caching_proxy::http::request::Request;
///
/// let raw = b"GET /hello?b=2&a=1 HTTP/1.1\r\nHost: localhost\r\n\r\n";
/// let (request, _len) = Request::parse(raw).unwrap();
///
/// assert_eq!(request.method().as_str(), "GET");
/// assert_eq!(request.path(), "/hello");
/// assert_eq!(request.query_string(), Some("b=2&a=1"));
/// assert_eq!(request.path_and_query(), "/hello?b=2&a=1");
/// ```
#[derive(Debug)]
pub struct Request {
    method: Method,
    path: String,
    /// HTTP minor version: 0 for HTTP/1.0, 1 for HTTP/1.1.
    version: u8,
    headers: Headers,
    query: Option<String>,
    body: Bytes,
}

impl Request {
    /// Maximum number of headers we support per request.
    const MAX_HEADERS: usize = 64;

    /// Parse a raw HTTP/1.1 request from a byte slice.
    ///
    /// Returns the parsed `Request` and the total number of bytes it occupies
    /// in `buf` (head plus framed body), so the caller can drop exactly that
    /// much from its read buffer.
    ///
    /// Bodies are framed by `Transfer-Encoding: chunked` when present, otherwise
    /// by `Content-Length`. A chunked body is decoded, and the request no longer
    /// carries `Transfer-Encoding` or `Content-Length` afterwards: it describes
    /// the decoded bytes.
    ///
    /// # Errors
    ///
    /// - [`RequestError::Incomplete`] — the head or the declared body has not fully arrived.
    /// - [`RequestError::Parse`] — the data is malformed and cannot be parsed.
    /// - [`RequestError::MissingField`] — a required field (method, path, version) is absent.
    /// - [`RequestError::InvalidContentLength`] — `Content-Length` is not a number.
    /// - [`RequestError::UnsupportedTransferEncoding`] — the final coding is not `chunked`.
    /// - [`RequestError::InvalidChunk`] — the chunked body is malformed.
    pub fn parse(buf: &[u8]) -> Result<(Self, usize), RequestError> {
        let mut headers = [httparse::EMPTY_HEADER; Self::MAX_HEADERS];
        let mut raw_req = httparse::Request::new(&mut headers);

        let body_offset = match raw_req.parse(buf)? {
            httparse::Status::Complete(offset) => offset,
            httparse::Status::Partial => return Err(RequestError::Incomplete),
        };

        let method: Method = match raw_req.method {
            Some(m) => m.parse().unwrap_or_else(|never| match never {}),
            None => return Err(RequestError::MissingField { field: "method" }),
        };

        let raw_path = raw_req
            .path
            .ok_or(RequestError::MissingField { field: "path" })?;

        let (path, query) = match raw_path.split_once('?') {
            Some((path, query)) => (path.to_owned(), Some(query.to_owned())),
            None => (raw_path.to_owned(), None),
        };

        let version = raw_req
            .version
            .ok_or(RequestError::MissingField { field: "version" })?;

        let mut header_map = Headers::with_capacity(raw_req.headers.len());
        for header in raw_req.headers.iter() {
            match std::str::from_utf8(header.value) {
                Ok(value) => header_map.insert(header.name, value),
                Err(_) => debug!(header = header.name, "dropping non UTF-8 header value"),
            }
        }

        let (body, total_len) = match header_map.get("transfer-encoding") {
            Some(coding) => {
                let last = coding.rsplit(',').next().unwrap_or("").trim();
                if !last.eq_ignore_ascii_case("chunked") {
                    return Err(RequestError::UnsupportedTransferEncoding {
                        value: coding.to_owned(),
                    });
                }
                let (body, body_len) = decode_chunked(&buf[body_offset..])?;
                header_map.remove("transfer-encoding");
                header_map.remove("content-length");
                (body, body_offset + body_len)
            }
            None => {
                let content_length = match header_map.get("content-length") {
                    Some(value) => value.trim().parse::<usize>().map_err(|_| {
                        RequestError::InvalidContentLength {
                            value: value.to_owned(),
                        }
                    })?,
                    None => 0,
                };

                let total_len = body_offset + content_length;
                if buf.len() < total_len {
                    return Err(RequestError::Incomplete);
                }
                (Bytes::copy_from_slice(&buf[body_offset..total_len]), total_len)
            }
        };

        Ok((
            Self {
                method,
                path,
                version,
                headers: header_map,
                query,
                body,
            },
            total_len,
        ))
    }

    /// Returns the HTTP method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Returns the request path (without the query string).
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the HTTP minor version number (0 = HTTP/1.0, 1 = HTTP/1.1).
    pub fn version(&self) -> u8 {
        self.version
    }

    /// Returns the request headers.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Returns the raw query string (without the leading `?`), if any.
    pub fn query_string(&self) -> Option<&str> {
        self.query.as_deref()
    }

    /// Returns the path followed by `?` and the query string, exactly as received.
    pub fn path_and_query(&self) -> String {
        match &self.query {
            Some(query) => format!("{}?{}", self.path, query),
            None => self.path.clone(),
        }
    }

    /// Returns the request body bytes.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Returns `true` if the connection should be kept alive after this request.
    ///
    /// HTTP/1.1 defaults to keep-alive. HTTP/1.0 defaults to close unless
    /// `Connection: keep-alive` is explicitly set.
    pub fn is_keep_alive(&self) -> bool {
        match self.headers.get("connection") {
            Some(conn) => {
                let has = |token: &str| {
                    conn.split(',')
                        .any(|t| t.trim().eq_ignore_ascii_case(token))
                };
                if has("close") {
                    false
                } else {
                    has("keep-alive") || self.version == 1
                }
            }
            None => self.version == 1, // HTTP/1.1 default: keep-alive
        }
    }
}

/// Decodes a chunked body at the start of `buf`.
///
/// Returns the decoded bytes and the number of raw bytes consumed, up to and
/// including the blank line after any trailers. Trailers are discarded.
fn decode_chunked(buf: &[u8]) -> Result<(Bytes, usize), RequestError> {
    let mut body = BytesMut::new();
    let mut pos = 0;

    loop {
        let (line_len, size) = match httparse::parse_chunk_size(&buf[pos..]) {
            Ok(httparse::Status::Complete(pair)) => pair,
            Ok(httparse::Status::Partial) => return Err(RequestError::Incomplete),
            Err(_) => return Err(RequestError::InvalidChunk),
        };
        pos += line_len;

        if size == 0 {
            break;
        }

        let size = usize::try_from(size).map_err(|_| RequestError::InvalidChunk)?;
        let data_end = pos.checked_add(size).ok_or(RequestError::InvalidChunk)?;
        let chunk_end = data_end.checked_add(2).ok_or(RequestError::InvalidChunk)?;
        if buf.len() < chunk_end {
            return Err(RequestError::Incomplete);
        }
        if &buf[data_end..chunk_end] != b"\r\n" {
            return Err(RequestError::InvalidChunk);
        }

        body.extend_from_slice(&buf[pos..data_end]);
        pos = chunk_end;
    }

    let mut trailers = [httparse::EMPTY_HEADER; Request::MAX_HEADERS];
    match httparse::parse_headers(&buf[pos..], &mut trailers) {
        Ok(httparse::Status::Complete((len, _))) => Ok((body.freeze(), pos + len)),
        Ok(httparse::Status::Partial) => Err(RequestError::Incomplete),
        Err(_) => Err(RequestError::InvalidChunk),
    }
}
