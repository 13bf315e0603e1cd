//! HTTP/1.1 response builder.
//!
//! Provides a fluent builder API for constructing HTTP responses and
//! serializing them to a byte buffer for transmission over TCP.

use bytes::{BufMut, Bytes, BytesMut};

use super::{Headers, StatusCode};

/// Headers describing message framing. The serializer always writes its own,
/// because bodies are fully buffered by the time they reach a `Response`.
const FRAMING_HEADERS: [&str; 3] = ["content-length", "transfer-encoding", "connection"];

/// An HTTP/1.1 response, ready to be serialized and sent.
///
/// # Examples
///
/// ```
/// use caching_proxy::http::{Response, StatusCode};
///
/// let response = Response::new(StatusCode::OK)
///     .header("Content-Type", "application/json")
///     .body(r#"{"status":"ok"}"#);
///
/// let bytes = response.into_bytes();
/// let text = std::str::from_utf8(&bytes).unwrap();
/// assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
/// assert!(text.contains("Content-Length: 15\r\n"));
/// ```
#[derive(Debug)]
pub struct Response {
    status: StatusCode,
    headers: Headers,
    body: Bytes,
    /// Set by [`body`](Self::body): the serializer labels it as text.
    text: bool,
    head: bool,
    keep_alive: bool,
}

impl Response {
    /// Creates a new response with the given status and an empty body.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: Headers::new(),
            body: Bytes::new(),
            text: false,
            head: false,
            keep_alive: true,
        }
    }

    /// Appends a response header. Multiple calls with the same name are additive.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Sets a header in-place, replacing any values already present under that name.
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.set(name, value);
    }

    /// Mutable access to the header map, for bulk copies.
    pub fn headers_mut(&mut self) -> &mut Headers {
        &mut self.headers
    }

    /// Sets the response body from a string.
    ///
    /// The `Content-Length` header is written automatically by [`into_bytes`](Self::into_bytes),
    /// and `Content-Type: text/plain` unless another type is set.
    #[must_use]
    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = Bytes::from(body.into());
        self.text = true;
        self
    }

    /// Sets the response body from raw bytes. No `Content-Type` is implied.
    #[must_use]
    pub fn body_bytes(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self.text = false;
        self
    }

    /// Marks this as the answer to a `HEAD` request.
    ///
    /// The head is written as it would be for `GET`, including the
    /// `Content-Length` of the body, but the body itself is not sent. With an
    /// empty body, a caller-supplied `Content-Length` is kept instead of `0`.
    #[must_use]
    pub fn head(mut self, head: bool) -> Self {
        self.head = head;
        self
    }

    /// Controls whether the `Connection: keep-alive` or `Connection: close` header is written.
    #[must_use]
    pub fn keep_alive(mut self, keep_alive: bool) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    /// Returns the status code of this response.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Returns the response headers.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Returns the response body.
    pub fn payload(&self) -> &Bytes {
        &self.body
    }

    /// Serializes the response into a `BytesMut` buffer using HTTP/1.1 wire format.
    ///
    /// Automatically adds:
    /// - `Content-Type: text/plain; charset=utf-8` if the body was set with
    ///   [`body`](Self::body), is non-empty and no `Content-Type` header was set.
    /// - `Content-Length: <n>` (always written, replacing any caller-supplied
    ///   value except for a bodiless `HEAD` answer).
    /// - `Connection: keep-alive` or `Connection: close`.
    ///
    /// Any `Transfer-Encoding` header is dropped since the body is sent whole.
    pub fn into_bytes(mut self) -> BytesMut {
        let declared = self
            .headers
            .get("content-length")
            .and_then(|v| v.trim().parse::<usize>().ok());
        let content_length = match declared {
            Some(n) if self.head && self.body.is_empty() => n,
            _ => self.body.len(),
        };

        for name in FRAMING_HEADERS {
            self.headers.remove(name);
        }

        if self.text && !self.body.is_empty() && !self.headers.contains("content-type") {
            self.headers
                .insert("Content-Type", "text/plain; charset=utf-8");
        }

        let connection = if self.keep_alive {
            "keep-alive"
        } else {
            "close"
        };
        self.headers.insert("Connection", connection);

        let estimated_size = 128 + self.headers.len() * 64 + self.body.len();
        let mut buf = BytesMut::with_capacity(estimated_size);

        // Status line
        buf.put(
            format!(
                "HTTP/1.1 {} {}\r\n",
                self.status.as_u16(),
                self.status.canonical_reason()
            )
            .as_bytes(),
        );

        // Headers
        for (name, value) in self.headers.iter() {
            buf.put(format!("{name}: {value}\r\n").as_bytes());
        }

        // Content-Length is always the last header before the blank line
        buf.put(format!("Content-Length: {content_length}\r\n").as_bytes());

        // Header/body separator
        buf.put(&b"\r\n"[..]);

        if !self.head && !self.body.is_empty() {
            buf.put(self.body);
        }

        buf
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::new(StatusCode::OK)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn to_string(bytes: BytesMut) -> String {
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[test]
    fn simple_ok_response() {
        let r = Response::new(StatusCode::OK).body("Hello");
        let s = to_string(r.into_bytes());
        assert!(s.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(s.contains("Content-Length: 5\r\n"));
        assert!(s.ends_with("\r\n\r\nHello"));
    }

    #[test]
    fn set_header_overwrites() {
        let mut r = Response::new(StatusCode::OK).header("X-Cache", "HIT");
        r.set_header("x-cache", "MISS");
        let s = to_string(r.into_bytes());
        assert!(s.contains("x-cache: MISS\r\n"));
        assert!(!s.contains("HIT"));
    }

    #[test]
    fn framing_headers_replaced() {
        let r = Response::new(StatusCode::OK)
            .header("content-length", "999")
            .header("transfer-encoding", "chunked")
            .header("connection", "upgrade")
            .body("abc");
        let s = to_string(r.into_bytes());
        assert!(s.contains("Content-Length: 3\r\n"));
        assert!(!s.contains("999"));
        assert!(!s.contains("chunked"));
        assert!(s.contains("Connection: keep-alive\r\n"));
        assert!(!s.contains("upgrade"));
    }

    #[test]
    fn no_body_no_content_type() {
        let r = Response::new(StatusCode::NO_CONTENT);
        let s = to_string(r.into_bytes());
        assert!(!s.contains("Content-Type"));
        assert!(s.contains("Content-Length: 0\r\n"));
    }

    #[test]
    fn byte_bodies_get_no_content_type() {
        let r = Response::new(StatusCode::OK).body_bytes(&b"raw"[..]);
        let s = to_string(r.into_bytes());
        assert!(!s.contains("Content-Type"));
        assert!(s.ends_with("\r\n\r\nraw"));
    }

    #[test]
    fn head_answer_has_length_but_no_body() {
        let r = Response::new(StatusCode::OK).body("hello").head(true);
        let s = to_string(r.into_bytes());
        assert!(s.contains("Content-Length: 5\r\n"));
        assert!(s.ends_with("\r\n\r\n"));
    }

    #[test]
    fn bodiless_head_answer_keeps_declared_length() {
        let r = Response::new(StatusCode::OK)
            .header("Content-Length", "42")
            .head(true);
        let s = to_string(r.into_bytes());
        assert!(s.contains("Content-Length: 42\r\n"));
        assert_eq!(s.matches("Content-Length").count(), 1);

        let r = Response::new(StatusCode::OK).header("Content-Length", "42");
        let s = to_string(r.into_bytes());
        assert!(s.contains("Content-Length: 0\r\n"));
    }

    #[test]
    fn connection_close() {
        let r = Response::new(StatusCode::OK).keep_alive(false);
        let s = to_string(r.into_bytes());
        assert!(s.contains("Connection: close\r\n"));
    }

    #[test]
    fn unregistered_status_line() {
        let r = Response::new(StatusCode::from_u16(299));
        let s = to_string(r.into_bytes());
        assert!(s.starts_with("HTTP/1.1 299 \r\n"));
    }
}
