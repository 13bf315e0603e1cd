//! HTTP/1.1 protocol types and parsing.
//!
//! This module provides the primitives shared by the listener and the proxy:
//! [`Method`], [`StatusCode`], [`Headers`], [`Request`], and [`Response`].

use std::fmt;

pub mod headers;
pub mod request;
pub mod response;

pub use headers::Headers;
pub use request::Request;
pub use response::Response;

/// An HTTP response status code.
///
/// Origins may answer with any three-digit code, so this is a thin wrapper
/// over `u16` rather than a closed enum. The codes the proxy produces itself
/// are available as associated constants.
///
/// # Examples
///
/// ```
/// use caching_proxy::http::StatusCode;
///
/// let status = StatusCode::OK;
/// assert_eq!(status.as_u16(), 200);
/// assert_eq!(status.canonical_reason(), "OK");
/// assert!(status.is_success());
/// assert!(!StatusCode::from_u16(418).is_success());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StatusCode(u16);

impl StatusCode {
    pub const OK: Self = Self(200);
    pub const NO_CONTENT: Self = Self(204);
    pub const BAD_REQUEST: Self = Self(400);
    pub const NOT_FOUND: Self = Self(404);
    pub const PAYLOAD_TOO_LARGE: Self = Self(413);
    pub const BAD_GATEWAY: Self = Self(502);

    /// Wraps a raw status code.
    pub const fn from_u16(code: u16) -> Self {
        Self(code)
    }

    /// Returns the numeric status code as a `u16`.
    pub fn as_u16(self) -> u16 {
        self.0
    }

    /// Returns `true` for codes in the 2xx range.
    pub fn is_success(self) -> bool {
        (200..300).contains(&self.0)
    }

    /// Returns the canonical reason phrase, or an empty string for codes
    /// without a registered phrase.
    pub fn canonical_reason(self) -> &'static str {
        match self.0 {
            100 => "Continue",
            101 => "Switching Protocols",
            200 => "OK",
            201 => "Created",
            202 => "Accepted",
            203 => "Non-Authoritative Information",
            204 => "No Content",
            206 => "Partial Content",
            301 => "Moved Permanently",
            302 => "Found",
            303 => "See Other",
            304 => "Not Modified",
            307 => "Temporary Redirect",
            308 => "Permanent Redirect",
            400 => "Bad Request",
            401 => "Unauthorized",
            403 => "Forbidden",
            404 => "Not Found",
            405 => "Method Not Allowed",
            409 => "Conflict",
            410 => "Gone",
            411 => "Length Required",
            413 => "Payload Too Large",
            414 => "URI Too Long",
            415 => "Unsupported Media Type",
            418 => "I'm a teapot",
            422 => "Unprocessable Entity",
            429 => "Too Many Requests",
            500 => "Internal Server Error",
            501 => "Not Implemented",
            502 => "Bad Gateway",
            503 => "Service Unavailable",
            504 => "Gateway Timeout",
            505 => "HTTP Version Not Supported",
            _ => "",
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = self.canonical_reason();
        if reason.is_empty() {
            write!(f, "{}", self.0)
        } else {
            write!(f, "{} {}", self.0, reason)
        }
    }
}

impl From<StatusCode> for u16 {
    fn from(code: StatusCode) -> u16 {
        code.as_u16()
    }
}

impl From<u16> for StatusCode {
    fn from(code: u16) -> Self {
        Self(code)
    }
}

/// An HTTP request method.
///
/// Standard methods are represented as unit variants for zero-cost comparison.
/// Non-standard methods are captured in the `Custom` variant and forwarded
/// upstream unchanged.
///
/// # Examples
///
/// ```
/// use caching_proxy::http::Method;
///
/// let method: Method = "PURGE".parse().unwrap();
/// assert_eq!(method, Method::Custom("PURGE".to_owned()));
/// assert_eq!(method.as_str(), "PURGE");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
    Head,
    Options,
    Patch,
    Connect,
    Trace,
    /// A non-standard extension method.
    Custom(String),
}

impl Method {
    /// Returns the method as a string slice.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
            Self::Head => "HEAD",
            Self::Options => "OPTIONS",
            Self::Patch => "PATCH",
            Self::Connect => "CONNECT",
            Self::Trace => "TRACE",
            Self::Custom(s) => s.as_str(),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Method {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "GET" => Self::Get,
            "POST" => Self::Post,
            "PUT" => Self::Put,
            "DELETE" => Self::Delete,
            "HEAD" => Self::Head,
            "OPTIONS" => Self::Options,
            "PATCH" => Self::Patch,
            "CONNECT" => Self::Connect,
            "TRACE" => Self::Trace,
            other => Self::Custom(other.to_owned()),
        })
    }
}

impl AsRef<str> for Method {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_range() {
        assert!(StatusCode::from_u16(200).is_success());
        assert!(StatusCode::from_u16(299).is_success());
        assert!(!StatusCode::from_u16(199).is_success());
        assert!(!StatusCode::from_u16(304).is_success());
        assert!(!StatusCode::BAD_GATEWAY.is_success());
    }

    #[test]
    fn unregistered_code_has_empty_reason() {
        let status = StatusCode::from_u16(599);
        assert_eq!(status.canonical_reason(), "");
        assert_eq!(status.to_string(), "599");
    }

    #[test]
    fn standard_and_custom_methods() {
        assert_eq!("GET".parse::<Method>().unwrap(), Method::Get);
        assert_eq!("get".parse::<Method>().unwrap().as_str(), "get");
        assert_eq!("PURGE".parse::<Method>().unwrap().to_string(), "PURGE");
    }
}
