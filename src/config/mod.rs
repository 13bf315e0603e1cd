//! Command-line configuration.
//!
//! [`Cli`] is the raw clap surface; [`Cli::into_mode`] validates it into a
//! [`Mode`]: either run a proxy, or poke an already running one to clear its
//! cache.

use std::time::Duration;

use clap::Parser;
use thiserror::Error;

use crate::admin::DEFAULT_ADMIN_PORT;
use crate::forward::DEFAULT_TIMEOUT;

/// One-line usage shown whenever the arguments don't describe a runnable proxy.
pub const USAGE: &str = "Usage: caching-proxy --port <number> --origin <url>";

/// Raw command-line flags.
#[derive(Debug, Parser)]
#[command(name = "caching-proxy")]
#[command(about = "A caching HTTP reverse proxy")]
#[command(version)]
pub struct Cli {
    /// Port to listen on (or, with --clear-cache, the port of the running proxy)
    #[arg(long)]
    pub port: Option<u16>,

    /// Origin server that cache misses are forwarded to
    #[arg(long, conflicts_with = "clear_cache")]
    pub origin: Option<String>,

    /// Clear the cache of a proxy running on this machine, then exit
    #[arg(long)]
    pub clear_cache: bool,

    /// Seconds to wait for the origin before answering 502
    #[arg(long, value_name = "SECS", default_value_t = DEFAULT_TIMEOUT.as_secs())]
    pub timeout: u64,

    /// Enable debug logging
    #[arg(short, long)]
    pub verbose: bool,
}

/// Problems with otherwise well-formed flags.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing --port")]
    MissingPort,

    #[error("port must be between 1 and 65535")]
    ZeroPort,

    #[error("missing --origin")]
    MissingOrigin,

    #[error("--origin must not be empty")]
    EmptyOrigin,

    #[error("invalid origin {origin:?}: {reason}")]
    InvalidOrigin { origin: String, reason: String },

    #[error("--timeout must be at least one second")]
    ZeroTimeout,
}

/// Settings for a proxy instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyConfig {
    pub port: u16,
    /// Origin base URL with trailing slashes removed.
    pub origin: String,
    pub timeout: Duration,
}

impl ProxyConfig {
    /// Address the listener binds to.
    pub fn listen_addr(&self) -> String {
        format!("0.0.0.0:{}", self.port)
    }
}

/// What this invocation should do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    Serve(ProxyConfig),
    ClearCache { port: u16 },
}

impl Cli {
    /// Validates the flags into a [`Mode`].
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] naming the first flag that is missing or invalid.
    pub fn into_mode(self) -> Result<Mode, ConfigError> {
        if self.clear_cache {
            let port = self.port.unwrap_or(DEFAULT_ADMIN_PORT);
            if port == 0 {
                return Err(ConfigError::ZeroPort);
            }
            return Ok(Mode::ClearCache { port });
        }

        let port = match self.port {
            Some(0) => return Err(ConfigError::ZeroPort),
            Some(port) => port,
            None => return Err(ConfigError::MissingPort),
        };
        let origin = self.origin.as_deref().ok_or(ConfigError::MissingOrigin)?;
        let origin = normalize_origin(origin)?;
        if self.timeout == 0 {
            return Err(ConfigError::ZeroTimeout);
        }

        Ok(Mode::Serve(ProxyConfig {
            port,
            origin,
            timeout: Duration::from_secs(self.timeout),
        }))
    }
}

/// Strips trailing slashes and checks that the origin is an absolute
/// `http`/`https` URL.
fn normalize_origin(raw: &str) -> Result<String, ConfigError> {
    let origin = raw.trim().trim_end_matches('/');
    if origin.is_empty() {
        return Err(ConfigError::EmptyOrigin);
    }

    let invalid = |reason: &str| ConfigError::InvalidOrigin {
        origin: origin.to_owned(),
        reason: reason.to_owned(),
    };
    let uri = origin
        .parse::<http::Uri>()
        .map_err(|e| invalid(&e.to_string()))?;
    match uri.scheme_str() {
        Some("http" | "https") => {}
        Some(_) => return Err(invalid("scheme must be http or https")),
        None => return Err(invalid("expected an absolute URL such as http://host:port")),
    }
    if uri.authority().is_none() {
        return Err(invalid("missing host"));
    }
    if uri.query().is_some() {
        return Err(invalid("must not contain a query string"));
    }

    Ok(origin.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mode(args: &[&str]) -> Result<Mode, ConfigError> {
        let argv = std::iter::once("caching-proxy").chain(args.iter().copied());
        Cli::try_parse_from(argv).unwrap().into_mode()
    }

    #[test]
    fn serve_strips_trailing_slashes() {
        let mode = mode(&["--port", "3000", "--origin", "http://dummyjson.com//"]).unwrap();
        assert_eq!(
            mode,
            Mode::Serve(ProxyConfig {
                port: 3000,
                origin: "http://dummyjson.com".to_owned(),
                timeout: DEFAULT_TIMEOUT,
            })
        );
    }

    #[test]
    fn flag_order_does_not_matter() {
        let a = mode(&["--origin", "https://example.com/api", "--port", "8080"]).unwrap();
        let b = mode(&["--port", "8080", "--origin", "https://example.com/api/"]).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn missing_flags() {
        assert_eq!(mode(&["--origin", "http://a.b"]), Err(ConfigError::MissingPort));
        assert_eq!(mode(&["--port", "3000"]), Err(ConfigError::MissingOrigin));
        assert_eq!(mode(&[]), Err(ConfigError::MissingPort));
    }

    #[test]
    fn bad_values() {
        assert_eq!(
            mode(&["--port", "0", "--origin", "http://a.b"]),
            Err(ConfigError::ZeroPort)
        );
        assert_eq!(
            mode(&["--port", "1", "--origin", "///"]),
            Err(ConfigError::EmptyOrigin)
        );
        assert!(matches!(
            mode(&["--port", "1", "--origin", "ftp://a.b"]),
            Err(ConfigError::InvalidOrigin { .. })
        ));
        assert!(matches!(
            mode(&["--port", "1", "--origin", "a.b"]),
            Err(ConfigError::InvalidOrigin { .. })
        ));
        assert_eq!(
            mode(&["--port", "1", "--origin", "http://a.b", "--timeout", "0"]),
            Err(ConfigError::ZeroTimeout)
        );
    }

    #[test]
    fn non_numeric_port_is_rejected_by_parser() {
        let err = Cli::try_parse_from(["caching-proxy", "--port", "abc", "--origin", "http://a.b"])
            .unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn clear_cache_defaults_to_3000() {
        assert_eq!(mode(&["--clear-cache"]), Ok(Mode::ClearCache { port: 3000 }));
        assert_eq!(
            mode(&["--clear-cache", "--port", "4000"]),
            Ok(Mode::ClearCache { port: 4000 })
        );
    }

    #[test]
    fn clear_cache_conflicts_with_origin() {
        let parsed =
            Cli::try_parse_from(["caching-proxy", "--clear-cache", "--origin", "http://a.b"]);
        assert!(parsed.is_err());
    }
}
