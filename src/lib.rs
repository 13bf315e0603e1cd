//! # caching-proxy
//!
//! A transparent HTTP caching reverse proxy. Requests are answered from an
//! in-memory cache keyed by path+query when possible, and otherwise forwarded
//! to a single origin whose successful bodies are cached for reuse.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use caching_proxy::forward::Forwarder;
//! use caching_proxy::proxy::{self, ProxyContext};
//! use caching_proxy::server::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let forwarder = Forwarder::new("http://dummyjson.com", Duration::from_secs(100));
//!     let context = Arc::new(ProxyContext::new(forwarder));
//!     let server = Server::bind("0.0.0.0:3000").await?;
//!     proxy::serve(server, context).await?;
//!     Ok(())
//! }
//! ```

// ── HTTP plumbing ─────────────────────────────────────────────────────────────
pub mod http;
pub mod server;

// ── Caching proxy ─────────────────────────────────────────────────────────────
pub mod admin;
pub mod cache;
pub mod config;
pub mod forward;
pub mod proxy;

// ── Convenience re-exports ────────────────────────────────────────────────────
pub use cache::CacheStore;
pub use forward::{ForwardError, Forwarder, OriginResponse};
pub use crate::http::{Headers, Method, Request, Response, StatusCode};
pub use proxy::ProxyContext;
pub use server::{Server, ServerError};
