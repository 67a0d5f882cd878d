//! Mock HTTP server.
//!
//! # Module Structure
//!
//! - `server` - MocServer struct and accept loop
//! - `handler` - per-request pipeline (upstream, delay, status, body)
//! - `client` - pooled HTTP client for upstream pings and its TLS trust setup
//! - `headers` - static response header names
//! - `network` - socket2 listener setup

mod client;
mod handler;
mod headers;
mod network;
#[allow(clippy::module_inception)]
mod server;

pub use client::{create_http_client, root_store_with_fallback, HttpClient};
pub use handler::{handle_request, RequestHandlerContext};
pub use headers::{X_MOC_DELAY_MS, X_MOC_STATUS};
pub use network::{create_listener, resolve_listen_addr};
pub use server::{accept_backoff, MocServer};
