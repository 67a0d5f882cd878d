//! Configurable HTTP mock endpoint.
//!
//! Every request is answered with a plain-text diagnostic body. Query
//! parameters shape the response: `d`, `dmin` and `dmax` add latency, `s`
//! and `r` pick the status code, `u` pings an upstream first.

pub mod behaviors;
pub mod config;
pub mod diagnostics;
pub mod server;
