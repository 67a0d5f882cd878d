//! Per-request behaviors driven by query parameters.
//!
//! - `params` - last-value-wins resolution of `d`, `dmin`, `dmax`, `s`, `r`, `u`
//! - `upstream` - best-effort upstream ping (`u`)
//! - `delay` - fixed delay plus bounded jitter (`d`, `dmin`, `dmax`)
//! - `status` - explicit or weighted random status (`s`, `r`)

mod delay;
mod params;
mod status;
mod upstream;

pub use delay::{apply_delay, decide_delay, DelayPlan};
pub use params::{
    parse_query_string, QueryParams, PARAM_DELAY, PARAM_DELAY_MAX, PARAM_DELAY_MIN, PARAM_RANDOM,
    PARAM_STATUS, PARAM_UPSTREAM,
};
pub use status::{
    decide_status, decide_status_with, status_allows_body, status_for_draw, StatusDecision,
    RANDOM_ENABLED, RANDOM_STATUS_BANDS,
};
pub use upstream::{
    notify_upstream, parse_upstream_url, ping_upstream, resolve_upstream, UpstreamError,
};
