//! Query parameter resolution.
//!
//! Every recognized parameter may appear any number of times; only the last
//! occurrence is used. Values are passed on as raw strings, coercion happens
//! in the behavior that consumes them.

use std::borrow::Cow;

/// Base delay in milliseconds
pub const PARAM_DELAY: &str = "d";
/// Upper bound of the jitter range in milliseconds
pub const PARAM_DELAY_MAX: &str = "dmax";
/// Lower bound of the jitter range in milliseconds
pub const PARAM_DELAY_MIN: &str = "dmin";
/// Explicit response status
pub const PARAM_STATUS: &str = "s";
/// `"true"` enables the weighted random status
pub const PARAM_RANDOM: &str = "r";
/// Upstream URL to ping before responding
pub const PARAM_UPSTREAM: &str = "u";

/// Resolved per-request parameters (last value wins).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams {
    pub delay: Option<String>,
    pub delay_max: Option<String>,
    pub delay_min: Option<String>,
    pub status: Option<String>,
    pub random: Option<String>,
    pub upstream: Option<String>,
}

impl QueryParams {
    pub fn from_query(query: Option<&str>) -> Self {
        let mut params = Self::default();
        for (key, value) in parse_query_string(query) {
            let slot = match key.as_str() {
                PARAM_DELAY => &mut params.delay,
                PARAM_DELAY_MAX => &mut params.delay_max,
                PARAM_DELAY_MIN => &mut params.delay_min,
                PARAM_STATUS => &mut params.status,
                PARAM_RANDOM => &mut params.random,
                PARAM_UPSTREAM => &mut params.upstream,
                _ => continue,
            };
            *slot = Some(value);
        }
        params
    }

    pub fn from_uri(uri: &hyper::Uri) -> Self {
        Self::from_query(uri.query())
    }
}

/// Split a query string into decoded `(key, value)` pairs in the order they
/// were written.
///
/// Pairs without `=` and pairs with an empty value are dropped, so `s=` never
/// overrides an earlier `s=404`.
pub fn parse_query_string(query: Option<&str>) -> Vec<(String, String)> {
    let Some(query) = query else {
        return Vec::new();
    };
    query
        .split('&')
        .filter_map(|pair| {
            let (key, value) = pair.split_once('=')?;
            if value.is_empty() {
                return None;
            }
            Some((decode_component(key), decode_component(value)))
        })
        .collect()
}

fn decode_component(raw: &str) -> String {
    let spaced: Cow<'_, str> = if raw.contains('+') {
        Cow::Owned(raw.replace('+', " "))
    } else {
        Cow::Borrowed(raw)
    };
    let bytes = urlencoding::decode_binary(spaced.as_bytes());
    String::from_utf8_lossy(&bytes).into_owned()
}
