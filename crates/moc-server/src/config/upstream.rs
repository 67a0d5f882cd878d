//! Default upstream configuration.

use crate::behaviors::parse_upstream_url;
use serde::{Deserialize, Serialize};

/// Process-wide upstream pinged on every request unless the `u` query
/// parameter names another one.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct UpstreamConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Skip TLS certificate verification (for self-signed certs in dev/test)
    #[serde(default)]
    pub tls_skip_verify: bool,
}

impl UpstreamConfig {
    /// Validate the default upstream URL, if any. Applies the same rules as
    /// a per-request `u` value.
    pub fn validate(&self) -> Result<(), String> {
        match self.url {
            Some(ref url) => parse_upstream_url(url).map(|_| ()).map_err(|e| e.to_string()),
            None => Ok(()),
        }
    }
}
