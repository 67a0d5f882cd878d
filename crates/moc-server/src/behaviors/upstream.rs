//! Upstream behavior - best-effort ping of an upstream URL.
//!
//! The call is awaited inside the request task before the delay step, so its
//! latency adds to the response time. There is no timeout beyond what the
//! transport imposes, no retry, and the upstream response never reaches the
//! caller.

use crate::server::HttpClient;
use http_body_util::Empty;
use hyper::body::Bytes;
use hyper::{Request, StatusCode, Uri};
use tracing::{debug, warn};

#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("Invalid upstream URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("Upstream request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: hyper_util::client::legacy::Error,
    },
    #[error("Upstream {url} responded with {status}")]
    Status { url: String, status: StatusCode },
}

/// Per-request `u` overrides the process-wide default.
pub fn resolve_upstream<'a>(param: Option<&'a str>, default: Option<&'a str>) -> Option<&'a str> {
    param.or(default)
}

/// Parse an upstream URL; only absolute http(s) URIs are accepted.
pub fn parse_upstream_url(url: &str) -> Result<Uri, UpstreamError> {
    let invalid = |reason: String| UpstreamError::InvalidUrl {
        url: url.to_string(),
        reason,
    };
    let uri: Uri = url.parse().map_err(|e| invalid(format!("{e}")))?;
    match uri.scheme_str() {
        Some("http") | Some("https") => {}
        Some(other) => return Err(invalid(format!("unsupported scheme '{other}'"))),
        None => return Err(invalid("missing scheme".to_string())),
    }
    if uri.host().is_none() {
        return Err(invalid("missing host".to_string()));
    }
    Ok(uri)
}

/// Send a single GET to `url` and discard the response body.
///
/// Non-2xx statuses are reported as [`UpstreamError::Status`].
pub async fn ping_upstream(client: &HttpClient, url: &str) -> Result<StatusCode, UpstreamError> {
    let uri = parse_upstream_url(url)?;
    let request = Request::get(uri)
        .body(Empty::<Bytes>::new())
        .map_err(|e| UpstreamError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let response = client
        .request(request)
        .await
        .map_err(|source| UpstreamError::Transport {
            url: url.to_string(),
            source,
        })?;

    let status = response.status();
    drop(response);

    if status.is_success() {
        Ok(status)
    } else {
        Err(UpstreamError::Status {
            url: url.to_string(),
            status,
        })
    }
}

/// Ping the resolved upstream, if any. Failures are logged and swallowed.
pub async fn notify_upstream(
    client: &HttpClient,
    param: Option<&str>,
    default: Option<&str>,
) -> Option<StatusCode> {
    let url = resolve_upstream(param, default)?;
    match ping_upstream(client, url).await {
        Ok(status) => {
            debug!("Upstream {} responded with {}", url, status);
            Some(status)
        }
        Err(UpstreamError::Status { status, .. }) => {
            warn!(
                "Upstream {} responded with {} {}",
                url,
                status.as_u16(),
                status.canonical_reason().unwrap_or("")
            );
            Some(status)
        }
        Err(e) => {
            warn!("{}", e);
            None
        }
    }
}
