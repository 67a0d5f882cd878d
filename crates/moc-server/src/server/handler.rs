//! Request handling.
//!
//! Every request, whatever its method or path, runs the same pipeline:
//! upstream ping, delay, status decision, diagnostic body. The request body
//! is never read.

use super::client::HttpClient;
use super::headers::{MocHeadersExt, TEXT_PLAIN_UTF8, X_MOC_DELAY_MS, X_MOC_STATUS};
use crate::behaviors::{
    apply_delay, decide_delay, decide_status, notify_upstream, status_allows_body, QueryParams,
};
use crate::diagnostics::{DiagnosticRenderer, RequestInfo};
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::header::{HeaderValue, CONTENT_LENGTH, CONTENT_TYPE};
use hyper::{Request, Response};
use std::convert::Infallible;
use std::net::SocketAddr;
use tracing::debug;

/// Shared state borrowed by each request.
pub struct RequestHandlerContext<'a> {
    pub http_client: &'a HttpClient,
    pub default_upstream: Option<&'a str>,
    pub renderer: &'a DiagnosticRenderer,
}

/// Handle an incoming request.
pub async fn handle_request<B>(
    ctx: &RequestHandlerContext<'_>,
    req: Request<B>,
    client_addr: SocketAddr,
) -> Result<Response<Full<Bytes>>, Infallible> {
    debug!("Received request: {} {} from {}", req.method(), req.uri(), client_addr);

    let params = QueryParams::from_uri(req.uri());

    notify_upstream(
        ctx.http_client,
        params.upstream.as_deref(),
        ctx.default_upstream,
    )
    .await;

    let delay_ms = decide_delay(&params);
    if delay_ms > 0 {
        debug!("Delaying response by {}ms", delay_ms);
    }
    apply_delay(delay_ms).await;

    let decision = decide_status(&params);
    let status = decision.status();

    let mut response = if status_allows_body(status) {
        let info = RequestInfo::from_request(&req, client_addr);
        let body = ctx.renderer.render(&info);
        let body_len = body.len();
        let mut response = Response::new(Full::new(Bytes::from(body)));
        response.set_header(&CONTENT_LENGTH, body_len);
        response
    } else {
        Response::new(Full::new(Bytes::new()))
    };
    *response.status_mut() = status;
    response.set_header(&CONTENT_TYPE, TEXT_PLAIN_UTF8.clone());
    response.set_header(&X_MOC_STATUS, HeaderValue::from_static(decision.source()));
    response.set_header(&X_MOC_DELAY_MS, delay_ms);

    debug!(
        "Responding {} ({}) after {}ms",
        status.as_u16(),
        decision.source(),
        delay_ms
    );

    Ok(response)
}
