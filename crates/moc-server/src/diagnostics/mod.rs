//! Diagnostic response body.
//!
//! The body is a plain-text concatenation of up to four sections, always in
//! this order:
//!
//! 1. `Information` - client address, request line, server identity, protocol
//! 2. `Headers` - every inbound header (omitted when there are none)
//! 3. `JWT Content` - claims from `X-Forwarded-Access-Token`, when decodable
//! 4. `Session State` - decoded session cookie, when a decoder is loaded
//!
//! Sections that do not apply contribute nothing, not even a banner.

mod jwt;
mod session;
mod session_state;

pub use jwt::{pad_segment, ClaimsError, TokenClaims};
pub use session::{
    decode_session_cookie, load_session_decoder, session_cookie_value, DecodeError,
    NativeSessionDecoder, SessionDecoder,
};
pub use session_state::{BuiltinSessionDecoder, SessionState};

use crate::config::SessionConfig;
use hyper::header::COOKIE;
use hyper::{HeaderMap, Method, Request, Uri, Version};
use std::fmt::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::debug;

pub const BANNER_INFO: &str = "======== Information ========";
pub const BANNER_HEADERS: &str = "========== Headers ==========";
pub const BANNER_JWT: &str = "======== JWT Content ========";
pub const BANNER_SESSION: &str = "======= Session State =======";
pub const BANNER_CLOSE: &str = "=============================";

/// Header carrying the bearer token forwarded by an auth proxy
pub const ACCESS_TOKEN_HEADER: &str = "x-forwarded-access-token";

const BULLET: &str = "■";

/// Server identity echoed in the information section
pub const SERVER_VERSION: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Extracted request metadata
#[derive(Debug, Clone)]
pub struct RequestInfo {
    pub client_addr: SocketAddr,
    pub method: Method,
    pub uri: Uri,
    pub version: Version,
    pub headers: HeaderMap,
}

impl RequestInfo {
    pub fn from_request<B>(req: &Request<B>, client_addr: SocketAddr) -> Self {
        Self {
            client_addr,
            method: req.method().clone(),
            uri: req.uri().clone(),
            version: req.version(),
            headers: req.headers().clone(),
        }
    }

    pub fn request_line(&self) -> String {
        format!("{} {} {:?}", self.method, self.uri, self.version)
    }
}

/// Builds the diagnostic body. Holds the session decoder resolved at startup.
#[derive(Clone)]
pub struct DiagnosticRenderer {
    cookie_name: String,
    cookie_secret: Vec<u8>,
    decoder: Option<Arc<dyn SessionDecoder>>,
}

impl DiagnosticRenderer {
    pub fn new(session: &SessionConfig, decoder: Option<Arc<dyn SessionDecoder>>) -> Self {
        Self {
            cookie_name: session.cookie_name.clone(),
            cookie_secret: session.cookie_secret.as_bytes().to_vec(),
            decoder,
        }
    }

    pub fn has_session_decoder(&self) -> bool {
        self.decoder.is_some()
    }

    /// Render the full body.
    pub fn render(&self, info: &RequestInfo) -> String {
        let mut body = info_section(info);
        body.push_str(&headers_section(&info.headers));
        if let Some(claims) = claims_section(&info.headers) {
            body.push_str(&claims);
        }
        if let Some(session) = self.session_section(&info.headers) {
            body.push_str(&session);
        }
        body
    }

    fn session_section(&self, headers: &HeaderMap) -> Option<String> {
        let decoder = self.decoder.as_deref()?;
        let cookie = headers.get(COOKIE)?.to_str().ok()?;
        let decoded =
            decode_session_cookie(decoder, cookie, &self.cookie_name, &self.cookie_secret)?;
        Some(section(BANNER_SESSION, &format!("{decoded}\n")))
    }
}

fn section(banner: &str, content: &str) -> String {
    format!("\n{banner}\n{content}{BANNER_CLOSE}\n")
}

fn info_section(info: &RequestInfo) -> String {
    let mut content = String::new();
    let _ = writeln!(content, "{BULLET}Client Address : {}", info.client_addr);
    let _ = writeln!(content, "{BULLET}Request Line : {}", info.request_line());
    let _ = writeln!(content, "{BULLET}Server Version : {SERVER_VERSION}");
    let _ = writeln!(
        content,
        "{BULLET}System Version : {}/{}",
        std::env::consts::OS,
        std::env::consts::ARCH
    );
    let _ = writeln!(content, "{BULLET}Protocol Version : {:?}", info.version);
    section(BANNER_INFO, &content)
}

/// One line per header value. Values sharing a name are grouped under the
/// first occurrence of that name, in arrival order within the group.
fn headers_section(headers: &HeaderMap) -> String {
    if headers.is_empty() {
        return String::new();
    }
    let mut content = String::new();
    for (name, value) in headers {
        let _ = writeln!(
            content,
            "{BULLET}{} : {}",
            name,
            String::from_utf8_lossy(value.as_bytes())
        );
    }
    section(BANNER_HEADERS, &content)
}

fn claims_section(headers: &HeaderMap) -> Option<String> {
    let token = headers.get(ACCESS_TOKEN_HEADER)?.to_str().ok()?;
    if token.is_empty() {
        return None;
    }
    let claims = match TokenClaims::decode(token) {
        Ok(claims) => claims,
        Err(e) => {
            debug!("Access token claims not decoded: {}", e);
            return None;
        }
    };
    let content = format!(
        "{BULLET}Headers\n{}\n{BULLET}Payloads\n{}\n",
        claims.header_pretty(),
        claims.payload_pretty()
    );
    Some(section(BANNER_JWT, &content))
}
