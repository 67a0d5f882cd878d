//! Response header names and helpers.
//!
//! Static header names and values for the headers every mock response
//! carries, so call sites never parse header strings at runtime.

use hyper::header::{HeaderName, HeaderValue};
use hyper::Response;

/// Which rule picked the status: `explicit`, `random` or `default`
pub static X_MOC_STATUS: HeaderName = HeaderName::from_static("x-moc-status");
/// Artificial delay applied to the request, in milliseconds
pub static X_MOC_DELAY_MS: HeaderName = HeaderName::from_static("x-moc-delay-ms");

pub static TEXT_PLAIN_UTF8: HeaderValue = HeaderValue::from_static("text/plain; charset=UTF-8");

/// Extension trait for inserting headers into responses.
pub trait MocHeadersExt {
    /// Insert a header, replacing any previous value. Numeric values convert
    /// without a string round-trip.
    fn set_header(&mut self, name: &HeaderName, value: impl Into<HeaderValue>);
}

impl<B> MocHeadersExt for Response<B> {
    fn set_header(&mut self, name: &HeaderName, value: impl Into<HeaderValue>) {
        self.headers_mut().insert(name.clone(), value.into());
    }
}
