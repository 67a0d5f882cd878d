//! Status behavior - explicit or weighted random response status.

use super::params::QueryParams;
use hyper::StatusCode;
use rand::Rng;
use std::ops::RangeInclusive;

/// Draw bands for the weighted random status, over a uniform draw in
/// `1..=100`: 200=80%, 301=3%, 403=3%, 404=5%, 500=6%, 503=3%.
pub const RANDOM_STATUS_BANDS: [(RangeInclusive<u8>, u16); 6] = [
    (1..=3, 301),
    (4..=6, 403),
    (7..=11, 404),
    (12..=17, 500),
    (18..=20, 503),
    (21..=100, 200),
];

/// Value of `r` that enables the weighted random status
pub const RANDOM_ENABLED: &str = "true";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusDecision {
    /// Caller-provided `s`; always wins
    Explicit(StatusCode),
    /// Drawn from [`RANDOM_STATUS_BANDS`]
    Random(StatusCode),
    /// Neither `s` nor `r=true`
    Default,
}

impl StatusDecision {
    pub fn status(&self) -> StatusCode {
        match self {
            StatusDecision::Explicit(status) | StatusDecision::Random(status) => *status,
            StatusDecision::Default => StatusCode::OK,
        }
    }

    /// Short label echoed in the `x-moc-status` header
    pub fn source(&self) -> &'static str {
        match self {
            StatusDecision::Explicit(_) => "explicit",
            StatusDecision::Random(_) => "random",
            StatusDecision::Default => "default",
        }
    }
}

/// Decide the response status using the thread-local RNG.
pub fn decide_status(params: &QueryParams) -> StatusDecision {
    decide_status_with(
        params.status.as_deref(),
        params.random.as_deref(),
        &mut rand::thread_rng(),
    )
}

pub fn decide_status_with<R: Rng + ?Sized>(
    status: Option<&str>,
    random: Option<&str>,
    rng: &mut R,
) -> StatusDecision {
    if let Some(status) = status.and_then(parse_status) {
        return StatusDecision::Explicit(status);
    }

    if random == Some(RANDOM_ENABLED) {
        let draw: u8 = rng.gen_range(1..=100);
        return StatusDecision::Random(status_for_draw(draw));
    }

    StatusDecision::Default
}

/// Map a draw in `1..=100` onto its band. Out-of-range draws map to 200.
pub fn status_for_draw(draw: u8) -> StatusCode {
    RANDOM_STATUS_BANDS
        .iter()
        .find(|(band, _)| band.contains(&draw))
        .and_then(|(_, status)| StatusCode::from_u16(*status).ok())
        .unwrap_or(StatusCode::OK)
}

/// Integers outside `200..=999` count as unparsable. A 1xx status can't be
/// sent as a final response.
fn parse_status(raw: &str) -> Option<StatusCode> {
    let code = raw.trim().parse::<i64>().ok()?;
    u16::try_from(code)
        .ok()
        .and_then(|code| StatusCode::from_u16(code).ok())
        .filter(|status| !status.is_informational())
}

/// 204 and 304 responses carry neither a body nor a `Content-Length`.
pub fn status_allows_body(status: StatusCode) -> bool {
    status != StatusCode::NO_CONTENT && status != StatusCode::NOT_MODIFIED
}
