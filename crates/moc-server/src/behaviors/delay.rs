//! Delay behavior - artificial processing latency.
//!
//! Total delay is `d + random(dmin, max(dmin, dmax))` milliseconds. Any
//! component that fails to parse disables the delay for the request.

use super::params::QueryParams;
use rand::Rng;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayPlan {
    pub base_ms: i64,
    pub min_jitter_ms: i64,
    /// Already clamped to at least `min_jitter_ms`
    pub max_jitter_ms: i64,
}

impl DelayPlan {
    /// Resolve the delay triple from raw parameter values.
    ///
    /// Missing `d` and `dmin` default to 0, missing `dmax` to `dmin`.
    /// Returns `None` if any present value is not an integer.
    pub fn resolve(d: Option<&str>, dmin: Option<&str>, dmax: Option<&str>) -> Option<Self> {
        let base_ms = parse_ms(d.unwrap_or("0"))?;
        let dmin = dmin.unwrap_or("0");
        let min_jitter_ms = parse_ms(dmin)?;
        let max_jitter_ms = parse_ms(dmax.unwrap_or(dmin))?;
        Some(Self {
            base_ms,
            min_jitter_ms,
            max_jitter_ms: max_jitter_ms.max(min_jitter_ms),
        })
    }

    pub fn from_params(params: &QueryParams) -> Option<Self> {
        Self::resolve(
            params.delay.as_deref(),
            params.delay_min.as_deref(),
            params.delay_max.as_deref(),
        )
    }

    /// Draw the total delay. Non-positive totals and overflowing sums yield 0.
    pub fn sample_ms<R: Rng + ?Sized>(&self, rng: &mut R) -> u64 {
        let jitter = rng.gen_range(self.min_jitter_ms..=self.max_jitter_ms);
        match self.base_ms.checked_add(jitter) {
            Some(total) if total > 0 => total as u64,
            _ => 0,
        }
    }
}

fn parse_ms(raw: &str) -> Option<i64> {
    raw.trim().parse::<i64>().ok()
}

/// Decide the delay for a request using the thread-local RNG.
pub fn decide_delay(params: &QueryParams) -> u64 {
    DelayPlan::from_params(params)
        .map(|plan| plan.sample_ms(&mut rand::thread_rng()))
        .unwrap_or(0)
}

/// Sleep the current task; other connections keep running.
pub async fn apply_delay(delay_ms: u64) {
    if delay_ms > 0 {
        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    }
}
