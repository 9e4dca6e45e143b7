//! Rate-limit classification and wait computation.
//!
//! GitHub signals a primary rate limit with 429 and a secondary one with 403
//! plus `X-RateLimit-Remaining: 0`. A 403 without that header is a plain
//! permission error.

use chrono::{DateTime, Utc};

use crate::ports::transport::HttpResponse;

pub const DEFAULT_RETRY_AFTER_MS: u64 = 60_000;

pub fn is_rate_limited(resp: &HttpResponse) -> bool {
    match resp.status {
        429 => true,
        403 => resp.header("X-RateLimit-Remaining").map(str::trim) == Some("0"),
        _ => false,
    }
}

/// Milliseconds to wait before calling again.
///
/// 1. `Retry-After` (seconds) if positive
/// 2. `X-RateLimit-Reset` (epoch seconds) minus `now` if positive
/// 3. `DEFAULT_RETRY_AFTER_MS`
pub fn retry_after_ms(resp: &HttpResponse, now: DateTime<Utc>) -> u64 {
    if let Some(secs) = parse_number(resp.header("Retry-After")) {
        if secs > 0.0 {
            return (secs * 1_000.0).round() as u64;
        }
    }

    if let Some(reset) = parse_number(resp.header("X-RateLimit-Reset")) {
        let delta = reset * 1_000.0 - now.timestamp_millis() as f64;
        if delta > 0.0 {
            return delta.round() as u64;
        }
    }

    DEFAULT_RETRY_AFTER_MS
}

pub fn rate_limit_message(status: u16, retry_after_ms: u64) -> String {
    let secs = (retry_after_ms as f64 / 1_000.0).round() as u64;
    format!("GitHub rate limit hit ({status}). Retry after {secs}s.")
}

fn parse_number(raw: Option<&str>) -> Option<f64> {
    raw.and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite())
}
