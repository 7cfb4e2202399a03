//! Timing Tracker (spec.md §4.5)
//! Mission: Turn two order books' request/response timestamps into the latency-skew numbers
//! the safety validator's `latency` and `spread_freshness` checks run against.
//!
//! `spread_freshness` (spec.md §4.6) fails when quote age exceeds
//! `max_price_age_ms` OR the latency skew this module computes is out of
//! bounds; the caller folds `Quote::is_fresh` into `quote_age_fresh` so both
//! halves land on the one `TimingSnapshot.fresh` bit the validator reads.

use crate::models::{BookTiming, TimingSnapshot};

pub fn latency_diff_ms(low: &BookTiming, high: &BookTiming) -> u32 {
    (high.response_at_ms - low.response_at_ms).unsigned_abs() as u32
}

pub fn max_latency_ms(low: &BookTiming, high: &BookTiming) -> u32 {
    low.latency_ms.max(high.latency_ms)
}

/// Data is fresh iff the latency diff is under `max_diff_ms`, the max
/// per-side latency is under `max_latency_ms`, AND `quote_age_fresh` (the
/// caller's `Quote::is_fresh` check against `max_price_age_ms`) holds.
pub fn snapshot(
    low: &BookTiming,
    high: &BookTiming,
    max_latency_ms_bound: u32,
    max_diff_ms_bound: u32,
    quote_age_fresh: bool,
) -> TimingSnapshot {
    let diff = latency_diff_ms(low, high);
    let max_latency = max_latency_ms(low, high);
    TimingSnapshot {
        low_venue_latency_ms: low.latency_ms,
        high_venue_latency_ms: high.latency_ms,
        latency_diff_ms: diff,
        max_latency_ms: max_latency,
        fresh: diff < max_diff_ms_bound && max_latency < max_latency_ms_bound && quote_age_fresh,
    }
}
