//! Depth-History Tracker (spec.md §4.5)
//! Mission: Give the safety validator a baseline for "is today's depth normal for this
//! venue/pair/side" instead of comparing against a single prior sample.

use dashmap::DashMap;
use rust_decimal::Decimal;
use statrs::statistics::Statistics;

use crate::models::{PairId, Side, VenueId};

const RING_CAPACITY: usize = 480;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepthStatus {
    Ok,
    Warning,
    Danger,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DepthStats {
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    pub median: f64,
    pub p10: f64,
    pub p90: f64,
    pub stddev: f64,
}

#[derive(Default)]
struct Ring {
    samples: Vec<f64>,
    next: usize,
}

impl Ring {
    fn push(&mut self, value: f64) {
        if self.samples.len() < RING_CAPACITY {
            self.samples.push(value);
        } else {
            self.samples[self.next] = value;
            self.next = (self.next + 1) % RING_CAPACITY;
        }
    }

    fn stats(&self) -> Option<DepthStats> {
        if self.samples.is_empty() {
            return None;
        }
        let mut sorted = self.samples.clone();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let data = sorted.clone();
        let len = sorted.len();
        let percentile = |p: f64| -> f64 {
            let idx = ((len as f64 - 1.0) * p).round() as usize;
            sorted[idx.min(len - 1)]
        };
        Some(DepthStats {
            mean: data.clone().mean(),
            min: sorted[0],
            max: sorted[len - 1],
            median: percentile(0.5),
            p10: percentile(0.10),
            p90: percentile(0.90),
            stddev: if len > 1 { data.std_dev() } else { 0.0 },
        })
    }
}

/// Per-(pair, venue, side) ring buffer of the last `RING_CAPACITY` depth-usd
/// samples, recorded roughly every 3 minutes by the order-book analysis loop.
#[derive(Default)]
pub struct DepthHistoryCollector {
    rings: DashMap<(PairId, VenueId, Side), Ring>,
}

impl DepthHistoryCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, pair_id: &PairId, venue_id: &VenueId, side: Side, depth_usd: Decimal) {
        let key = (pair_id.clone(), venue_id.clone(), side);
        let value: f64 = depth_usd.to_string().parse().unwrap_or(0.0);
        self.rings.entry(key).or_default().push(value);
    }

    pub fn stats(&self, pair_id: &PairId, venue_id: &VenueId, side: Side) -> Option<DepthStats> {
        let key = (pair_id.clone(), venue_id.clone(), side);
        self.rings.get(&key).and_then(|r| r.stats())
    }

    /// `danger` when current depth is below the 10th percentile of history,
    /// `warning` when below the median, `ok` otherwise. Returns `Ok` with no
    /// history baseline yet (nothing to compare against).
    pub fn depth_status(&self, pair_id: &PairId, venue_id: &VenueId, side: Side, current_usd: Decimal) -> DepthStatus {
        let current: f64 = current_usd.to_string().parse().unwrap_or(0.0);
        match self.stats(pair_id, venue_id, side) {
            None => DepthStatus::Ok,
            Some(stats) if current < stats.p10 => DepthStatus::Danger,
            Some(stats) if current < stats.median => DepthStatus::Warning,
            Some(_) => DepthStatus::Ok,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn key() -> (PairId, VenueId) {
        (PairId::new("BTC", &"low".into(), &"high".into()), VenueId::from("high"))
    }

    #[test]
    fn ring_buffer_wraps_after_capacity() {
        let collector = DepthHistoryCollector::new();
        let (pair, venue) = key();
        for i in 0..(RING_CAPACITY + 10) {
            collector.record(&pair, &venue, Side::Sell, Decimal::from(i as i64));
        }
        let stats = collector.stats(&pair, &venue, Side::Sell).unwrap();
        assert_eq!(stats.max, (RING_CAPACITY + 9) as f64);
    }

    #[test]
    fn no_history_yields_ok_status() {
        let collector = DepthHistoryCollector::new();
        let (pair, venue) = key();
        assert_eq!(collector.depth_status(&pair, &venue, Side::Sell, dec!(1000)), DepthStatus::Ok);
    }

    #[test]
    fn current_depth_below_p10_is_danger() {
        let collector = DepthHistoryCollector::new();
        let (pair, venue) = key();
        for v in [100, 100, 100, 100, 100, 100, 100, 100, 100, 10000] {
            collector.record(&pair, &venue, Side::Sell, Decimal::from(v));
        }
        let status = collector.depth_status(&pair, &venue, Side::Sell, dec!(1));
        assert_eq!(status, DepthStatus::Danger);
    }
}
