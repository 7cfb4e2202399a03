//! Spread-Age Tracker (spec.md §4.5)
//! Mission: Tell a persistent mispricing (frozen venue) apart from a genuine, fresh
//! opportunity by tracking how long a pair has stayed above threshold.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use rust_decimal::Decimal;

use crate::models::PairId;

const TTL: Duration = Duration::from_secs(48 * 3600);

struct Entry {
    first_seen: Instant,
    last_touched: Instant,
}

/// For each `pair_id`, stores the instant `|current_spread| >= min_threshold`
/// was first observed continuously. Dropping below threshold clears the
/// timestamp. Entries untouched for 48h are swept (TTL).
#[derive(Default)]
pub struct SpreadAgeTracker {
    first_seen: DashMap<PairId, Entry>,
}

impl SpreadAgeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Updates tracker state for this tick's observed spread and returns
    /// the current age in hours (0.0 if below threshold or newly crossing
    /// it this tick).
    pub fn observe(&self, pair_id: &PairId, abs_spread_pct: Decimal, min_threshold: Decimal) -> f64 {
        let now = Instant::now();
        if abs_spread_pct >= min_threshold {
            let age = match self.first_seen.get(pair_id) {
                Some(entry) => now.duration_since(entry.first_seen).as_secs_f64() / 3600.0,
                None => 0.0,
            };
            self.first_seen
                .entry(pair_id.clone())
                .and_modify(|e| e.last_touched = now)
                .or_insert(Entry { first_seen: now, last_touched: now });
            age
        } else {
            self.first_seen.remove(pair_id);
            0.0
        }
    }

    pub fn age_hours(&self, pair_id: &PairId) -> f64 {
        self.first_seen
            .get(pair_id)
            .map(|e| Instant::now().duration_since(e.first_seen).as_secs_f64() / 3600.0)
            .unwrap_or(0.0)
    }

    /// Sweeps entries that have not been touched within the TTL window.
    pub fn sweep_expired(&self) {
        let now = Instant::now();
        self.first_seen.retain(|_, e| now.duration_since(e.last_touched) < TTL);
    }
}
