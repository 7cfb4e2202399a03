//! Convergence Tracker (spec.md §4.10)
//! Mission: Follow an emitted signal after the fact to tell operators whether the
//! opportunity closed on its own or is still open.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::config::Settings;
use crate::models::{CloseReason, ConvergenceRecord, ConvergenceSnapshot};

/// Holds one `ConvergenceRecord` plus a monotonically increasing
/// `snapshot_seq` counter per signal_id, single-writer per key so no
/// locking beyond the map itself is required.
#[derive(Default)]
pub struct ConvergenceTracker {
    records: DashMap<Uuid, ConvergenceRecord>,
    next_seq: DashMap<Uuid, u32>,
}

impl ConvergenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a fresh record at signal emission time. `snapshot_seq` for
    /// this signal starts at 0 and is handed out by `next_snapshot_seq`.
    pub fn start(&self, signal_id: Uuid, initial_spread_pct: Decimal, now: DateTime<Utc>) {
        self.records.insert(signal_id, ConvergenceRecord::new(signal_id, initial_spread_pct, now));
        self.next_seq.insert(signal_id, 0);
    }

    pub fn get(&self, signal_id: Uuid) -> Option<ConvergenceRecord> {
        self.records.get(&signal_id).map(|r| r.clone())
    }

    fn next_snapshot_seq(&self, signal_id: Uuid) -> u32 {
        let mut seq = self.next_seq.entry(signal_id).or_insert(0);
        let current = *seq;
        *seq += 1;
        current
    }

    /// Re-reads the current spread, builds a snapshot, updates the running
    /// aggregates and applies the closure rules. Returns `None` if the
    /// signal has no open record (never started, or already closed).
    pub fn tick(
        &self,
        settings: &Settings,
        signal_id: Uuid,
        now: DateTime<Utc>,
        low_venue_bid: Decimal,
        low_venue_ask: Decimal,
        high_venue_bid: Decimal,
        high_venue_ask: Decimal,
        current_spread_pct: Decimal,
        low_venue_depth_usd: Decimal,
        high_venue_depth_usd: Decimal,
    ) -> Option<(ConvergenceRecord, ConvergenceSnapshot)> {
        let mut record = self.records.get_mut(&signal_id)?;
        if record.is_closed() {
            return None;
        }

        let snapshot_seq = self.next_snapshot_seq(signal_id);
        let snapshot = ConvergenceSnapshot {
            signal_id,
            snapshot_seq,
            ts: now,
            low_venue_bid,
            low_venue_ask,
            high_venue_bid,
            high_venue_ask,
            spread_pct: current_spread_pct,
            low_venue_depth_usd,
            high_venue_depth_usd,
        };

        record.current_spread_pct = current_spread_pct;
        record.min_spread_pct = record.min_spread_pct.min(current_spread_pct);
        record.max_spread_pct = record.max_spread_pct.max(current_spread_pct);
        record.checks_count += 1;
        record.last_checked_at = now;

        apply_closure_rules(&mut record, settings, now);

        Some((record.clone(), snapshot))
    }
}

fn apply_closure_rules(record: &mut ConvergenceRecord, settings: &Settings, now: DateTime<Utc>) {
    if record.is_closed() {
        return;
    }

    let abs_current = record.current_spread_pct.abs();

    if abs_current <= settings.convergence_floor_pct {
        record.consecutive_under_floor += 1;
    } else {
        record.consecutive_under_floor = 0;
    }

    if record.consecutive_under_floor >= settings.convergence_consecutive_checks {
        record.converged = true;
        record.converged_at = Some(now);
        record.closed_at = Some(now);
        record.close_reason = Some(CloseReason::Converged);
        return;
    }

    let divergence_bound = record.initial_spread_pct.abs() * settings.divergence_multiplier;
    if abs_current >= divergence_bound && divergence_bound > Decimal::ZERO {
        record.diverged = true;
        record.diverged_at = Some(now);
    }

    let elapsed = (now - record.started_at).num_seconds();
    if elapsed >= settings.max_tracking_duration_secs {
        record.closed_at = Some(now);
        record.close_reason = Some(CloseReason::Timeout);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn settings() -> Settings {
        let mut s = Settings::default();
        s.convergence_floor_pct = dec!(0.5);
        s.convergence_consecutive_checks = 2;
        s.divergence_multiplier = dec!(1.5);
        s.max_tracking_duration_secs = 3600;
        s
    }

    fn tick(tracker: &ConvergenceTracker, settings: &Settings, id: Uuid, now: DateTime<Utc>, spread: Decimal) -> ConvergenceRecord {
        tracker
            .tick(settings, id, now, dec!(100), dec!(101), dec!(105), dec!(104), spread, dec!(50000), dec!(50000))
            .unwrap()
            .0
    }

    #[test]
    fn converges_after_consecutive_checks_under_floor() {
        let tracker = ConvergenceTracker::new();
        let settings = settings();
        let id = Uuid::new_v4();
        let start = Utc::now();
        tracker.start(id, dec!(5.0), start);

        tick(&tracker, &settings, id, start, dec!(0.3));
        let record = tick(&tracker, &settings, id, start, dec!(0.2));

        assert!(record.converged);
        assert_eq!(record.close_reason, Some(CloseReason::Converged));
    }

    #[test]
    fn diverged_flag_set_without_closing() {
        let tracker = ConvergenceTracker::new();
        let settings = settings();
        let id = Uuid::new_v4();
        let start = Utc::now();
        tracker.start(id, dec!(5.0), start);

        let record = tick(&tracker, &settings, id, start, dec!(8.0));
        assert!(record.diverged);
        assert!(!record.is_closed());
    }

    #[test]
    fn timeout_closes_regardless_of_spread() {
        let tracker = ConvergenceTracker::new();
        let settings = settings();
        let id = Uuid::new_v4();
        let start = Utc::now();
        tracker.start(id, dec!(5.0), start);

        let later = start + chrono::Duration::seconds(4000);
        let record = tick(&tracker, &settings, id, later, dec!(5.0));
        assert_eq!(record.close_reason, Some(CloseReason::Timeout));
    }

    #[test]
    fn closed_record_receives_no_further_updates() {
        let tracker = ConvergenceTracker::new();
        let settings = settings();
        let id = Uuid::new_v4();
        let start = Utc::now();
        tracker.start(id, dec!(5.0), start);
        tick(&tracker, &settings, id, start, dec!(0.3));
        tick(&tracker, &settings, id, start, dec!(0.2));

        let after_close = tracker.tick(&settings, id, start, dec!(100), dec!(101), dec!(105), dec!(104), dec!(9.0), dec!(1), dec!(1));
        assert!(after_close.is_none());
    }
}
