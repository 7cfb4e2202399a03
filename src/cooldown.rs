//! Cooldown & Blacklist Gate (spec.md §4.9)
//! Mission: Stop the same opportunity from re-alerting every tick, and give operators a hard
//! kill switch for symbols/venues/addresses known to be bad.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use dashmap::{DashMap, DashSet};

use crate::models::PairId;

/// Per-symbol and per-(symbol, pair_id) cooldown TTLs. `can_alert` is a pure
/// read; `process_alert` is the only mutator and is atomic per key via
/// `DashMap::entry`, so two concurrent callers can't both win a
/// test-and-set race on the same key.
#[derive(Default)]
pub struct CooldownGate {
    symbol_until: DashMap<String, Instant>,
    pair_until: DashMap<(String, PairId), Instant>,
    suppressed_count: std::sync::atomic::AtomicU64,
}

impl CooldownGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn can_alert(&self, symbol: &str, pair_id: &PairId) -> bool {
        let now = Instant::now();
        if self.symbol_until.get(symbol).is_some_and(|until| now < *until) {
            return false;
        }
        let key = (symbol.to_string(), pair_id.clone());
        if self.pair_until.get(&key).is_some_and(|until| now < *until) {
            return false;
        }
        true
    }

    /// Tests-and-sets the cooldown in one atomic step. Returns `true` if the
    /// alert is allowed to proceed (and the cooldown is now held); `false`
    /// if it was already suppressed, in which case the suppressed-duplicate
    /// counter is incremented.
    pub fn process_alert(&self, symbol: &str, pair_id: &PairId, ttl: Duration) -> bool {
        let now = Instant::now();
        let pair_key = (symbol.to_string(), pair_id.clone());

        let symbol_blocked = test_and_set(&self.symbol_until, symbol.to_string(), now, ttl);
        let pair_blocked = test_and_set(&self.pair_until, pair_key, now, ttl);

        if symbol_blocked || pair_blocked {
            self.suppressed_count.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            false
        } else {
            true
        }
    }

    pub fn suppressed_count(&self) -> u64 {
        self.suppressed_count.load(std::sync::atomic::Ordering::Relaxed)
    }
}

/// Returns whether `key` was already under cooldown at `now`; either way,
/// sets its expiry to `now + ttl` so the caller's own alert starts a fresh
/// cooldown window.
fn test_and_set<K: std::hash::Hash + Eq + Clone>(map: &DashMap<K, Instant>, key: K, now: Instant, ttl: Duration) -> bool {
    let mut blocked = false;
    map.entry(key)
        .and_modify(|until| {
            blocked = now < *until;
            *until = now + ttl;
        })
        .or_insert(now + ttl);
    blocked
}

/// Case-insensitive blacklist across three dimensions; a hit on any one
/// blocks the signal. Stored upper-cased so lookups don't allocate twice.
#[derive(Default)]
pub struct Blacklist {
    symbols: DashSet<String>,
    venues: DashSet<String>,
    addresses: DashSet<String>,
}

impl Blacklist {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn block_symbol(&self, symbol: &str) {
        self.symbols.insert(symbol.to_uppercase());
    }

    pub fn block_venue(&self, venue: &str) {
        self.venues.insert(venue.to_uppercase());
    }

    pub fn block_address(&self, address: &str) {
        self.addresses.insert(address.to_uppercase());
    }

    pub fn is_symbol_blocked(&self, symbol: &str) -> bool {
        self.symbols.contains(&symbol.to_uppercase())
    }

    pub fn is_venue_blocked(&self, venue: &str) -> bool {
        self.venues.contains(&venue.to_uppercase())
    }

    pub fn is_address_blocked(&self, address: &str) -> bool {
        self.addresses.contains(&address.to_uppercase())
    }

    /// A signal is blocked if its symbol, either venue, or any referenced
    /// contract address is blacklisted.
    pub fn is_signal_blocked(&self, symbol: &str, venues: &[&str], addresses: &HashSet<String>) -> bool {
        if self.is_symbol_blocked(symbol) {
            return true;
        }
        if venues.iter().any(|v| self.is_venue_blocked(v)) {
            return true;
        }
        addresses.iter().any(|a| self.is_address_blocked(a))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair() -> PairId {
        PairId::new("BTC", &"low".into(), &"high".into())
    }

    #[test]
    fn fresh_symbol_can_alert() {
        let gate = CooldownGate::new();
        assert!(gate.can_alert("BTC", &pair()));
    }

    #[test]
    fn process_alert_blocks_immediate_repeat() {
        let gate = CooldownGate::new();
        assert!(gate.process_alert("BTC", &pair(), Duration::from_secs(60)));
        assert!(!gate.process_alert("BTC", &pair(), Duration::from_secs(60)));
        assert_eq!(gate.suppressed_count(), 1);
    }

    #[test]
    fn different_pair_same_symbol_still_blocked_by_symbol_cooldown() {
        let gate = CooldownGate::new();
        let other_pair = PairId::new("BTC", &"low2".into(), &"high2".into());
        assert!(gate.process_alert("BTC", &pair(), Duration::from_secs(60)));
        assert!(!gate.process_alert("BTC", &other_pair, Duration::from_secs(60)));
    }

    #[test]
    fn blacklist_is_case_insensitive() {
        let bl = Blacklist::new();
        bl.block_symbol("btc");
        assert!(bl.is_symbol_blocked("BTC"));
        assert!(bl.is_symbol_blocked("Btc"));
    }

    #[test]
    fn signal_blocked_by_any_dimension() {
        let bl = Blacklist::new();
        bl.block_venue("shadyexchange");
        let addrs = HashSet::new();
        assert!(bl.is_signal_blocked("ETH", &["shadyexchange", "binance"], &addrs));
        assert!(!bl.is_signal_blocked("ETH", &["binance", "coinbase"], &addrs));
    }
}
