//! Ticker Registry & Venue Registry
//! Mission: the canonical symbol set, pair enumeration, and the capability bundle used to
//! pick which adapter handles which venue (spec.md §4.2, §9).

use std::sync::Arc;

use dashmap::DashMap;
use tracing::info;

use crate::adapter::{VenueAdapter, VenueCapabilities};
use crate::models::{ArbitragePair, Ticker, VenueId};

/// Read-mostly registry of canonical tickers. Discovery rewrites one
/// symbol's entry atomically; no cross-symbol lock is ever taken.
#[derive(Default)]
pub struct TickerRegistry {
    tickers: DashMap<String, Ticker>,
}

impl TickerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically replaces one symbol's ticker, generating its arbitrage
    /// pairs as part of the same write.
    pub fn refresh(&self, mut ticker: Ticker) {
        ticker.arbitrage_pairs = ticker.generate_pairs();
        info!(
            symbol = %ticker.symbol,
            pairs = ticker.arbitrage_pairs.len(),
            valid = ticker.is_valid,
            "ticker refreshed"
        );
        self.tickers.insert(ticker.symbol.clone(), ticker);
    }

    pub fn get(&self, symbol: &str) -> Option<Ticker> {
        self.tickers.get(symbol).map(|t| t.clone())
    }

    pub fn all_valid(&self) -> Vec<Ticker> {
        self.tickers
            .iter()
            .filter(|t| t.is_valid)
            .map(|t| t.clone())
            .collect()
    }

    pub fn all_pairs(&self) -> Vec<ArbitragePair> {
        self.tickers
            .iter()
            .filter(|t| t.is_valid)
            .flat_map(|t| t.arbitrage_pairs.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tickers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tickers.is_empty()
    }
}

/// Maps a `VenueId` to its adapter and capability bundle — the
/// heterogeneous-venue-collection design note in spec.md §9.
#[derive(Default, Clone)]
pub struct VenueRegistry {
    adapters: Arc<DashMap<VenueId, Arc<dyn VenueAdapter>>>,
}

impl VenueRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, adapter: Arc<dyn VenueAdapter>) {
        self.adapters.insert(adapter.venue_id().clone(), adapter);
    }

    pub fn get(&self, venue_id: &VenueId) -> Option<Arc<dyn VenueAdapter>> {
        self.adapters.get(venue_id).map(|a| a.clone())
    }

    pub fn capabilities(&self, venue_id: &VenueId) -> Option<VenueCapabilities> {
        self.get(venue_id).map(|a| a.capabilities())
    }

    pub fn venue_ids(&self) -> Vec<VenueId> {
        self.adapters.iter().map(|e| e.key().clone()).collect()
    }
}
