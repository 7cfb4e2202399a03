//! Price & Order-Book Fetcher (spec.md §4.3)
//! Mission: Turn a tick's pending pairs into two tick-scoped maps of fresh quotes/books,
//! paying each venue's rate limit and accepting that partial failure is the norm.

pub mod token_bucket;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use dashmap::DashMap;
use tracing::warn;

use crate::adapter::VenueAdapter;
use crate::models::{ArbitragePair, OrderBook, Quote, VenueId};
use crate::registry::VenueRegistry;
use crate::retry::{retry, RetryPolicy};
use token_bucket::TokenBucket;

fn key(venue_id: &VenueId, symbol: &str) -> String {
    format!("{venue_id}|{symbol}")
}

/// Tick-scoped quote/order-book maps plus the per-venue token buckets that
/// pace requests across ticks. One instance lives for the process lifetime;
/// `clear_tick` is called at the start of each monitor-loop tick.
pub struct Fetcher {
    registry: VenueRegistry,
    buckets: DashMap<VenueId, Arc<TokenBucket>>,
    quotes: Arc<DashMap<String, Quote>>,
    books: Arc<DashMap<String, OrderBook>>,
    retry_policy: RetryPolicy,
}

impl Fetcher {
    pub fn new(registry: VenueRegistry, bucket_capacity: f64, bucket_refill_per_sec: f64) -> Self {
        let buckets = DashMap::new();
        for venue_id in registry.venue_ids() {
            buckets.insert(venue_id, Arc::new(TokenBucket::new(bucket_capacity, bucket_refill_per_sec)));
        }
        Self {
            registry,
            buckets,
            quotes: Arc::new(DashMap::new()),
            books: Arc::new(DashMap::new()),
            retry_policy: RetryPolicy::default(),
        }
    }

    fn bucket_for(&self, venue_id: &VenueId) -> Arc<TokenBucket> {
        self.buckets
            .entry(venue_id.clone())
            .or_insert_with(|| Arc::new(TokenBucket::new(1.0, 1.0)))
            .clone()
    }

    pub fn clear_tick(&self) {
        self.quotes.clear();
        self.books.clear();
    }

    pub fn get_quote(&self, venue_id: &VenueId, symbol: &str) -> Option<Quote> {
        self.quotes.get(&key(venue_id, symbol)).map(|q| q.clone())
    }

    pub fn get_book(&self, venue_id: &VenueId, symbol: &str) -> Option<OrderBook> {
        self.books.get(&key(venue_id, symbol)).map(|b| b.clone())
    }

    /// Groups `pairs` by venue and fetches one batch per venue concurrently;
    /// within a venue, symbols are fetched sequentially (honoring the
    /// per-venue token bucket and matching each adapter's own in-flight
    /// limit of one).
    pub async fn fetch_quotes(&self, pairs: &[ArbitragePair]) {
        let by_venue = group_symbols_by_venue(pairs);

        let mut handles = Vec::new();
        for (venue_id, symbols) in by_venue {
            let Some(adapter) = self.registry.get(&venue_id) else {
                warn!(venue = %venue_id, "no adapter registered, skipping");
                continue;
            };
            let bucket = self.bucket_for(&venue_id);
            let policy = self.retry_policy.clone();
            let quotes = self.quotes.clone();
            handles.push(tokio::spawn(async move {
                fetch_venue_quotes(adapter, bucket, policy, venue_id, symbols, quotes).await;
            }));
        }

        for handle in handles {
            let _ = handle.await;
        }
    }

    pub async fn fetch_orderbooks(&self, pairs: &[ArbitragePair], depth: usize) {
        let by_venue = group_symbols_by_venue(pairs);

        let mut handles = Vec::new();
        for (venue_id, symbols) in by_venue {
            let Some(adapter) = self.registry.get(&venue_id) else {
                warn!(venue = %venue_id, "no adapter registered, skipping");
                continue;
            };
            let bucket = self.bucket_for(&venue_id);
            let policy = self.retry_policy.clone();
            let books = self.books.clone();
            handles.push(tokio::spawn(async move {
                fetch_venue_orderbooks(adapter, bucket, policy, venue_id, symbols, depth, books).await;
            }));
        }

        for handle in handles {
            let _ = handle.await;
        }
    }

    /// A pair is completable for this tick iff both sides have a quote
    /// present (freshness is checked by the caller against `Quote::is_fresh`,
    /// since the age bound is a pipeline-level setting, not the fetcher's).
    pub fn completable_pairs(&self, pairs: &[ArbitragePair]) -> Vec<ArbitragePair> {
        pairs
            .iter()
            .filter(|p| self.quotes.contains_key(&key(&p.low_venue, &p.symbol)) && self.quotes.contains_key(&key(&p.high_venue, &p.symbol)))
            .cloned()
            .collect()
    }
}

fn group_symbols_by_venue(pairs: &[ArbitragePair]) -> HashMap<VenueId, Vec<String>> {
    let mut out: HashMap<VenueId, HashSet<String>> = HashMap::new();
    for pair in pairs {
        out.entry(pair.low_venue.clone()).or_default().insert(pair.symbol.clone());
        out.entry(pair.high_venue.clone()).or_default().insert(pair.symbol.clone());
    }
    out.into_iter().map(|(k, v)| (k, v.into_iter().collect())).collect()
}

async fn fetch_venue_quotes(
    adapter: Arc<dyn VenueAdapter>,
    bucket: Arc<TokenBucket>,
    policy: RetryPolicy,
    venue_id: VenueId,
    symbols: Vec<String>,
    quotes: Arc<DashMap<String, Quote>>,
) {
    for symbol in symbols {
        bucket.acquire().await;
        let venue_id_for_retry = venue_id.clone();
        let adapter = adapter.clone();
        let symbol_for_fetch = symbol.clone();
        let result = retry(policy, &venue_id_for_retry.0, || {
            let adapter = adapter.clone();
            let symbol = symbol_for_fetch.clone();
            async move { adapter.ticker(&symbol).await }
        })
        .await;

        match result {
            Ok(quote) => {
                quotes.insert(key(&venue_id, &symbol), quote);
            }
            Err(e) => {
                warn!(venue = %venue_id, symbol = %symbol, error = %e, "quote fetch failed, skipping pair this tick");
            }
        }
    }
}

async fn fetch_venue_orderbooks(
    adapter: Arc<dyn VenueAdapter>,
    bucket: Arc<TokenBucket>,
    policy: RetryPolicy,
    venue_id: VenueId,
    symbols: Vec<String>,
    depth: usize,
    books: Arc<DashMap<String, OrderBook>>,
) {
    for symbol in symbols {
        bucket.acquire().await;
        let venue_id_for_retry = venue_id.clone();
        let adapter = adapter.clone();
        let symbol_for_fetch = symbol.clone();
        let result = retry(policy, &venue_id_for_retry.0, || {
            let adapter = adapter.clone();
            let symbol = symbol_for_fetch.clone();
            async move { adapter.orderbook(&symbol, depth).await }
        })
        .await;

        match result {
            Ok(book) => {
                if let Err(e) = book.validate() {
                    warn!(venue = %venue_id, symbol = %symbol, error = %e, "order book failed integrity check, discarding");
                    continue;
                }
                books.insert(key(&venue_id, &symbol), book);
            }
            Err(e) => {
                warn!(venue = %venue_id, symbol = %symbol, error = %e, "order book fetch failed, skipping pair this tick");
            }
        }
    }
}
