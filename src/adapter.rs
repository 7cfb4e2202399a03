//! Venue Adapter Contract
//! Mission: One façade shape for every CEX/DEX/perp-DEX venue, so the fetcher and
//! calculators never know which venue they're talking to.
//!
//! Concrete adapters (Binance, Jupiter, dYdX, ...) are out of scope for this
//! crate (spec.md §1) — only the interface and a deterministic in-memory
//! [`MockAdapter`] used by tests are implemented here.

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::error::VenueError;
use crate::models::{BookTiming, OrderBook, Quote, VenueId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VenueCapabilities {
    pub quotes: bool,
    pub orderbook: bool,
    pub funding: bool,
    pub shortable: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarketStatus {
    pub tradable: bool,
}

#[derive(Debug, Clone)]
pub struct MarketInfo {
    pub symbol: String,
    pub base: String,
    pub quote: String,
    pub status: MarketStatus,
}

#[derive(Debug, Clone, Copy)]
pub struct FundingRate {
    pub rate_pct: Decimal,
    pub next_funding_ms: i64,
}

/// Uniform façade over CEX/DEX/perp venue APIs (spec.md §4.1).
///
/// Every method attaches timing information; implementations are expected to
/// classify their own errors into `VenueError::Transient` (timeout, 5xx,
/// rate-limited) vs `VenueError::Permanent` (4xx not-found, malformed) so
/// `crate::retry::retry` can decide whether to retry.
#[async_trait]
pub trait VenueAdapter: Send + Sync {
    fn venue_id(&self) -> &VenueId;

    fn capabilities(&self) -> VenueCapabilities;

    async fn markets(&self) -> Result<Vec<MarketInfo>, VenueError>;

    async fn ticker(&self, symbol: &str) -> Result<Quote, VenueError>;

    async fn tickers(&self, symbols: &[String]) -> Result<Vec<Quote>, VenueError>;

    async fn orderbook(&self, symbol: &str, depth: usize) -> Result<OrderBook, VenueError>;

    /// Only meaningful for perpetual venues; the default implementation
    /// reports the capability as unsupported rather than panicking so
    /// callers can check `capabilities().funding` first or just match on
    /// the error.
    async fn funding_rate(&self, _symbol: &str) -> Result<FundingRate, VenueError> {
        Err(VenueError::Permanent {
            venue: self.venue_id().0.clone(),
            message: "funding_rate not supported by this venue".into(),
        })
    }
}

/// Deterministic in-memory adapter used by tests and the bundled demo
/// binary. Books/quotes are pre-seeded and returned verbatim; latency is
/// synthetic so tests can exercise freshness/timing checks precisely.
pub struct MockAdapter {
    id: VenueId,
    caps: VenueCapabilities,
    quotes: dashmap::DashMap<String, Quote>,
    books: dashmap::DashMap<String, OrderBook>,
    fail_next: std::sync::atomic::AtomicU32,
}

impl MockAdapter {
    pub fn new(id: impl Into<VenueId>, caps: VenueCapabilities) -> Self {
        Self {
            id: id.into(),
            caps,
            quotes: dashmap::DashMap::new(),
            books: dashmap::DashMap::new(),
            fail_next: std::sync::atomic::AtomicU32::new(0),
        }
    }

    pub fn seed_quote(&self, quote: Quote) {
        self.quotes.insert(quote.symbol.clone(), quote);
    }

    pub fn seed_book(&self, book: OrderBook) {
        self.books.insert(book.symbol.clone(), book);
    }

    /// Makes the next `n` calls to any method fail with a transient error,
    /// for exercising the fetcher's partial-outage handling.
    pub fn fail_next_n(&self, n: u32) {
        self.fail_next.store(n, std::sync::atomic::Ordering::SeqCst);
    }

    fn maybe_fail(&self) -> Result<(), VenueError> {
        let remaining = self.fail_next.load(std::sync::atomic::Ordering::SeqCst);
        if remaining > 0 {
            self.fail_next
                .store(remaining - 1, std::sync::atomic::Ordering::SeqCst);
            return Err(VenueError::Transient {
                venue: self.id.0.clone(),
                message: "synthetic failure".into(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl VenueAdapter for MockAdapter {
    fn venue_id(&self) -> &VenueId {
        &self.id
    }

    fn capabilities(&self) -> VenueCapabilities {
        self.caps
    }

    async fn markets(&self) -> Result<Vec<MarketInfo>, VenueError> {
        self.maybe_fail()?;
        Ok(self
            .quotes
            .iter()
            .map(|entry| MarketInfo {
                symbol: entry.key().clone(),
                base: entry.key().clone(),
                quote: "USD".to_string(),
                status: MarketStatus { tradable: true },
            })
            .collect())
    }

    async fn ticker(&self, symbol: &str) -> Result<Quote, VenueError> {
        self.maybe_fail()?;
        self.quotes.get(symbol).map(|q| q.clone()).ok_or_else(|| VenueError::Permanent {
            venue: self.id.0.clone(),
            message: format!("no quote seeded for {symbol}"),
        })
    }

    async fn tickers(&self, symbols: &[String]) -> Result<Vec<Quote>, VenueError> {
        self.maybe_fail()?;
        let mut out = Vec::with_capacity(symbols.len());
        for s in symbols {
            if let Some(q) = self.quotes.get(s) {
                out.push(q.clone());
            }
        }
        Ok(out)
    }

    async fn orderbook(&self, symbol: &str, depth: usize) -> Result<OrderBook, VenueError> {
        self.maybe_fail()?;
        self.books
            .get(symbol)
            .map(|b| {
                let mut book = b.clone();
                book.bids.truncate(depth);
                book.asks.truncate(depth);
                book
            })
            .ok_or_else(|| VenueError::Permanent {
                venue: self.id.0.clone(),
                message: format!("no book seeded for {symbol}"),
            })
    }

    async fn funding_rate(&self, _symbol: &str) -> Result<FundingRate, VenueError> {
        if !self.caps.funding {
            return Err(VenueError::Permanent {
                venue: self.id.0.clone(),
                message: "venue does not support funding rates".into(),
            });
        }
        Ok(FundingRate {
            rate_pct: Decimal::ZERO,
            next_funding_ms: 0,
        })
    }
}

pub fn synthetic_timing(request_at_ms: i64, latency_ms: u32) -> BookTiming {
    BookTiming {
        request_at_ms,
        response_at_ms: request_at_ms + latency_ms as i64,
        latency_ms,
    }
}
