//! Core Data Model
//! Mission: One strongly-typed shape for every value that flows through the pipeline.

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Canonical venue identifier, e.g. `binance_futures`, `jupiter`.
///
/// Venue ids are compared case-sensitively: they are assigned once at
/// registry time, not typed by a human at alert time. The case-insensitive
/// comparisons in the spec apply to blacklist lookups, not to this type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VenueId(pub String);

impl fmt::Display for VenueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for VenueId {
    fn from(s: &str) -> Self {
        VenueId(s.to_string())
    }
}

/// Stable string key: `symbol|low_venue_id|high_venue_id`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PairId(pub String);

impl PairId {
    pub fn new(symbol: &str, low_venue: &VenueId, high_venue: &VenueId) -> Self {
        PairId(format!("{symbol}|{low_venue}|{high_venue}"))
    }
}

impl fmt::Display for PairId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The venue-family classes a ticker's listings are grouped into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VenueKind {
    CexSpot,
    CexFutures,
    DexSpot,
    PerpDex,
}

impl VenueKind {
    /// A venue kind supports opening a short position directly.
    pub fn is_shortable(self) -> bool {
        matches!(self, VenueKind::CexFutures | VenueKind::PerpDex)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VenueListing {
    pub venue_id: VenueId,
    pub kind: VenueKind,
    pub taker_fee_pct: Decimal,
}

/// A tradable symbol and everywhere it is listed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticker {
    pub symbol: String,
    /// chain -> contract address, for DEX/perp-DEX venues.
    pub contracts: std::collections::BTreeMap<String, String>,
    pub venues: Vec<VenueListing>,
    pub arbitrage_pairs: Vec<ArbitragePair>,
    pub is_valid: bool,
    pub validation_errors: Vec<String>,
    pub updated_at: i64,
}

impl Ticker {
    /// A ticker is shortable iff it has at least one active cex-futures or
    /// perp-dex venue.
    pub fn is_shortable(&self) -> bool {
        self.venues.iter().any(|v| v.kind.is_shortable())
    }

    /// Enumerate unordered venue pairs, discarding pairs where neither side
    /// is shortable. `low_venue`/`high_venue` here are just the alphabetical
    /// ordering used to build a stable `pair_id` — which one is the buy side
    /// and which is the sell side is decided by `orchestrator::evaluate_pair`
    /// from the observed quotes, fresh every tick (spec.md §4.2).
    pub fn generate_pairs(&self) -> Vec<ArbitragePair> {
        let mut pairs = Vec::new();
        for i in 0..self.venues.len() {
            for j in (i + 1)..self.venues.len() {
                let a = &self.venues[i];
                let b = &self.venues[j];
                if !a.kind.is_shortable() && !b.kind.is_shortable() {
                    continue;
                }
                // Canonical ordering so the same unordered pair always
                // produces the same pair_id regardless of iteration order.
                let (first, second) = if a.venue_id <= b.venue_id {
                    (&a.venue_id, &b.venue_id)
                } else {
                    (&b.venue_id, &a.venue_id)
                };
                pairs.push(ArbitragePair {
                    pair_id: PairId::new(&self.symbol, first, second),
                    symbol: self.symbol.clone(),
                    low_venue: first.clone(),
                    high_venue: second.clone(),
                });
            }
        }
        pairs
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArbitragePair {
    pub pair_id: PairId,
    pub symbol: String,
    pub low_venue: VenueId,
    pub high_venue: VenueId,
}

/// A single venue's current best bid/ask for a symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quote {
    pub venue_id: VenueId,
    pub symbol: String,
    pub bid: Decimal,
    pub ask: Decimal,
    pub mid: Option<Decimal>,
    pub mark: Option<Decimal>,
    pub volume_24h: Option<Decimal>,
    pub received_at_ms: i64,
    pub latency_ms: u32,
}

impl Quote {
    pub fn mid_price(&self) -> Decimal {
        self.mid.unwrap_or((self.bid + self.ask) / Decimal::from(2))
    }

    /// A quote is fresh iff `now - received_at_ms <= max_price_age_ms`.
    pub fn is_fresh(&self, now_ms: i64, max_price_age_ms: i64) -> bool {
        now_ms.saturating_sub(self.received_at_ms) <= max_price_age_ms
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookLevel {
    pub price: Decimal,
    pub size: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookTiming {
    pub request_at_ms: i64,
    pub response_at_ms: i64,
    pub latency_ms: u32,
}

/// Order book depth for one venue/symbol. Bids strictly descending by price,
/// asks strictly ascending, all sizes positive (enforced by `validate`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderBook {
    pub venue_id: VenueId,
    pub symbol: String,
    pub bids: Vec<BookLevel>,
    pub asks: Vec<BookLevel>,
    pub timing: BookTiming,
}

impl OrderBook {
    pub fn best_bid(&self) -> Option<&BookLevel> {
        self.bids.first()
    }

    pub fn best_ask(&self) -> Option<&BookLevel> {
        self.asks.first()
    }

    /// Checks the invariants from spec.md §3: bids strictly descending,
    /// asks strictly ascending, all sizes positive.
    pub fn validate(&self) -> Result<(), crate::error::DataIntegrityError> {
        for level in self.bids.iter().chain(self.asks.iter()) {
            if level.size <= Decimal::ZERO {
                return Err(crate::error::DataIntegrityError::NonPositiveSize {
                    venue: self.venue_id.0.clone(),
                    symbol: self.symbol.clone(),
                });
            }
        }
        if !is_strictly_decreasing(&self.bids) {
            return Err(crate::error::DataIntegrityError::NonMonotonicBook {
                venue: self.venue_id.0.clone(),
                symbol: self.symbol.clone(),
                side: "bids",
            });
        }
        if !is_strictly_increasing(&self.asks) {
            return Err(crate::error::DataIntegrityError::NonMonotonicBook {
                venue: self.venue_id.0.clone(),
                symbol: self.symbol.clone(),
                side: "asks",
            });
        }
        Ok(())
    }
}

fn is_strictly_decreasing(levels: &[BookLevel]) -> bool {
    levels.windows(2).all(|w| w[0].price > w[1].price)
}

fn is_strictly_increasing(levels: &[BookLevel]) -> bool {
    levels.windows(2).all(|w| w[0].price < w[1].price)
}

/// Result of walking an order book side to fill a target USD notional, or to
/// accumulate depth within a slippage bound (spec.md §4.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepthResult {
    pub side: Side,
    pub total_base: Decimal,
    pub total_usd: Decimal,
    pub weighted_avg_price: Decimal,
    pub levels_consumed: usize,
    pub slippage_pct_at_end: Decimal,
}

/// Result of walking a book side to fill a specific USD notional.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutableFill {
    pub executable_price: Decimal,
    pub slippage_pct: Decimal,
    pub filled_usd: Decimal,
    pub unfilled_usd: Decimal,
    pub insufficient_depth: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalType {
    Auto,
    Manual,
    Lagging,
}

/// Venue-type pairing code: the cross product of the four venue kinds,
/// collapsed to the two-letter codes named in spec.md §9 Open Question (a).
/// D = dex spot, C = cex spot, F = cex futures, P = perp dex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StrategyType {
    /// dex-spot -> cex-futures (or the reverse)
    Df,
    /// cex-spot -> cex-futures (or the reverse)
    Sf,
    /// cex-spot -> cex-spot
    Ss,
    /// dex-spot -> dex-spot
    Dd,
    /// dex-spot -> perp-dex
    Dp,
    /// cex-futures -> perp-dex
    Pf,
    /// perp-dex -> perp-dex
    Pp,
    /// cex-futures -> cex-futures
    Ff,
}

impl StrategyType {
    pub fn as_str(self) -> &'static str {
        match self {
            StrategyType::Df => "DF",
            StrategyType::Sf => "SF",
            StrategyType::Ss => "SS",
            StrategyType::Dd => "DD",
            StrategyType::Dp => "DP",
            StrategyType::Pf => "PF",
            StrategyType::Pp => "PP",
            StrategyType::Ff => "FF",
        }
    }

    /// Derives the code from the (unordered) pair of venue kinds involved.
    /// See DESIGN.md for the full cross-product table this implements.
    pub fn from_kinds(a: VenueKind, b: VenueKind) -> Self {
        use VenueKind::*;
        match (a, b) {
            (DexSpot, CexFutures) | (CexFutures, DexSpot) => StrategyType::Df,
            (CexSpot, CexFutures) | (CexFutures, CexSpot) => StrategyType::Sf,
            (CexSpot, CexSpot) => StrategyType::Ss,
            (DexSpot, DexSpot) => StrategyType::Dd,
            (DexSpot, PerpDex) | (PerpDex, DexSpot) => StrategyType::Dp,
            (CexFutures, PerpDex) | (PerpDex, CexFutures) => StrategyType::Pf,
            (PerpDex, PerpDex) => StrategyType::Pp,
            (CexFutures, CexFutures) => StrategyType::Ff,
            (CexSpot, DexSpot) | (DexSpot, CexSpot) => StrategyType::Dd,
            (CexSpot, PerpDex) | (PerpDex, CexSpot) => StrategyType::Pf,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpreadBreakdown {
    pub nominal_pct: Decimal,
    pub real_pct: Decimal,
    pub slippage_loss_pct: Decimal,
    pub fees_pct: Decimal,
    pub net_pct: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceSnapshot {
    pub low_venue_bid: Decimal,
    pub low_venue_ask: Decimal,
    pub high_venue_bid: Decimal,
    pub high_venue_ask: Decimal,
    pub low_venue_exec: Decimal,
    pub high_venue_exec: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiquiditySnapshot {
    pub exit_usd: Decimal,
    pub entry_usd: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingSnapshot {
    pub low_venue_latency_ms: u32,
    pub high_venue_latency_ms: u32,
    pub latency_diff_ms: u32,
    pub max_latency_ms: u32,
    pub fresh: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckResult {
    pub check_name: &'static str,
    pub passed: bool,
    pub detail: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyVerdict {
    pub passed: bool,
    pub results: Vec<CheckResult>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaggingInfo {
    pub lagging_venue: VenueId,
    pub deviation_pct: Decimal,
    pub other_exchanges_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalStatus {
    Sent,
    Suppressed,
    Failed,
}

/// A proto-signal is what the signal builder receives before the safety
/// verdict has been attached; constructing one is cheap and side-effect
/// free so diagnostics can be produced even for signals that never emit.
#[derive(Debug, Clone)]
pub struct ProtoSignal {
    pub pair_id: PairId,
    pub symbol: String,
    pub signal_type: SignalType,
    pub low_venue: VenueId,
    pub high_venue: VenueId,
    pub low_kind: VenueKind,
    pub high_kind: VenueKind,
    pub prices: PriceSnapshot,
    pub spread: SpreadBreakdown,
    pub liquidity: LiquiditySnapshot,
    pub timing: TimingSnapshot,
    pub position_size_usd: Decimal,
    pub suggested_position_usd: Decimal,
    pub lagging_info: Option<LaggingInfo>,
}

/// Immutable, write-once record of one emitted (or diagnosed) signal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatedSignal {
    pub id: Uuid,
    pub pair_id: PairId,
    pub symbol: String,
    pub signal_type: SignalType,
    pub strategy_type: StrategyType,
    pub low_venue: VenueId,
    pub high_venue: VenueId,
    pub prices: PriceSnapshot,
    pub spread: SpreadBreakdown,
    pub liquidity: LiquiditySnapshot,
    pub timing: TimingSnapshot,
    pub position_size_usd: Decimal,
    pub suggested_position_usd: Decimal,
    pub safety_checks: SafetyVerdict,
    pub lagging_info: Option<LaggingInfo>,
    pub actions: Vec<String>,
    pub links: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub status: SignalStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    Converged,
    Timeout,
}

/// Persistent per-signal convergence state. Running aggregates live on the
/// record itself (spec.md §9 design note) so a tick never replays snapshot
/// history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConvergenceRecord {
    pub signal_id: Uuid,
    pub initial_spread_pct: Decimal,
    pub current_spread_pct: Decimal,
    pub min_spread_pct: Decimal,
    pub max_spread_pct: Decimal,
    pub converged: bool,
    pub converged_at: Option<DateTime<Utc>>,
    pub diverged: bool,
    pub diverged_at: Option<DateTime<Utc>>,
    pub consecutive_under_floor: u32,
    pub checks_count: u32,
    pub started_at: DateTime<Utc>,
    pub last_checked_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub close_reason: Option<CloseReason>,
}

impl ConvergenceRecord {
    pub fn new(signal_id: Uuid, initial_spread_pct: Decimal, now: DateTime<Utc>) -> Self {
        Self {
            signal_id,
            initial_spread_pct,
            current_spread_pct: initial_spread_pct,
            min_spread_pct: initial_spread_pct,
            max_spread_pct: initial_spread_pct,
            converged: false,
            converged_at: None,
            diverged: false,
            diverged_at: None,
            consecutive_under_floor: 0,
            checks_count: 0,
            started_at: now,
            last_checked_at: now,
            closed_at: None,
            close_reason: None,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed_at.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConvergenceSnapshot {
    pub signal_id: Uuid,
    pub snapshot_seq: u32,
    pub ts: DateTime<Utc>,
    pub low_venue_bid: Decimal,
    pub low_venue_ask: Decimal,
    pub high_venue_bid: Decimal,
    pub high_venue_ask: Decimal,
    pub spread_pct: Decimal,
    pub low_venue_depth_usd: Decimal,
    pub high_venue_depth_usd: Decimal,
}
