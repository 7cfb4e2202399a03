//! Orchestrator / Job Loops (spec.md §4.11)
//! Mission: Keep every periodic job alive through transient failures — each loop catches
//! errors at its own boundary, backs off, and resumes; no loop can take the process down.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rust_decimal::Decimal;
use tokio::time::interval;
use tracing::{error, info, warn};

use crate::calculators::{depth, executable_price, spread};
use crate::config::Settings;
use crate::convergence::ConvergenceTracker;
use crate::cooldown::{Blacklist, CooldownGate};
use crate::fetcher::Fetcher;
use crate::lagging::LaggingVenueDetector;
use crate::messaging::{MessagingChannel, OutboundMessage};
use crate::models::{
    ArbitragePair, LaggingInfo, LiquiditySnapshot, OrderBook, PairId, PriceSnapshot, ProtoSignal,
    Quote, Side, SignalType, VenueId, VenueKind,
};
use crate::registry::{TickerRegistry, VenueRegistry};
use crate::safety::{net_spread_floor, suggested_position_usd, SafetyValidator};
use crate::signal_builder;
use crate::store::SignalStore;
use crate::trackers::{DepthHistoryCollector, SpreadAgeTracker};

const ERROR_BACKOFF: Duration = Duration::from_secs(60);
const ORDERBOOK_DEPTH: usize = 20;

/// Long-lived dependency container handed to every job loop. Cheap to
/// clone: everything inside is already an `Arc` or internally-synchronized.
pub struct Pipeline {
    pub settings: Settings,
    pub venues: VenueRegistry,
    pub tickers: TickerRegistry,
    pub fetcher: Arc<Fetcher>,
    pub spread_age: Arc<SpreadAgeTracker>,
    pub depth_history: Arc<DepthHistoryCollector>,
    pub lagging: Arc<LaggingVenueDetector>,
    pub cooldown: Arc<CooldownGate>,
    pub blacklist: Arc<Blacklist>,
    pub convergence: Arc<ConvergenceTracker>,
    pub store: Arc<SignalStore>,
    pub channel: Arc<dyn MessagingChannel>,
    pub stop: Arc<AtomicBool>,
}

impl Pipeline {
    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    fn should_stop(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }
}

/// Starts every job loop as its own task and returns once all have been
/// spawned. Each loop runs until `pipeline.stop()` is called.
pub fn spawn_all(pipeline: Arc<Pipeline>) -> Vec<tokio::task::JoinHandle<()>> {
    vec![
        tokio::spawn(ticker_discovery_loop(pipeline.clone())),
        tokio::spawn(price_monitor_loop(pipeline.clone())),
        tokio::spawn(orderbook_analysis_loop(pipeline.clone())),
        tokio::spawn(convergence_loop(pipeline.clone())),
        tokio::spawn(safety_alert_loop(pipeline)),
    ]
}

/// Daily ticker discovery. This rewrite has no live discovery source (venue
/// adapter implementations are out of scope); the loop exists so a future
/// discovery source can be wired in without changing the orchestrator shape.
async fn ticker_discovery_loop(pipeline: Arc<Pipeline>) {
    let mut tick = interval(Duration::from_secs(24 * 3600));
    loop {
        tick.tick().await;
        if pipeline.should_stop() {
            return;
        }
        match run_ticker_discovery(&pipeline).await {
            Ok(()) => info!("ticker discovery tick complete"),
            Err(e) => {
                error!(error = %e, "ticker discovery failed, backing off");
                tokio::time::sleep(ERROR_BACKOFF).await;
            }
        }
    }
}

async fn run_ticker_discovery(pipeline: &Pipeline) -> anyhow::Result<()> {
    info!(tickers = pipeline.tickers.len(), "discovery is a no-op in this build; registry unchanged");
    Ok(())
}

/// Seconds-scale price monitor: fetches quotes for every registered pair and
/// records which pairs are completable this tick.
async fn price_monitor_loop(pipeline: Arc<Pipeline>) {
    let mut tick = interval(Duration::from_secs(5));
    loop {
        tick.tick().await;
        if pipeline.should_stop() {
            return;
        }
        if let Err(e) = run_price_monitor(&pipeline).await {
            error!(error = %e, "price monitor tick failed, backing off");
            tokio::time::sleep(ERROR_BACKOFF).await;
        }
    }
}

async fn run_price_monitor(pipeline: &Pipeline) -> anyhow::Result<()> {
    let pairs = pipeline.tickers.all_pairs();
    pipeline.fetcher.clear_tick();
    pipeline.fetcher.fetch_quotes(&pairs).await;
    let completable = pipeline.fetcher.completable_pairs(&pairs);
    info!(total = pairs.len(), completable = completable.len(), "price monitor tick complete");
    Ok(())
}

/// Tens-of-seconds order-book analysis: fetches books for completable
/// pairs, runs the calculators, records depth history, and evaluates the
/// full pipeline (safety validator, lagging detector, signal builder).
async fn orderbook_analysis_loop(pipeline: Arc<Pipeline>) {
    let mut tick = interval(Duration::from_secs(20));
    loop {
        tick.tick().await;
        if pipeline.should_stop() {
            return;
        }
        if let Err(e) = run_orderbook_analysis(&pipeline).await {
            error!(error = %e, "order-book analysis tick failed, backing off");
            tokio::time::sleep(ERROR_BACKOFF).await;
        }
    }
}

async fn run_orderbook_analysis(pipeline: &Pipeline) -> anyhow::Result<()> {
    let pairs = pipeline.tickers.all_pairs();
    let completable = pipeline.fetcher.completable_pairs(&pairs);
    pipeline.fetcher.fetch_orderbooks(&completable, ORDERBOOK_DEPTH).await;

    for pair in &completable {
        evaluate_pair(pipeline, pair).await;
    }

    Ok(())
}

/// One side of an arbitrage leg, resolved for this tick: which venue, what
/// kind of venue it is, its book/quote, and its taker fee.
struct Leg {
    venue: VenueId,
    kind: VenueKind,
    fee_pct: Decimal,
    book: OrderBook,
    quote: Quote,
}

/// Orders two legs into (buy, sell) by observed mid-price — the cheaper
/// venue is always the buy side, the more expensive one the sell side.
/// This is decided fresh every tick from live quotes; `pair.low_venue`/
/// `pair.high_venue` (alphabetical) only exist to give the pair a stable
/// tracking key and never determine trade direction.
fn order_legs(a: Leg, b: Leg) -> (Leg, Leg) {
    if a.quote.mid_price() <= b.quote.mid_price() {
        (a, b)
    } else {
        (b, a)
    }
}

async fn evaluate_pair(pipeline: &Pipeline, pair: &ArbitragePair) {
    let Some(book_a) = pipeline.fetcher.get_book(&pair.low_venue, &pair.symbol) else { return };
    let Some(book_b) = pipeline.fetcher.get_book(&pair.high_venue, &pair.symbol) else { return };
    let Some(quote_a) = pipeline.fetcher.get_quote(&pair.low_venue, &pair.symbol) else { return };
    let Some(quote_b) = pipeline.fetcher.get_quote(&pair.high_venue, &pair.symbol) else { return };

    let Some(ticker) = pipeline.tickers.get(&pair.symbol) else { return };
    let Some(listing_a) = ticker.venues.iter().find(|v| v.venue_id == pair.low_venue) else { return };
    let Some(listing_b) = ticker.venues.iter().find(|v| v.venue_id == pair.high_venue) else { return };

    let leg_a = Leg { venue: pair.low_venue.clone(), kind: listing_a.kind, fee_pct: listing_a.taker_fee_pct, book: book_a, quote: quote_a };
    let leg_b = Leg { venue: pair.high_venue.clone(), kind: listing_b.kind, fee_pct: listing_b.taker_fee_pct, book: book_b, quote: quote_b };
    let (buy, sell) = order_legs(leg_a, leg_b);

    build_and_emit(pipeline, pair.pair_id.clone(), pair.symbol.clone(), buy, sell, SignalType::Auto, None).await;
}

/// Shared tail of both the per-pair and lagging-venue evaluation paths:
/// spread/depth/executable-price, safety validation, blacklist/cooldown
/// gates, signal construction, persistence, convergence tracking, and the
/// outbound alert. `pair_id` is the stable tracking key (spec.md §4.2); it
/// does not need to agree with which of `buy`/`sell` is alphabetically
/// "low" or "high".
async fn build_and_emit(
    pipeline: &Pipeline,
    pair_id: PairId,
    symbol: String,
    buy: Leg,
    sell: Leg,
    signal_type: SignalType,
    lagging_info: Option<LaggingInfo>,
) {
    let target_usd = Decimal::from(pipeline.settings.min_exit_liquidity_usd);

    let Some(breakdown) = spread::compute_spread(&buy.book, &sell.book, target_usd, buy.fee_pct, sell.fee_pct) else {
        return;
    };

    let is_lagging = lagging_info.is_some();
    let floor = net_spread_floor(&pipeline.settings, is_lagging);
    if !spread::is_emittable(&breakdown, floor, pipeline.settings.max_spread_pct) {
        return;
    }

    let abs_spread = breakdown.net_pct.abs();
    pipeline.spread_age.observe(&pair_id, abs_spread, pipeline.settings.min_spread_pct);

    let exit_depth = depth::depth_within_slippage(Side::Sell, &sell.book.bids, pipeline.settings.max_slippage_pct);
    let entry_depth = depth::depth_within_slippage(Side::Buy, &buy.book.asks, pipeline.settings.max_slippage_pct);
    pipeline.depth_history.record(&pair_id, &sell.venue, Side::Sell, exit_depth.total_usd);

    let buy_fill = executable_price::executable_price(Side::Buy, &buy.book.asks, target_usd);
    let sell_fill = executable_price::executable_price(Side::Sell, &sell.book.bids, target_usd);

    let suggested = suggested_position_usd(
        exit_depth.total_usd,
        Decimal::from(pipeline.settings.suggested_position_hard_cap_usd),
    );

    let now_ms = Utc::now().timestamp_millis();
    let quote_age_fresh = buy.quote.is_fresh(now_ms, pipeline.settings.max_price_age_ms)
        && sell.quote.is_fresh(now_ms, pipeline.settings.max_price_age_ms);
    let timing = crate::trackers::timing::snapshot(
        &buy.book.timing,
        &sell.book.timing,
        pipeline.settings.max_latency_ms,
        pipeline.settings.max_latency_diff_ms,
        quote_age_fresh,
    );

    let proto = ProtoSignal {
        pair_id: pair_id.clone(),
        symbol: symbol.clone(),
        signal_type,
        low_venue: buy.venue.clone(),
        high_venue: sell.venue.clone(),
        low_kind: buy.kind,
        high_kind: sell.kind,
        prices: PriceSnapshot {
            low_venue_bid: buy.quote.bid,
            low_venue_ask: buy.quote.ask,
            high_venue_bid: sell.quote.bid,
            high_venue_ask: sell.quote.ask,
            low_venue_exec: buy_fill.executable_price,
            high_venue_exec: sell_fill.executable_price,
        },
        spread: breakdown,
        liquidity: LiquiditySnapshot { exit_usd: exit_depth.total_usd, entry_usd: entry_depth.total_usd },
        timing,
        position_size_usd: suggested,
        suggested_position_usd: suggested,
        lagging_info,
    };

    let validator = SafetyValidator::new(&pipeline.settings, &pipeline.spread_age, &pipeline.depth_history);
    let verdict = validator.evaluate(&proto);

    let venues = [proto.low_venue.0.as_str(), proto.high_venue.0.as_str()];
    if pipeline.blacklist.is_signal_blocked(&symbol, &venues, &Default::default()) {
        return;
    }

    if !pipeline.cooldown.can_alert(&symbol, &pair_id) {
        return;
    }

    let Some(signal) = signal_builder::build(proto, verdict) else { return };

    let ttl = Duration::from_secs(pipeline.settings.alert_cooldown_seconds);
    if !pipeline.cooldown.process_alert(&symbol, &pair_id, ttl) {
        return;
    }

    if let Err(e) = pipeline.store.insert_signal(&signal) {
        error!(error = %e, signal_id = %signal.id, "failed to persist signal");
    }

    pipeline.convergence.start(signal.id, signal.spread.net_pct, Utc::now());
    if let Some(record) = pipeline.convergence.get(signal.id) {
        if let Err(e) =
            pipeline.store.upsert_convergence(&record, &signal.symbol, &signal.pair_id, &signal.low_venue, &signal.high_venue)
        {
            error!(error = %e, signal_id = %signal.id, "failed to persist convergence record");
        }
    }

    let message = OutboundMessage {
        text: format!("{} {} -> {}: net {:.2}%", signal.symbol, signal.low_venue, signal.high_venue, signal.spread.net_pct),
        reply_markup: None,
    };
    if pipeline.channel.send(message).await.is_none() {
        warn!(signal_id = %signal.id, "messaging channel send failed, will not retry until next cooldown window");
    }
}

/// Minutes-scale convergence tracking: re-reads the two venues for every
/// open signal and updates its running aggregates.
async fn convergence_loop(pipeline: Arc<Pipeline>) {
    let mut tick = interval(Duration::from_secs(180));
    loop {
        tick.tick().await;
        if pipeline.should_stop() {
            return;
        }
        if let Err(e) = run_convergence_tick(&pipeline).await {
            error!(error = %e, "convergence tick failed, backing off");
            tokio::time::sleep(ERROR_BACKOFF).await;
        }
    }
}

async fn run_convergence_tick(pipeline: &Pipeline) -> anyhow::Result<()> {
    let open_rows = pipeline.store.open_convergence_rows()?;
    let now = Utc::now();

    for row in open_rows {
        let Some(low_quote) = pipeline.fetcher.get_quote(&row.low_venue, &row.symbol) else { continue };
        let Some(high_quote) = pipeline.fetcher.get_quote(&row.high_venue, &row.symbol) else { continue };

        let low_depth_usd = pipeline
            .fetcher
            .get_book(&row.low_venue, &row.symbol)
            .map(|b| depth::depth_within_slippage(Side::Buy, &b.asks, pipeline.settings.max_slippage_pct).total_usd)
            .unwrap_or(Decimal::ZERO);
        let high_depth_usd = pipeline
            .fetcher
            .get_book(&row.high_venue, &row.symbol)
            .map(|b| depth::depth_within_slippage(Side::Sell, &b.bids, pipeline.settings.max_slippage_pct).total_usd)
            .unwrap_or(Decimal::ZERO);

        let low_mid = low_quote.mid_price();
        let current_spread_pct = if low_mid == Decimal::ZERO {
            Decimal::ZERO
        } else {
            (high_quote.mid_price() - low_mid) / low_mid * Decimal::from(100)
        };

        let Some((record, snapshot)) = pipeline.convergence.tick(
            &pipeline.settings,
            row.signal_id,
            now,
            low_quote.bid,
            low_quote.ask,
            high_quote.bid,
            high_quote.ask,
            current_spread_pct,
            low_depth_usd,
            high_depth_usd,
        ) else {
            continue;
        };

        if let Err(e) = pipeline.store.upsert_convergence(&record, &row.symbol, &row.pair_id, &row.low_venue, &row.high_venue) {
            error!(error = %e, signal_id = %row.signal_id, "failed to persist convergence update");
        }
        if let Err(e) = pipeline.store.insert_snapshot(&snapshot) {
            error!(error = %e, signal_id = %row.signal_id, "failed to persist convergence snapshot");
        }
    }
    Ok(())
}

/// Seconds-scale safety/alert emission pass: re-validates the lagging
/// cohort across all symbols with live quotes.
async fn safety_alert_loop(pipeline: Arc<Pipeline>) {
    let mut tick = interval(Duration::from_secs(10));
    loop {
        tick.tick().await;
        if pipeline.should_stop() {
            return;
        }
        if let Err(e) = run_lagging_pass(&pipeline).await {
            error!(error = %e, "lagging-detector pass failed, backing off");
            tokio::time::sleep(ERROR_BACKOFF).await;
        }
    }
}

/// The counterparty for a confirmed lagging venue is whichever other venue
/// in the cohort sits closest to the cohort's own median — the cleanest
/// reference price to pair the laggard against (spec.md §4.7).
fn pick_counterparty(prices: &[(VenueId, Decimal)], lagging_venue: &VenueId) -> Option<(VenueId, Decimal)> {
    let others: Vec<(VenueId, Decimal)> = prices.iter().filter(|(id, _)| id != lagging_venue).cloned().collect();
    if others.is_empty() {
        return None;
    }
    let median = crate::lagging::median_of(others.iter().map(|(_, p)| *p).collect());
    others.into_iter().min_by_key(|(_, p)| (*p - median).abs())
}

async fn run_lagging_pass(pipeline: &Pipeline) -> anyhow::Result<()> {
    for ticker in pipeline.tickers.all_valid() {
        let prices: Vec<_> = ticker
            .venues
            .iter()
            .filter_map(|v| pipeline.fetcher.get_quote(&v.venue_id, &ticker.symbol).map(|q| (v.venue_id.clone(), q.mid_price())))
            .collect();

        let confirmed = pipeline.lagging.evaluate(
            &ticker.symbol,
            &prices,
            pipeline.settings.min_lag_pct,
            pipeline.settings.lagging_min_cohort,
            pipeline.settings.lagging_hysteresis_ticks,
        );

        for observation in confirmed {
            info!(
                symbol = %ticker.symbol,
                venue = %observation.venue_id,
                deviation_pct = %observation.deviation_pct,
                "confirmed lagging venue"
            );

            let Some((counterparty, _)) = pick_counterparty(&prices, &observation.venue_id) else { continue };

            let Some(lag_listing) = ticker.venues.iter().find(|v| v.venue_id == observation.venue_id) else { continue };
            let Some(counter_listing) = ticker.venues.iter().find(|v| v.venue_id == counterparty) else { continue };

            let Some(lag_book) = pipeline.fetcher.get_book(&observation.venue_id, &ticker.symbol) else { continue };
            let Some(counter_book) = pipeline.fetcher.get_book(&counterparty, &ticker.symbol) else { continue };
            let Some(lag_quote) = pipeline.fetcher.get_quote(&observation.venue_id, &ticker.symbol) else { continue };
            let Some(counter_quote) = pipeline.fetcher.get_quote(&counterparty, &ticker.symbol) else { continue };

            let lag_leg = Leg {
                venue: observation.venue_id.clone(),
                kind: lag_listing.kind,
                fee_pct: lag_listing.taker_fee_pct,
                book: lag_book,
                quote: lag_quote,
            };
            let counter_leg = Leg {
                venue: counterparty.clone(),
                kind: counter_listing.kind,
                fee_pct: counter_listing.taker_fee_pct,
                book: counter_book,
                quote: counter_quote,
            };
            let (buy, sell) = order_legs(lag_leg, counter_leg);

            let pair_id = PairId::new(&ticker.symbol, &buy.venue, &sell.venue);
            let lagging_info = LaggingInfo {
                lagging_venue: observation.venue_id.clone(),
                deviation_pct: observation.deviation_pct,
                other_exchanges_count: observation.other_exchanges_count,
            };

            build_and_emit(pipeline, pair_id, ticker.symbol.clone(), buy, sell, SignalType::Lagging, Some(lagging_info)).await;
        }
    }
    Ok(())
}
