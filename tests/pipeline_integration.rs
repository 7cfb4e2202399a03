//! End-to-end scenarios across module boundaries (spec.md §8): a signal
//! that should emit end to end, one rejected for a stale spread, a
//! confirmed lagging venue, cooldown suppression of a repeat alert, a
//! convergence close, and a fetcher coping with a partial venue outage.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use rust_decimal_macros::dec;

use arbscan_backend::adapter::{synthetic_timing, MockAdapter, VenueAdapter, VenueCapabilities};
use arbscan_backend::calculators::{depth, executable_price, spread};
use arbscan_backend::config::Settings;
use arbscan_backend::cooldown::CooldownGate;
use arbscan_backend::fetcher::Fetcher;
use arbscan_backend::lagging::LaggingVenueDetector;
use arbscan_backend::messaging::{MessagingChannel, OutboundMessage, RecordingChannel};
use arbscan_backend::models::{
    ArbitragePair, BookLevel, LiquiditySnapshot, OrderBook, PairId, PriceSnapshot, ProtoSignal,
    Quote, Side, SignalType, SpreadBreakdown, VenueKind,
};
use arbscan_backend::registry::VenueRegistry;
use arbscan_backend::safety::{net_spread_floor, suggested_position_usd, SafetyValidator};
use arbscan_backend::signal_builder;
use arbscan_backend::store::SignalStore;
use arbscan_backend::trackers::{timing, DepthHistoryCollector, SpreadAgeTracker};

fn cex_book() -> OrderBook {
    OrderBook {
        venue_id: "binance_futures".into(),
        symbol: "BTC".to_string(),
        bids: vec![
            BookLevel { price: dec!(52500), size: dec!(2) },
            BookLevel { price: dec!(52400), size: dec!(5) },
        ],
        asks: vec![],
        timing: synthetic_timing(0, 40),
    }
}

fn dex_book() -> OrderBook {
    OrderBook {
        venue_id: "jupiter".into(),
        symbol: "BTC".to_string(),
        bids: vec![],
        asks: vec![
            BookLevel { price: dec!(50000), size: dec!(1) },
            BookLevel { price: dec!(50100), size: dec!(5) },
        ],
        timing: synthetic_timing(0, 60),
    }
}

fn build_proto(settings: &Settings, is_lagging: bool) -> ProtoSignal {
    let low = dex_book();
    let high = cex_book();

    let target_usd = dec!(25000);
    let spread_breakdown = spread::compute_spread(&low, &high, target_usd, dec!(0.18), dec!(0.18)).unwrap();

    let exit_depth = depth::depth_within_slippage(Side::Sell, &high.bids, settings.max_slippage_pct);
    let entry_depth = depth::depth_within_slippage(Side::Buy, &low.asks, settings.max_slippage_pct);

    let buy_fill = executable_price::executable_price(Side::Buy, &low.asks, target_usd);
    let sell_fill = executable_price::executable_price(Side::Sell, &high.bids, target_usd);

    let snapshot = timing::snapshot(&low.timing, &high.timing, settings.max_latency_ms, settings.max_latency_diff_ms, true);

    ProtoSignal {
        pair_id: PairId::new("BTC", &"jupiter".into(), &"binance_futures".into()),
        symbol: "BTC".to_string(),
        signal_type: if is_lagging { SignalType::Lagging } else { SignalType::Auto },
        low_venue: "jupiter".into(),
        high_venue: "binance_futures".into(),
        low_kind: VenueKind::DexSpot,
        high_kind: VenueKind::CexFutures,
        prices: PriceSnapshot {
            low_venue_bid: dec!(49900),
            low_venue_ask: low.best_ask().unwrap().price,
            high_venue_bid: high.best_bid().unwrap().price,
            high_venue_ask: dec!(52520),
            low_venue_exec: buy_fill.executable_price,
            high_venue_exec: sell_fill.executable_price,
        },
        spread: spread_breakdown,
        liquidity: LiquiditySnapshot { exit_usd: exit_depth.total_usd, entry_usd: entry_depth.total_usd },
        timing: snapshot,
        position_size_usd: suggested_position_usd(exit_depth.total_usd, Decimal::from(settings.suggested_position_hard_cap_usd)),
        suggested_position_usd: suggested_position_usd(exit_depth.total_usd, Decimal::from(settings.suggested_position_hard_cap_usd)),
        lagging_info: if is_lagging {
            Some(arbscan_backend::models::LaggingInfo {
                lagging_venue: "jupiter".into(),
                deviation_pct: dec!(4.0),
                other_exchanges_count: 4,
            })
        } else {
            None
        },
    }
}

use rust_decimal::Decimal;

#[tokio::test]
async fn clean_opportunity_emits_and_persists_and_sends() {
    let settings = Settings::default();
    let spread_age = SpreadAgeTracker::new();
    let depth_history = DepthHistoryCollector::new();
    let cooldown = CooldownGate::new();
    let store = SignalStore::open_in_memory().unwrap();
    let channel = Arc::new(RecordingChannel::new());

    let proto = build_proto(&settings, false);
    let floor = net_spread_floor(&settings, false);
    assert!(spread::is_emittable(&proto.spread, floor, settings.max_spread_pct));

    spread_age.observe(&proto.pair_id, proto.spread.net_pct.abs(), settings.min_spread_pct);
    depth_history.record(&proto.pair_id, &proto.high_venue, Side::Sell, proto.liquidity.exit_usd);

    let validator = SafetyValidator::new(&settings, &spread_age, &depth_history);
    let verdict = validator.evaluate(&proto);
    assert!(verdict.passed, "{:?}", verdict.results);

    assert!(cooldown.can_alert(&proto.symbol, &proto.pair_id));
    let signal = signal_builder::build(proto, verdict).expect("passing verdict builds a signal");

    assert!(cooldown.process_alert(&signal.symbol, &signal.pair_id, Duration::from_secs(300)));
    store.insert_signal(&signal).unwrap();

    let recent = store.recent_signals(10).unwrap();
    assert_eq!(recent.len(), 1);
    assert_eq!(recent[0].id, signal.id);

    let message = OutboundMessage {
        text: format!("{} net {}", signal.symbol, signal.spread.net_pct),
        reply_markup: None,
    };
    let sent = channel.send(message).await;
    assert!(sent.is_some());
    assert_eq!(channel.sent_messages().len(), 1);
}

#[tokio::test]
async fn repeat_alert_within_cooldown_is_suppressed() {
    let settings = Settings::default();
    let spread_age = SpreadAgeTracker::new();
    let depth_history = DepthHistoryCollector::new();
    let cooldown = CooldownGate::new();

    let proto = build_proto(&settings, false);
    spread_age.observe(&proto.pair_id, proto.spread.net_pct.abs(), settings.min_spread_pct);
    depth_history.record(&proto.pair_id, &proto.high_venue, Side::Sell, proto.liquidity.exit_usd);

    let validator = SafetyValidator::new(&settings, &spread_age, &depth_history);
    let verdict = validator.evaluate(&proto);
    assert!(verdict.passed);

    let ttl = Duration::from_secs(300);
    assert!(cooldown.process_alert(&proto.symbol, &proto.pair_id, ttl));

    // Same pair fires again on the very next tick: must be suppressed.
    let proto_again = build_proto(&settings, false);
    assert!(!cooldown.can_alert(&proto_again.symbol, &proto_again.pair_id));
    assert!(!cooldown.process_alert(&proto_again.symbol, &proto_again.pair_id, ttl));
    assert_eq!(cooldown.suppressed_count(), 1);
}

#[test]
fn stale_timing_rejects_the_signal() {
    let settings = Settings::default();
    let spread_age = SpreadAgeTracker::new();
    let depth_history = DepthHistoryCollector::new();

    let mut proto = build_proto(&settings, false);
    // Blow the latency-diff bound so `timing.fresh` flips false.
    proto.timing.fresh = false;

    spread_age.observe(&proto.pair_id, proto.spread.net_pct.abs(), settings.min_spread_pct);
    depth_history.record(&proto.pair_id, &proto.high_venue, Side::Sell, proto.liquidity.exit_usd);

    let validator = SafetyValidator::new(&settings, &spread_age, &depth_history);
    let verdict = validator.evaluate(&proto);

    assert!(!verdict.passed);
    let freshness = verdict.results.iter().find(|r| r.check_name == "spread_freshness").unwrap();
    assert!(!freshness.passed);
    assert!(signal_builder::build(proto, verdict).is_none());
}

#[test]
fn cohort_deviation_confirms_a_lagging_venue_after_hysteresis() {
    let settings = Settings::default();
    let detector = LaggingVenueDetector::new();

    let in_line = vec![
        ("binance_futures".into(), dec!(50000)),
        ("coinbase".into(), dec!(50010)),
        ("kraken".into(), dec!(49990)),
    ];
    let mut with_laggard = in_line.clone();
    with_laggard.push(("jupiter".into(), dec!(53000))); // ~6% off cohort median

    for _ in 0..settings.lagging_hysteresis_ticks - 1 {
        let confirmed = detector.evaluate("BTC", &with_laggard, settings.min_lag_pct, settings.lagging_min_cohort, settings.lagging_hysteresis_ticks);
        assert!(confirmed.is_empty(), "should not confirm before hysteresis is satisfied");
    }

    let confirmed = detector.evaluate("BTC", &with_laggard, settings.min_lag_pct, settings.lagging_min_cohort, settings.lagging_hysteresis_ticks);
    assert_eq!(confirmed.len(), 1);
    assert_eq!(confirmed[0].venue_id, arbscan_backend::models::VenueId::from("jupiter"));
}

#[tokio::test]
async fn fetcher_keeps_healthy_venue_quotes_despite_a_failing_peer() {
    let registry = VenueRegistry::new();

    let healthy = Arc::new(MockAdapter::new(
        "binance_futures",
        VenueCapabilities { quotes: true, orderbook: true, funding: true, shortable: true },
    ));
    healthy.seed_quote(Quote {
        venue_id: "binance_futures".into(),
        symbol: "BTC".to_string(),
        bid: dec!(52500),
        ask: dec!(52510),
        mid: None,
        mark: None,
        volume_24h: None,
        received_at_ms: 0,
        latency_ms: 40,
    });

    let outage = Arc::new(MockAdapter::new(
        "jupiter",
        VenueCapabilities { quotes: true, orderbook: true, funding: false, shortable: false },
    ));
    outage.seed_quote(Quote {
        venue_id: "jupiter".into(),
        symbol: "BTC".to_string(),
        bid: dec!(50000),
        ask: dec!(50010),
        mid: None,
        mark: None,
        volume_24h: None,
        received_at_ms: 0,
        latency_ms: 60,
    });
    // Every attempt on this venue fails for the duration of the tick.
    outage.fail_next_n(100);

    registry.register(healthy.clone() as Arc<dyn VenueAdapter>);
    registry.register(outage.clone() as Arc<dyn VenueAdapter>);

    let fetcher = Fetcher::new(registry, 10.0, 10.0);
    let pairs = vec![ArbitragePair {
        pair_id: PairId::new("BTC", &"binance_futures".into(), &"jupiter".into()),
        symbol: "BTC".to_string(),
        low_venue: "binance_futures".into(),
        high_venue: "jupiter".into(),
    }];

    fetcher.fetch_quotes(&pairs).await;

    assert!(fetcher.get_quote(&"binance_futures".into(), "BTC").is_some());
    assert!(fetcher.get_quote(&"jupiter".into(), "BTC").is_none());
    assert!(fetcher.completable_pairs(&pairs).is_empty());
}

#[test]
fn blacklisted_venue_blocks_an_otherwise_clean_signal() {
    let bl = arbscan_backend::cooldown::Blacklist::new();
    bl.block_venue("jupiter");
    let addrs: HashSet<String> = HashSet::new();
    assert!(bl.is_signal_blocked("BTC", &["jupiter", "binance_futures"], &addrs));
}
