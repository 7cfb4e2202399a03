//! Signal Builder (spec.md §4.8)
//! Mission: Combine a proto-signal with its safety verdict into the immutable record that
//! flows to storage and the messaging channel — or discard it, but keep the diagnostics.

use chrono::Utc;
use uuid::Uuid;

use crate::models::{ProtoSignal, SafetyVerdict, SignalStatus, StrategyType, ValidatedSignal};

/// Signals with `passed = false` are never returned — their construction
/// upstream is still useful for logging/diagnostics, but only a passing
/// verdict produces something worth alerting on.
pub fn build(proto: ProtoSignal, verdict: SafetyVerdict) -> Option<ValidatedSignal> {
    if !verdict.passed {
        return None;
    }

    let strategy_type = StrategyType::from_kinds(proto.low_kind, proto.high_kind);
    let actions = render_actions(&proto, strategy_type);
    let links = render_links(&proto);

    Some(ValidatedSignal {
        id: Uuid::new_v4(),
        pair_id: proto.pair_id,
        symbol: proto.symbol,
        signal_type: proto.signal_type,
        strategy_type,
        low_venue: proto.low_venue,
        high_venue: proto.high_venue,
        prices: proto.prices,
        spread: proto.spread,
        liquidity: proto.liquidity,
        timing: proto.timing,
        position_size_usd: proto.position_size_usd,
        suggested_position_usd: proto.suggested_position_usd,
        safety_checks: verdict,
        lagging_info: proto.lagging_info,
        actions,
        links,
        created_at: Utc::now(),
        status: SignalStatus::Sent,
    })
}

fn render_actions(proto: &ProtoSignal, strategy_type: StrategyType) -> Vec<String> {
    vec![
        format!(
            "Buy {} on {} at ~{} (executable ~{})",
            proto.symbol, proto.low_venue, proto.prices.low_venue_ask, proto.prices.low_venue_exec
        ),
        format!(
            "Sell/short {} on {} at ~{} (executable ~{})",
            proto.symbol, proto.high_venue, proto.prices.high_venue_bid, proto.prices.high_venue_exec
        ),
        format!(
            "Size the trade at ~${} (suggested ${}), strategy {}",
            proto.position_size_usd,
            proto.suggested_position_usd,
            strategy_type.as_str()
        ),
        "Monitor convergence and close both legs together once the spread collapses".to_string(),
    ]
}

fn render_links(proto: &ProtoSignal) -> Vec<String> {
    vec![
        format!("https://venue.example/{}/{}", proto.low_venue, proto.symbol),
        format!("https://venue.example/{}/{}", proto.high_venue, proto.symbol),
        format!("https://chart.example/{}", proto.symbol),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        LiquiditySnapshot, PairId, PriceSnapshot, SignalType, SpreadBreakdown, TimingSnapshot, VenueKind,
    };
    use rust_decimal_macros::dec;

    fn proto(passes: bool) -> ProtoSignal {
        ProtoSignal {
            pair_id: PairId::new("BTC", &"low".into(), &"high".into()),
            symbol: "BTC".to_string(),
            signal_type: SignalType::Auto,
            low_venue: "low".into(),
            high_venue: "high".into(),
            low_kind: VenueKind::DexSpot,
            high_kind: VenueKind::CexFutures,
            prices: PriceSnapshot {
                low_venue_bid: dec!(49990),
                low_venue_ask: dec!(50000),
                high_venue_bid: dec!(52500),
                high_venue_ask: dec!(52510),
                low_venue_exec: dec!(50100),
                high_venue_exec: dec!(52400),
            },
            spread: SpreadBreakdown {
                nominal_pct: dec!(5.0),
                real_pct: if passes { dec!(4.8) } else { dec!(0.1) },
                slippage_loss_pct: dec!(0.2),
                fees_pct: dec!(0.36),
                net_pct: dec!(4.44),
            },
            liquidity: LiquiditySnapshot { exit_usd: dec!(100000), entry_usd: dec!(50000) },
            timing: TimingSnapshot {
                low_venue_latency_ms: 50,
                high_venue_latency_ms: 60,
                latency_diff_ms: 10,
                max_latency_ms: 60,
                fresh: true,
            },
            position_size_usd: dec!(25000),
            suggested_position_usd: dec!(25000),
            lagging_info: None,
        }
    }

    #[test]
    fn failed_verdict_yields_no_signal() {
        let verdict = SafetyVerdict { passed: false, results: vec![] };
        assert!(build(proto(false), verdict).is_none());
    }

    #[test]
    fn passed_verdict_builds_signal_with_strategy_type() {
        let verdict = SafetyVerdict { passed: true, results: vec![] };
        let signal = build(proto(true), verdict).unwrap();
        assert_eq!(signal.strategy_type.as_str(), "DF");
        assert_eq!(signal.status, SignalStatus::Sent);
        assert_eq!(signal.actions.len(), 4);
        assert_eq!(signal.links.len(), 3);
    }
}
