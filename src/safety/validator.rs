//! Safety Validator (spec.md §4.6)
//! Mission: One fixed, non-short-circuiting battery of checks so a signal's
//! rejection reasons are always fully visible to an operator, never just the
//! first one hit.

use rust_decimal::Decimal;

use crate::config::Settings;
use crate::models::{CheckResult, ProtoSignal, SafetyVerdict};
use crate::trackers::{DepthHistoryCollector, DepthStatus, SpreadAgeTracker};

pub struct SafetyValidator<'a> {
    settings: &'a Settings,
    spread_age: &'a SpreadAgeTracker,
    depth_history: &'a DepthHistoryCollector,
}

impl<'a> SafetyValidator<'a> {
    pub fn new(settings: &'a Settings, spread_age: &'a SpreadAgeTracker, depth_history: &'a DepthHistoryCollector) -> Self {
        Self { settings, spread_age, depth_history }
    }

    /// Runs every check unconditionally and returns the combined verdict.
    /// `lagging` signals (spec.md §4.7) bypass `spread_age` and apply a
    /// higher net-spread floor via `lagging_min_net_spread_pct` in place of
    /// `min_spread_pct`.
    pub fn evaluate(&self, proto: &ProtoSignal) -> SafetyVerdict {
        let is_lagging = proto.lagging_info.is_some();

        let results = vec![
            self.check_exit_liquidity(proto),
            self.check_max_slippage(proto),
            self.check_direction_validity(proto),
            self.check_spread_freshness(proto),
            self.check_spread_age(proto, is_lagging),
            self.check_bid_ask_spread(proto),
            self.check_latency(proto),
            self.check_depth_vs_history(proto),
            self.check_position_to_exit_ratio(proto),
        ];

        let passed = results.iter().all(|r| r.passed);
        SafetyVerdict { passed, results }
    }

    fn check_exit_liquidity(&self, proto: &ProtoSignal) -> CheckResult {
        let min = Decimal::from(self.settings.min_exit_liquidity_usd);
        let passed = proto.liquidity.exit_usd >= min;
        CheckResult {
            check_name: "exit_liquidity",
            passed,
            detail: format!("exit_usd={} min={}", proto.liquidity.exit_usd, min),
        }
    }

    fn check_max_slippage(&self, proto: &ProtoSignal) -> CheckResult {
        let passed = proto.spread.slippage_loss_pct.abs() <= self.settings.max_slippage_pct;
        CheckResult {
            check_name: "max_slippage",
            passed,
            detail: format!(
                "slippage_loss_pct={} max={}",
                proto.spread.slippage_loss_pct, self.settings.max_slippage_pct
            ),
        }
    }

    fn check_direction_validity(&self, proto: &ProtoSignal) -> CheckResult {
        let passed = proto.high_kind.is_shortable();
        CheckResult {
            check_name: "direction_validity",
            passed,
            detail: format!("high_kind={:?} shortable={}", proto.high_kind, passed),
        }
    }

    fn check_spread_freshness(&self, proto: &ProtoSignal) -> CheckResult {
        let passed = proto.timing.fresh;
        CheckResult {
            check_name: "spread_freshness",
            passed,
            detail: format!("fresh={passed}"),
        }
    }

    fn check_spread_age(&self, proto: &ProtoSignal, is_lagging: bool) -> CheckResult {
        if is_lagging {
            return CheckResult {
                check_name: "spread_age",
                passed: true,
                detail: "bypassed for lagging signal".to_string(),
            };
        }
        let age_hours = self.spread_age.age_hours(&proto.pair_id);
        let passed = age_hours <= self.settings.max_spread_age_hours as f64;
        CheckResult {
            check_name: "spread_age",
            passed,
            detail: format!("age_hours={age_hours:.2} max={}", self.settings.max_spread_age_hours),
        }
    }

    /// Either venue's own quoted spread, `(ask-bid)/mid`, must stay under
    /// the bound — a proxy for "this venue's book is too thin to trust
    /// right now" (spec.md §4.6), distinct from `max_slippage` which checks
    /// the *executable* price against the quote.
    fn check_bid_ask_spread(&self, proto: &ProtoSignal) -> CheckResult {
        let low_pct = bid_ask_pct(proto.prices.low_venue_bid, proto.prices.low_venue_ask);
        let high_pct = bid_ask_pct(proto.prices.high_venue_bid, proto.prices.high_venue_ask);
        let max_observed = low_pct.max(high_pct);
        let passed = max_observed <= self.settings.max_bid_ask_spread_pct;
        CheckResult {
            check_name: "bid_ask_spread",
            passed,
            detail: format!("max_observed_pct={max_observed} max={}", self.settings.max_bid_ask_spread_pct),
        }
    }

    fn check_latency(&self, proto: &ProtoSignal) -> CheckResult {
        let passed = proto.timing.max_latency_ms <= self.settings.max_latency_ms
            && proto.timing.latency_diff_ms <= self.settings.max_latency_diff_ms;
        CheckResult {
            check_name: "latency",
            passed,
            detail: format!(
                "max_latency_ms={} latency_diff_ms={}",
                proto.timing.max_latency_ms, proto.timing.latency_diff_ms
            ),
        }
    }

    fn check_depth_vs_history(&self, proto: &ProtoSignal) -> CheckResult {
        let status = self.depth_history.depth_status(
            &proto.pair_id,
            &proto.high_venue,
            crate::models::Side::Sell,
            proto.liquidity.exit_usd,
        );
        let passed = !matches!(status, DepthStatus::Danger);
        CheckResult {
            check_name: "depth_vs_history",
            passed,
            detail: format!("status={status:?}"),
        }
    }

    fn check_position_to_exit_ratio(&self, proto: &ProtoSignal) -> CheckResult {
        if proto.liquidity.exit_usd <= Decimal::ZERO {
            return CheckResult {
                check_name: "position_to_exit_ratio",
                passed: false,
                detail: "exit_usd is zero".to_string(),
            };
        }
        let ratio = proto.suggested_position_usd / proto.liquidity.exit_usd;
        let passed = ratio <= self.settings.max_position_to_exit_ratio;
        CheckResult {
            check_name: "position_to_exit_ratio",
            passed,
            detail: format!("ratio={ratio} max={}", self.settings.max_position_to_exit_ratio),
        }
    }

}

/// The net-spread floor a proto-signal must clear before it is even built:
/// lagging signals require the higher `lagging_min_net_spread_pct` in place
/// of `min_spread_pct` (spec.md §4.7).
pub fn net_spread_floor(settings: &Settings, is_lagging: bool) -> Decimal {
    if is_lagging {
        settings.lagging_min_net_spread_pct
    } else {
        settings.min_spread_pct
    }
}

/// `suggested_position_usd = min(exit_usd * 0.5, hard_cap)`.
pub fn suggested_position_usd(exit_usd: Decimal, hard_cap: Decimal) -> Decimal {
    (exit_usd * Decimal::new(5, 1)).min(hard_cap)
}

fn bid_ask_pct(bid: Decimal, ask: Decimal) -> Decimal {
    let mid = (bid + ask) / Decimal::from(2);
    if mid == Decimal::ZERO {
        return Decimal::ZERO;
    }
    ((ask - bid) / mid * Decimal::from(100)).abs()
}
