//! Spread Calculator (spec.md §4.4)
//! Mission: Turn two order books into the nominal/real/net spread triple a safety check can
//! reason about.

use rust_decimal::Decimal;

use crate::calculators::executable_price::executable_price;
use crate::models::{OrderBook, Side, SpreadBreakdown};

/// `nominal_pct = (sell_best - buy_best) / buy_best * 100`,
/// `real_pct` at `target_usd`, `slippage_loss_pct = nominal_pct - real_pct`,
/// `fees_pct` = sum of both legs' taker fees, `net_pct = real_pct - fees_pct`.
pub fn compute_spread(
    low_book: &OrderBook,
    high_book: &OrderBook,
    target_usd: Decimal,
    low_taker_fee_pct: Decimal,
    high_taker_fee_pct: Decimal,
) -> Option<SpreadBreakdown> {
    let buy_best = low_book.best_ask()?.price;
    let sell_best = high_book.best_bid()?.price;

    let nominal_pct = (sell_best - buy_best) / buy_best * Decimal::from(100);

    let buy_fill = executable_price(Side::Buy, &low_book.asks, target_usd);
    let sell_fill = executable_price(Side::Sell, &high_book.bids, target_usd);

    let real_pct = (sell_fill.executable_price - buy_fill.executable_price) / buy_fill.executable_price
        * Decimal::from(100);

    let slippage_loss_pct = nominal_pct - real_pct;
    let fees_pct = low_taker_fee_pct + high_taker_fee_pct;
    let net_pct = real_pct - fees_pct;

    Some(SpreadBreakdown {
        nominal_pct,
        real_pct,
        slippage_loss_pct,
        fees_pct,
        net_pct,
    })
}

/// A candidate is emittable only if `net_pct >= min_spread_pct` and
/// `real_pct <= max_spread_pct` (the upper bound guards against bogus
/// prices from e.g. delisted tokens).
pub fn is_emittable(spread: &SpreadBreakdown, min_spread_pct: Decimal, max_spread_pct: Decimal) -> bool {
    spread.net_pct >= min_spread_pct && spread.real_pct <= max_spread_pct
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BookLevel, BookTiming};
    use rust_decimal_macros::dec;

    fn book(venue: &str, symbol: &str, bids: Vec<(Decimal, Decimal)>, asks: Vec<(Decimal, Decimal)>) -> OrderBook {
        OrderBook {
            venue_id: venue.into(),
            symbol: symbol.to_string(),
            bids: bids.into_iter().map(|(price, size)| BookLevel { price, size }).collect(),
            asks: asks.into_iter().map(|(price, size)| BookLevel { price, size }).collect(),
            timing: BookTiming { request_at_ms: 0, response_at_ms: 5, latency_ms: 5 },
        }
    }

    /// End-to-end scenario 1 (spec.md §8): jupiter ask 50,000 / 50k depth,
    /// binance_futures bid 52,500 / 100k depth, 0.18% fees per leg.
    #[test]
    fn clean_spread_matches_worked_example() {
        let low = book("jupiter", "BTC", vec![], vec![(dec!(50000), dec!(1))]);
        let high = book("binance_futures", "BTC", vec![(dec!(52500), dec!(2))], vec![]);

        let spread = compute_spread(&low, &high, dec!(25000), dec!(0.18), dec!(0.18)).unwrap();

        assert!((spread.real_pct - dec!(5.0)).abs() < dec!(0.01));
        assert!((spread.net_pct - dec!(4.64)).abs() < dec!(0.01));
        assert!(is_emittable(&spread, dec!(3.0), dec!(250.0)));
    }

    /// Spread identity (spec.md §8): nominal matches the best-price formula
    /// and net_pct <= real_pct <= nominal_pct whenever fees/slippage are
    /// non-negative.
    #[test]
    fn spread_identity_holds() {
        let low = book("low", "BTC", vec![], vec![(dec!(100), dec!(5)), (dec!(101), dec!(5))]);
        let high = book("high", "BTC", vec![(dec!(110), dec!(5)), (dec!(109), dec!(5))], vec![]);

        let spread = compute_spread(&low, &high, dec!(300), dec!(0.1), dec!(0.1)).unwrap();

        let expected_nominal = (dec!(110) - dec!(100)) / dec!(100) * dec!(100);
        assert_eq!(spread.nominal_pct, expected_nominal);
        assert!(spread.net_pct <= spread.real_pct);
        assert!(spread.real_pct <= spread.nominal_pct);
    }

    #[test]
    fn missing_side_yields_no_spread() {
        let low = book("low", "BTC", vec![], vec![]);
        let high = book("high", "BTC", vec![(dec!(110), dec!(5))], vec![]);
        assert!(compute_spread(&low, &high, dec!(100), dec!(0.1), dec!(0.1)).is_none());
    }
}
