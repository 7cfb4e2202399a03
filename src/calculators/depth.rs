//! Depth Calculator (spec.md §4.4)
//! Mission: USD available on one side of a book before price moves past a slippage bound —
//! this is "exit liquidity" when walked on the high venue's bid side.

use rust_decimal::Decimal;

use crate::models::{BookLevel, DepthResult, Side};

/// Walks `levels` accumulating USD until cumulative price move from the
/// best price exceeds `max_slippage_pct`. Returns the USD total within that
/// envelope, the weighted average price paid, and how many levels were
/// consumed.
pub fn depth_within_slippage(side: Side, levels: &[BookLevel], max_slippage_pct: Decimal) -> DepthResult {
    let best_price = match levels.first() {
        Some(l) => l.price,
        None => {
            return DepthResult {
                side,
                total_base: Decimal::ZERO,
                total_usd: Decimal::ZERO,
                weighted_avg_price: Decimal::ZERO,
                levels_consumed: 0,
                slippage_pct_at_end: Decimal::ZERO,
            };
        }
    };

    let mut total_base = Decimal::ZERO;
    let mut total_usd = Decimal::ZERO;
    let mut levels_consumed = 0usize;
    let mut last_price = best_price;

    for level in levels {
        let move_pct = ((level.price - best_price) / best_price * Decimal::from(100)).abs();
        if move_pct > max_slippage_pct {
            break;
        }
        total_base += level.size;
        total_usd += level.price * level.size;
        last_price = level.price;
        levels_consumed += 1;
    }

    let weighted_avg_price = if total_base > Decimal::ZERO {
        total_usd / total_base
    } else {
        best_price
    };

    let slippage_pct_at_end = ((last_price - best_price) / best_price * Decimal::from(100)).abs();

    DepthResult {
        side,
        total_base,
        total_usd,
        weighted_avg_price,
        levels_consumed,
        slippage_pct_at_end,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn bids() -> Vec<BookLevel> {
        vec![
            BookLevel { price: dec!(100), size: dec!(10) },
            BookLevel { price: dec!(99), size: dec!(10) },
            BookLevel { price: dec!(90), size: dec!(1000) },
        ]
    }

    #[test]
    fn stops_at_slippage_bound() {
        let depth = depth_within_slippage(Side::Sell, &bids(), dec!(2));
        // 90 is 10% below 100, past the 2% bound, so only the first two
        // levels (0% and 1%) should be consumed.
        assert_eq!(depth.levels_consumed, 2);
        assert_eq!(depth.total_base, dec!(20));
    }

    #[test]
    fn empty_book_has_zero_depth() {
        let depth = depth_within_slippage(Side::Sell, &[], dec!(2));
        assert_eq!(depth.total_usd, dec!(0));
        assert_eq!(depth.levels_consumed, 0);
    }

    /// Slippage monotonicity (spec.md §8): depth_usd is non-decreasing in
    /// the slippage bound.
    #[test]
    fn depth_is_monotonic_in_slippage_bound() {
        let tight = depth_within_slippage(Side::Sell, &bids(), dec!(0.5));
        let loose = depth_within_slippage(Side::Sell, &bids(), dec!(15));
        assert!(tight.total_usd <= loose.total_usd);
    }
}
