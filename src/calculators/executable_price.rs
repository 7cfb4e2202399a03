//! Executable Price Calculator (spec.md §4.4)
//! Mission: Walk an order book side until a target USD notional is filled and report the
//! size-weighted price actually achievable, not just the best quote.

use rust_decimal::Decimal;

use crate::models::{BookLevel, ExecutableFill, Side};

/// Walks `levels` (already in the side's natural walking order — bids
/// descending, asks ascending) accumulating `(price, size)` until
/// `target_usd` is filled. Returns the partial fill with `unfilled_usd > 0`
/// and `insufficient_depth = true` if the book runs out first.
pub fn executable_price(side: Side, levels: &[BookLevel], target_usd: Decimal) -> ExecutableFill {
    let best_price = match levels.first() {
        Some(l) => l.price,
        None => {
            return ExecutableFill {
                executable_price: Decimal::ZERO,
                slippage_pct: Decimal::ZERO,
                filled_usd: Decimal::ZERO,
                unfilled_usd: target_usd,
                insufficient_depth: true,
            };
        }
    };

    let mut filled_usd = Decimal::ZERO;
    let mut filled_base = Decimal::ZERO;
    let mut levels_consumed = 0usize;

    for level in levels {
        let level_usd = level.price * level.size;
        let remaining = target_usd - filled_usd;
        if remaining <= Decimal::ZERO {
            break;
        }
        if level_usd <= remaining {
            filled_usd += level_usd;
            filled_base += level.size;
            levels_consumed += 1;
        } else {
            let partial_base = remaining / level.price;
            filled_usd += remaining;
            filled_base += partial_base;
            levels_consumed += 1;
            break;
        }
    }

    let unfilled_usd = (target_usd - filled_usd).max(Decimal::ZERO);
    let insufficient_depth = unfilled_usd > Decimal::ZERO;

    let executable_price = if filled_base > Decimal::ZERO {
        filled_usd / filled_base
    } else {
        best_price
    };

    // sign(side): buying against asks makes a worse fill read as positive
    // slippage (price went up); selling into bids makes a worse fill read
    // as positive slippage too (price went down from the seller's view).
    let sign = match side {
        Side::Buy => Decimal::ONE,
        Side::Sell => -Decimal::ONE,
    };
    let slippage_pct = (executable_price / best_price - Decimal::ONE) * Decimal::from(100) * sign;

    ExecutableFill {
        executable_price,
        slippage_pct,
        filled_usd,
        unfilled_usd,
        insufficient_depth,
    }
}
