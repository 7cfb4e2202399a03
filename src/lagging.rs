//! Lagging-Venue Detector (spec.md §4.7)
//! Mission: Tell a venue that's genuinely mispriced from one that's merely noisy by requiring
//! the deviation to survive several ticks in a row before calling it lagging.

use dashmap::DashMap;
use rust_decimal::Decimal;

use crate::models::VenueId;

#[derive(Debug, Clone)]
pub struct LagObservation {
    pub venue_id: VenueId,
    pub deviation_pct: Decimal,
    pub other_exchanges_count: usize,
}

struct Streak {
    consecutive_ticks: u32,
}

/// Tracks, per symbol+venue, how many consecutive ticks a venue's mid-price
/// has deviated from the cohort median by at least `min_lag_pct`. Resets to
/// zero the moment a tick comes back in line.
#[derive(Default)]
pub struct LaggingVenueDetector {
    streaks: DashMap<(String, VenueId), Streak>,
}

impl LaggingVenueDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// `prices` is one (venue_id, mid_price) pair per venue currently
    /// quoting `symbol`. Returns the venues confirmed lagging this tick
    /// (hysteresis satisfied), using the cohort median as the reference.
    /// Cohorts smaller than `min_cohort` are skipped — there aren't enough
    /// independent prices to call one of them an outlier.
    pub fn evaluate(
        &self,
        symbol: &str,
        prices: &[(VenueId, Decimal)],
        min_lag_pct: Decimal,
        min_cohort: usize,
        hysteresis_ticks: u32,
    ) -> Vec<LagObservation> {
        if prices.len() < min_cohort {
            return Vec::new();
        }

        let median = median_of(prices.iter().map(|(_, p)| *p).collect());
        let mut confirmed = Vec::new();

        for (venue_id, price) in prices {
            let deviation_pct = if median == Decimal::ZERO {
                Decimal::ZERO
            } else {
                ((*price - median) / median * Decimal::from(100)).abs()
            };

            let key = (symbol.to_string(), venue_id.clone());
            if deviation_pct >= min_lag_pct {
                let consecutive = {
                    let mut entry = self.streaks.entry(key).or_insert(Streak { consecutive_ticks: 0 });
                    entry.consecutive_ticks += 1;
                    entry.consecutive_ticks
                };
                if consecutive >= hysteresis_ticks {
                    confirmed.push(LagObservation {
                        venue_id: venue_id.clone(),
                        deviation_pct,
                        other_exchanges_count: prices.len() - 1,
                    });
                }
            } else {
                self.streaks.remove(&key);
            }
        }

        confirmed
    }
}

pub(crate) fn median_of(mut values: Vec<Decimal>) -> Decimal {
    values.sort();
    let len = values.len();
    if len == 0 {
        return Decimal::ZERO;
    }
    if len % 2 == 1 {
        values[len / 2]
    } else {
        (values[len / 2 - 1] + values[len / 2]) / Decimal::from(2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn cohort(deviant_price: Decimal) -> Vec<(VenueId, Decimal)> {
        vec![
            ("a".into(), dec!(100)),
            ("b".into(), dec!(100)),
            ("c".into(), dec!(100)),
            ("d".into(), deviant_price),
        ]
    }

    #[test]
    fn cohort_below_minimum_size_is_skipped() {
        let detector = LaggingVenueDetector::new();
        let prices = vec![("a".into(), dec!(100)), ("b".into(), dec!(120))];
        let out = detector.evaluate("BTC", &prices, dec!(3.0), 4, 1);
        assert!(out.is_empty());
    }

    #[test]
    fn single_tick_deviation_does_not_confirm_without_hysteresis() {
        let detector = LaggingVenueDetector::new();
        let prices = cohort(dec!(110));
        let out = detector.evaluate("BTC", &prices, dec!(3.0), 4, 3);
        assert!(out.is_empty());
    }

    #[test]
    fn sustained_deviation_confirms_after_k_ticks() {
        let detector = LaggingVenueDetector::new();
        let prices = cohort(dec!(110));
        detector.evaluate("BTC", &prices, dec!(3.0), 4, 3);
        detector.evaluate("BTC", &prices, dec!(3.0), 4, 3);
        let out = detector.evaluate("BTC", &prices, dec!(3.0), 4, 3);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].venue_id, VenueId::from("d"));
    }

    #[test]
    fn returning_to_median_resets_streak() {
        let detector = LaggingVenueDetector::new();
        let deviant = cohort(dec!(110));
        let back_in_line = cohort(dec!(100));
        detector.evaluate("BTC", &deviant, dec!(3.0), 4, 3);
        detector.evaluate("BTC", &back_in_line, dec!(3.0), 4, 3);
        let out = detector.evaluate("BTC", &deviant, dec!(3.0), 4, 3);
        assert!(out.is_empty());
    }
}
