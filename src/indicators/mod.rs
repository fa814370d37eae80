//! Pure functions over a candle window: true range, ATR, and realized profit.
//! Deliberately simple-mean, never Wilder-smoothed, to match the documented contract.

use crate::types::Candle;
use rust_decimal::Decimal;

/// `max(high - low, |high - prev.close|, |low - prev.close|)`.
pub fn true_range(candle: &Candle, prev: &Candle) -> Decimal {
    let range = candle.high - candle.low;
    let high_prev_close = (candle.high - prev.close).abs();
    let low_prev_close = (candle.low - prev.close).abs();
    range.max(high_prev_close).max(low_prev_close)
}

/// Simple arithmetic mean of the last `period` true ranges. Requires at least
/// `period + 1` candles (one extra to seed the first true range's `prev`).
pub fn atr(candles: &[Candle], period: usize) -> Option<Decimal> {
    if candles.len() < period + 1 {
        return None;
    }
    let start = candles.len() - period - 1;
    let window = &candles[start..];
    let sum: Decimal = window
        .windows(2)
        .map(|pair| true_range(&pair[1], &pair[0]))
        .sum();
    Some(sum / Decimal::from(period as u64))
}

/// Net profit for a closed long or short leg.
/// gross = (exit - entry) * qty for long, (entry - exit) * qty for short.
/// exit_fee = exit * qty * exit_fee_rate; result = gross - entry_fee - exit_fee.
pub fn profit(
    entry: Decimal,
    exit: Decimal,
    qty: Decimal,
    entry_fee: Decimal,
    exit_fee_rate: Decimal,
    is_long: bool,
) -> Decimal {
    let gross = if is_long {
        (exit - entry) * qty
    } else {
        (entry - exit) * qty
    };
    let exit_fee = exit * qty * exit_fee_rate;
    gross - entry_fee - exit_fee
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use rust_decimal_macros::dec;

    fn ts(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    fn candle(o: i64, h: i64, l: i64, c: i64, at: i64) -> Candle {
        Candle {
            open: Decimal::from(o),
            high: Decimal::from(h),
            low: Decimal::from(l),
            close: Decimal::from(c),
            volume: None,
            timestamp: ts(at),
        }
    }

    #[test]
    fn true_range_picks_the_largest_of_three_spans() {
        let prev = candle(100, 102, 98, 100, 0);
        let cur = candle(100, 105, 99, 101, 60);
        // range = 6, |high-prevclose| = 5, |low-prevclose| = 1 -> max is 6
        assert_eq!(true_range(&cur, &prev), dec!(6));
    }

    #[test]
    fn atr_undefined_below_period_plus_one_candles() {
        let candles = vec![candle(100, 101, 99, 100, 0), candle(100, 101, 99, 100, 60)];
        assert_eq!(atr(&candles, 3), None);
    }

    #[test]
    fn atr_is_simple_mean_of_last_n_true_ranges() {
        // Each step has a true range of exactly 2.0, period 3 -> atr = 2.0
        let candles = vec![
            candle(100, 101, 99, 100, 0),
            candle(100, 102, 100, 101, 60),
            candle(101, 103, 101, 102, 120),
            candle(102, 104, 102, 103, 180),
        ];
        assert_eq!(atr(&candles, 3), Some(dec!(2)));
    }

    #[test]
    fn profit_long_subtracts_both_fees_from_gross() {
        let p = profit(dec!(98), dec!(100), dec!(10), dec!(0), dec!(0), true);
        assert_eq!(p, dec!(20));
    }

    #[test]
    fn profit_short_is_mirrored() {
        let p = profit(dec!(100), dec!(98), dec!(10), dec!(0), dec!(0), false);
        assert_eq!(p, dec!(20));
    }

    #[test]
    fn profit_deducts_exit_fee_computed_on_exit_notional() {
        let p = profit(dec!(100), dec!(110), dec!(1), dec!(0), dec!(0.01), true);
        // gross = 10, exit_fee = 110 * 1 * 0.01 = 1.1
        assert_eq!(p, dec!(8.9));
    }
}
