//! Wraps `indicators::atr` over the candle history, adding the price-relative
//! ATR% and the volatility-adjusted entry multiplier used by the strategy.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::indicators;
use crate::types::Candle;

pub struct ATRCalculator {
    period: usize,
    atr: Option<Decimal>,
    atr_pct: Option<Decimal>,
}

impl ATRCalculator {
    pub fn new(period: usize) -> Self {
        Self {
            period,
            atr: None,
            atr_pct: None,
        }
    }

    /// Re-derive atr/atr_pct from the given candle window (the last `period + 1`
    /// finalized candles plus a synthetic live candle at the current price).
    pub fn recompute(&mut self, candles: &[Candle], price: Decimal) {
        self.atr = indicators::atr(candles, self.period);
        self.atr_pct = self.atr.map(|atr| {
            if price.is_zero() {
                Decimal::ZERO
            } else {
                atr / price * Decimal::from(100)
            }
        });
    }

    pub fn is_ready(&self) -> bool {
        self.atr.is_some()
    }

    pub fn atr(&self) -> Option<Decimal> {
        self.atr
    }

    pub fn atr_pct(&self) -> Option<Decimal> {
        self.atr_pct
    }

    pub fn trigger(&self, multiplier: Decimal) -> Option<Decimal> {
        self.atr.map(|atr| atr * multiplier)
    }

    pub fn adjust_multiplier(&self, base: Decimal) -> Decimal {
        match self.atr_pct {
            Some(pct) if pct > dec!(3.0) => base * dec!(1.8),
            Some(pct) if pct > dec!(2.0) => base * dec!(1.3),
            Some(pct) if pct < dec!(1.0) => base * dec!(0.75),
            _ => base,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};

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

    fn ready_candles() -> Vec<Candle> {
        vec![
            candle(100, 101, 99, 100, 0),
            candle(100, 102, 100, 101, 60),
            candle(101, 103, 101, 102, 120),
            candle(102, 104, 102, 103, 180),
        ]
    }

    #[test]
    fn not_ready_until_recompute_has_enough_candles() {
        let calc = ATRCalculator::new(3);
        assert!(!calc.is_ready());
    }

    #[test]
    fn recompute_populates_atr_and_atr_pct() {
        let mut calc = ATRCalculator::new(3);
        calc.recompute(&ready_candles(), Decimal::from(100));
        assert!(calc.is_ready());
        assert_eq!(calc.atr(), Some(Decimal::from(2)));
        assert_eq!(calc.atr_pct(), Some(Decimal::from(2)));
    }

    #[test]
    fn adjust_multiplier_tiers_by_atr_pct() {
        let mut calc = ATRCalculator::new(3);
        calc.recompute(&ready_candles(), Decimal::from(50)); // atr_pct = 4.0 -> high vol tier
        assert_eq!(calc.adjust_multiplier(dec!(1.0)), dec!(1.8));

        calc.recompute(&ready_candles(), Decimal::from(1000)); // atr_pct = 0.2 -> low vol tier
        assert_eq!(calc.adjust_multiplier(dec!(1.0)), dec!(0.75));
    }

    #[test]
    fn trigger_scales_atr_by_multiplier() {
        let mut calc = ATRCalculator::new(3);
        calc.recompute(&ready_candles(), Decimal::from(100));
        assert_eq!(calc.trigger(dec!(1.5)), Some(dec!(3)));
    }
}
