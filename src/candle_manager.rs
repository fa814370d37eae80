//! Folds a tick stream into a bounded history of fixed-duration OHLC candles.
//! Buckets advance from the last observed tick's timestamp rather than
//! wall-clock-aligned boundaries, so candle duration can stretch when ticks are
//! missed — this matches the intended behavior and is not a bug to fix.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::types::{Candle, CandleRing};

const RING_CAPACITY: usize = 100;

fn timeframe_seconds(label: &str) -> i64 {
    match label {
        "1m" => 60,
        "5m" => 300,
        "15m" => 900,
        "30m" => 1800,
        "1h" => 3600,
        "4h" => 14400,
        "1d" => 86400,
        _ => 900,
    }
}

pub struct CandleManager {
    timeframe_secs: i64,
    finalized: CandleRing,
    current: Option<Candle>,
    bucket_start: Option<DateTime<Utc>>,
}

impl CandleManager {
    pub fn new(timeframe_label: &str) -> Self {
        Self {
            timeframe_secs: timeframe_seconds(timeframe_label),
            finalized: CandleRing::new(RING_CAPACITY),
            current: None,
            bucket_start: None,
        }
    }

    /// Returns `true` iff this tick finalized a candle (i.e. rolled the bucket over).
    pub fn update(&mut self, price: Decimal, now: DateTime<Utc>) -> bool {
        match self.bucket_start {
            None => {
                self.bucket_start = Some(now);
                self.current = Some(Candle::flat(price, now));
                false
            }
            Some(start) => {
                let elapsed = (now - start).num_seconds();
                if elapsed < self.timeframe_secs {
                    if let Some(candle) = self.current.as_mut() {
                        candle.fold_tick(price);
                    }
                    false
                } else {
                    if let Some(candle) = self.current.take() {
                        self.finalized.push(candle);
                    }
                    self.bucket_start = Some(now);
                    self.current = Some(Candle::flat(price, now));
                    true
                }
            }
        }
    }

    pub fn is_candle_ready(&self) -> bool {
        !self.finalized.is_empty()
    }

    pub fn get_completed(&self, n: usize) -> &[Candle] {
        self.finalized.last_n(n)
    }

    pub fn current_candle(&self) -> Option<&Candle> {
        self.current.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn ts(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    #[test]
    fn identical_ticks_fold_into_a_flat_candle() {
        let mut mgr = CandleManager::new("1m");
        mgr.update(dec!(100), ts(0));
        mgr.update(dec!(100), ts(10));
        mgr.update(dec!(100), ts(20));
        let current = mgr.current_candle().unwrap();
        assert_eq!(current.open, dec!(100));
        assert_eq!(current.high, dec!(100));
        assert_eq!(current.low, dec!(100));
        assert_eq!(current.close, dec!(100));
        assert!(!mgr.is_candle_ready());
    }

    #[test]
    fn rollover_finalizes_the_bucket_and_starts_a_new_one() {
        let mut mgr = CandleManager::new("1m");
        mgr.update(dec!(100), ts(0));
        mgr.update(dec!(105), ts(30));
        let rolled = mgr.update(dec!(102), ts(61));
        assert!(rolled);
        assert!(mgr.is_candle_ready());
        let completed = mgr.get_completed(1);
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].high, dec!(105));
        assert_eq!(completed[0].close, dec!(105));
    }

    #[test]
    fn unknown_timeframe_label_defaults_to_fifteen_minutes() {
        let mgr = CandleManager::new("weird");
        assert_eq!(mgr.timeframe_secs, 900);
    }
}
