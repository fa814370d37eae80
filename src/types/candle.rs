use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A single finalized or in-progress OHLC bar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Option<Decimal>,
    pub timestamp: DateTime<Utc>,
}

impl Candle {
    pub fn flat(price: Decimal, timestamp: DateTime<Utc>) -> Self {
        Self {
            open: price,
            high: price,
            low: price,
            close: price,
            volume: None,
            timestamp,
        }
    }

    pub fn fold_tick(&mut self, price: Decimal) {
        self.high = self.high.max(price);
        self.low = self.low.min(price);
        self.close = price;
    }

    /// `high >= max(open, close, low)` and `low <= min(open, close, high)`.
    pub fn is_consistent(&self) -> bool {
        self.high >= self.open.max(self.close).max(self.low)
            && self.low <= self.open.min(self.close).min(self.high)
    }
}

/// Bounded ring of finalized candles, oldest evicted first once `capacity` is reached.
#[derive(Debug, Clone)]
pub struct CandleRing {
    candles: Vec<Candle>,
    capacity: usize,
}

impl CandleRing {
    pub fn new(capacity: usize) -> Self {
        Self {
            candles: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, candle: Candle) {
        if self.candles.len() >= self.capacity {
            self.candles.remove(0);
        }
        self.candles.push(candle);
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    /// Last `n` finalized candles, oldest first; fewer than `n` if history is short.
    pub fn last_n(&self, n: usize) -> &[Candle] {
        let len = self.candles.len();
        let start = len.saturating_sub(n);
        &self.candles[start..]
    }

    pub fn as_slice(&self) -> &[Candle] {
        &self.candles
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
    fn flat_candle_is_consistent() {
        let c = Candle::flat(dec!(100), ts(0));
        assert!(c.is_consistent());
        assert_eq!(c.open, c.high);
        assert_eq!(c.open, c.low);
        assert_eq!(c.open, c.close);
    }

    #[test]
    fn folding_ticks_tracks_high_low_close() {
        let mut c = Candle::flat(dec!(100), ts(0));
        c.fold_tick(dec!(105));
        c.fold_tick(dec!(95));
        c.fold_tick(dec!(101));
        assert_eq!(c.open, dec!(100));
        assert_eq!(c.high, dec!(105));
        assert_eq!(c.low, dec!(95));
        assert_eq!(c.close, dec!(101));
        assert!(c.is_consistent());
    }

    #[test]
    fn ring_evicts_oldest_past_capacity() {
        let mut ring = CandleRing::new(2);
        ring.push(Candle::flat(dec!(1), ts(0)));
        ring.push(Candle::flat(dec!(2), ts(1)));
        ring.push(Candle::flat(dec!(3), ts(2)));
        assert_eq!(ring.len(), 2);
        assert_eq!(ring.as_slice()[0].open, dec!(2));
        assert_eq!(ring.as_slice()[1].open, dec!(3));
    }

    #[test]
    fn last_n_returns_fewer_when_history_short() {
        let mut ring = CandleRing::new(100);
        ring.push(Candle::flat(dec!(1), ts(0)));
        assert_eq!(ring.last_n(5).len(), 1);
    }
}
