use crate::domain::market::candle::Candle;
use crate::domain::market::dynamics::CandleDynamics;
use crate::domain::market::timeframe::Timeframe;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// An in-progress or completed aggregation of 1-minute candles into a higher
/// timeframe, per the §4.7 reduction (open=first, close=last, high=max,
/// low=min, volume=sum).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeframeCandle {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
    /// Start timestamp of this timeframe period (ms).
    pub timestamp: i64,
    /// Number of 1-minute candles folded into this candle so far.
    pub candle_count: usize,
    /// Richer per-group context (§4.7), set by the aggregator once this
    /// candle's constituents are known. `None` until the aggregator fills it
    /// in; plain consumers of `to_candle()` never see it.
    pub dynamics: Option<CandleDynamics>,
}

impl TimeframeCandle {
    /// Creates a new aggregate seeded from the first base candle.
    pub fn new(
        symbol: String,
        timeframe: Timeframe,
        open: Decimal,
        high: Decimal,
        low: Decimal,
        close: Decimal,
        volume: Decimal,
        timestamp: i64,
    ) -> Self {
        Self {
            symbol,
            timeframe,
            open,
            high,
            low,
            close,
            volume,
            timestamp,
            candle_count: 1,
            dynamics: None,
        }
    }

    /// Folds one more base candle in. Open stays the first candle's open;
    /// high/low widen; close tracks the latest; volume accumulates.
    pub fn update(&mut self, high: Decimal, low: Decimal, close: Decimal, volume: Decimal) {
        if high > self.high {
            self.high = high;
        }
        if low < self.low {
            self.low = low;
        }
        self.close = close;
        self.volume += volume;
        self.candle_count += 1;
    }

    /// True once this aggregate has received `timeframe.to_minutes()` base candles.
    pub fn is_complete(&self) -> bool {
        self.candle_count >= self.timeframe.to_minutes()
    }

    /// End timestamp of this period (exclusive upper bound), in ms.
    pub fn end_timestamp(&self) -> i64 {
        self.timestamp + self.timeframe.to_millis()
    }

    pub fn to_candle(&self) -> Candle {
        Candle::new(
            self.timestamp,
            self.open,
            self.high,
            self.low,
            self.close,
            self.volume,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sample() -> TimeframeCandle {
        TimeframeCandle::new(
            "BTC/USD".to_string(),
            Timeframe::FiveMin,
            dec!(100.0),
            dec!(105.0),
            dec!(99.0),
            dec!(103.0),
            dec!(1000.0),
            1704067200000,
        )
    }

    #[test]
    fn test_new_timeframe_candle() {
        let candle = sample();
        assert_eq!(candle.symbol, "BTC/USD");
        assert_eq!(candle.open, dec!(100.0));
        assert_eq!(candle.close, dec!(103.0));
        assert_eq!(candle.candle_count, 1);
    }

    #[test]
    fn test_update_candle() {
        let mut candle = sample();
        candle.update(dec!(107.0), dec!(102.0), dec!(106.0), dec!(1500.0));

        assert_eq!(candle.open, dec!(100.0));
        assert_eq!(candle.high, dec!(107.0));
        assert_eq!(candle.low, dec!(99.0));
        assert_eq!(candle.close, dec!(106.0));
        assert_eq!(candle.volume, dec!(2500.0));
        assert_eq!(candle.candle_count, 2);
    }

    #[test]
    fn test_is_complete() {
        let mut candle = sample();
        assert!(!candle.is_complete());
        for _ in 0..4 {
            candle.update(dec!(105.0), dec!(102.0), dec!(104.0), dec!(1000.0));
        }
        assert!(candle.is_complete());
    }

    #[test]
    fn test_end_timestamp() {
        let candle = sample();
        assert_eq!(candle.end_timestamp(), 1704067200000 + 300_000);
    }

    #[test]
    fn test_to_candle_preserves_reduction() {
        let mut candle = sample();
        candle.update(dec!(110.0), dec!(95.0), dec!(108.0), dec!(500.0));
        let c = candle.to_candle();
        assert_eq!(c.open, dec!(100.0));
        assert_eq!(c.close, dec!(108.0));
        assert_eq!(c.high, dec!(110.0));
        assert_eq!(c.low, dec!(95.0));
        assert_eq!(c.volume, dec!(1500.0));
    }
}
