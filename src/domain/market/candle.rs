use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// An OHLCV candle record, immutable once produced.
///
/// `timestamp` is the candle's period-start in milliseconds since the Unix
/// epoch; it is always aligned to the candle's timeframe (see
/// [`crate::domain::market::timeframe::Timeframe::period_start`]).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: i64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

impl Candle {
    pub fn new(
        timestamp: i64,
        open: Decimal,
        high: Decimal,
        low: Decimal,
        close: Decimal,
        volume: Decimal,
    ) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// `low ≤ open,close ≤ high` and volume is non-negative.
    pub fn is_valid(&self) -> bool {
        self.low <= self.open
            && self.open <= self.high
            && self.low <= self.close
            && self.close <= self.high
            && self.volume >= Decimal::ZERO
    }

    pub fn hl2(&self) -> Decimal {
        (self.high + self.low) / Decimal::TWO
    }

    pub fn hlc3(&self) -> Decimal {
        (self.high + self.low + self.close) / Decimal::from(3)
    }

    pub fn ohlc4(&self) -> Decimal {
        (self.open + self.high + self.low + self.close) / Decimal::from(4)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn candle(o: Decimal, h: Decimal, l: Decimal, c: Decimal) -> Candle {
        Candle::new(0, o, h, l, c, dec!(100))
    }

    #[test]
    fn test_valid_candle() {
        let c = candle(dec!(10), dec!(12), dec!(9), dec!(11));
        assert!(c.is_valid());
    }

    #[test]
    fn test_invalid_candle_close_above_high() {
        let c = candle(dec!(10), dec!(11), dec!(9), dec!(12));
        assert!(!c.is_valid());
    }

    #[test]
    fn test_derived_prices() {
        let c = candle(dec!(10), dec!(20), dec!(10), dec!(15));
        assert_eq!(c.hl2(), dec!(15));
        assert_eq!(c.hlc3(), dec!(15));
        assert_eq!(c.ohlc4(), dec!(13.75));
    }
}
