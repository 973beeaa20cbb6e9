use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A candle period length, from 1 minute up to 1 month.
///
/// `OneMonth` is treated as exactly 30 days for alignment purposes, as
/// calendar months have no fixed millisecond length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    OneMin,
    ThreeMin,
    FiveMin,
    FifteenMin,
    ThirtyMin,
    OneHour,
    TwoHour,
    FourHour,
    SixHour,
    TwelveHour,
    OneDay,
    OneWeek,
    OneMonth,
}

impl Timeframe {
    /// Returns the duration of this timeframe in minutes.
    pub fn to_minutes(&self) -> usize {
        match self {
            Timeframe::OneMin => 1,
            Timeframe::ThreeMin => 3,
            Timeframe::FiveMin => 5,
            Timeframe::FifteenMin => 15,
            Timeframe::ThirtyMin => 30,
            Timeframe::OneHour => 60,
            Timeframe::TwoHour => 120,
            Timeframe::FourHour => 240,
            Timeframe::SixHour => 360,
            Timeframe::TwelveHour => 720,
            Timeframe::OneDay => 1440,
            Timeframe::OneWeek => 1440 * 7,
            Timeframe::OneMonth => 1440 * 30,
        }
    }

    /// Returns the duration in seconds.
    pub fn to_seconds(&self) -> i64 {
        (self.to_minutes() * 60) as i64
    }

    /// Returns the duration in milliseconds.
    pub fn to_millis(&self) -> i64 {
        self.to_seconds() * 1000
    }

    /// Returns all available timeframes in ascending order.
    pub fn all() -> Vec<Timeframe> {
        vec![
            Timeframe::OneMin,
            Timeframe::ThreeMin,
            Timeframe::FiveMin,
            Timeframe::FifteenMin,
            Timeframe::ThirtyMin,
            Timeframe::OneHour,
            Timeframe::TwoHour,
            Timeframe::FourHour,
            Timeframe::SixHour,
            Timeframe::TwelveHour,
            Timeframe::OneDay,
            Timeframe::OneWeek,
            Timeframe::OneMonth,
        ]
    }

    /// Checks if a timestamp aligns with the start of this timeframe's period.
    ///
    /// # Arguments
    /// * `timestamp_ms` - Unix timestamp in milliseconds
    pub fn is_period_start(&self, timestamp_ms: i64) -> bool {
        timestamp_ms == self.period_start(timestamp_ms)
    }

    /// Returns the start timestamp (ms) of the period containing `timestamp_ms`.
    ///
    /// All timeframes align to the Unix epoch; this matches `floor(ts/Δ)·Δ`
    /// from the aggregation law, so period boundaries are stable regardless
    /// of calendar irregularities.
    pub fn period_start(&self, timestamp_ms: i64) -> i64 {
        let period_ms = self.to_millis();
        timestamp_ms - timestamp_ms.rem_euclid(period_ms)
    }

    /// Calculates how many 1-minute candles are needed for `indicator_period`
    /// candles of this timeframe, with a 10% buffer.
    pub fn warmup_candles(&self, indicator_period: usize) -> usize {
        let required = indicator_period * self.to_minutes();
        (required as f64 * 1.1) as usize
    }
}

impl FromStr for Timeframe {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "1m" => Ok(Timeframe::OneMin),
            "3m" => Ok(Timeframe::ThreeMin),
            "5m" => Ok(Timeframe::FiveMin),
            "15m" => Ok(Timeframe::FifteenMin),
            "30m" => Ok(Timeframe::ThirtyMin),
            "1h" => Ok(Timeframe::OneHour),
            "2h" => Ok(Timeframe::TwoHour),
            "4h" => Ok(Timeframe::FourHour),
            "6h" => Ok(Timeframe::SixHour),
            "12h" => Ok(Timeframe::TwelveHour),
            "1d" => Ok(Timeframe::OneDay),
            "1w" => Ok(Timeframe::OneWeek),
            "1M" | "1mo" => Ok(Timeframe::OneMonth),
            _ => Err(anyhow!(
                "Invalid timeframe: '{}'. Valid options: 1m,3m,5m,15m,30m,1h,2h,4h,6h,12h,1d,1w,1M",
                s
            )),
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Timeframe::OneMin => "1m",
            Timeframe::ThreeMin => "3m",
            Timeframe::FiveMin => "5m",
            Timeframe::FifteenMin => "15m",
            Timeframe::ThirtyMin => "30m",
            Timeframe::OneHour => "1h",
            Timeframe::TwoHour => "2h",
            Timeframe::FourHour => "4h",
            Timeframe::SixHour => "6h",
            Timeframe::TwelveHour => "12h",
            Timeframe::OneDay => "1d",
            Timeframe::OneWeek => "1w",
            Timeframe::OneMonth => "1M",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_minutes() {
        assert_eq!(Timeframe::OneMin.to_minutes(), 1);
        assert_eq!(Timeframe::ThirtyMin.to_minutes(), 30);
        assert_eq!(Timeframe::OneDay.to_minutes(), 1440);
        assert_eq!(Timeframe::OneMonth.to_minutes(), 1440 * 30);
    }

    #[test]
    fn test_from_str_roundtrip() {
        for tf in Timeframe::all() {
            let s = tf.to_string();
            assert_eq!(Timeframe::from_str(&s).unwrap(), tf);
        }
    }

    #[test]
    fn test_invalid_from_str() {
        assert!(Timeframe::from_str("invalid").is_err());
    }

    #[test]
    fn test_period_start_5m() {
        let tf = Timeframe::FiveMin;
        let base = 1704067200000i64; // 2024-01-01 00:00:00 UTC

        assert_eq!(tf.period_start(base), base);
        assert_eq!(tf.period_start(base + 3 * 60 * 1000), base);
        assert_eq!(tf.period_start(base + 5 * 60 * 1000), base + 5 * 60 * 1000);
        assert_eq!(tf.period_start(base + 7 * 60 * 1000), base + 5 * 60 * 1000);
    }

    #[test]
    fn test_is_period_start() {
        let tf = Timeframe::FiveMin;
        let base = 1704067200000i64;

        assert!(tf.is_period_start(base));
        assert!(tf.is_period_start(base + 5 * 60 * 1000));
        assert!(!tf.is_period_start(base + 3 * 60 * 1000));
    }

    #[test]
    fn test_warmup_candles() {
        let tf = Timeframe::FifteenMin;
        let warmup = tf.warmup_candles(50);
        assert_eq!(warmup, 825);
    }

    #[test]
    fn test_one_month_is_30_days() {
        assert_eq!(Timeframe::OneMonth.to_minutes(), 30 * Timeframe::OneDay.to_minutes());
    }
}
