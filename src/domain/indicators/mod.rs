//! The technical-indicator library: a registry of pluggable indicators
//! producing an aligned per-candle sequence over OHLCV series (§4.1).
//!
//! Indicators are modeled as a trait object (`dyn Indicator`), the same
//! "capability set behind an interface" shape this codebase already uses for
//! `dyn FeeModel` and `dyn TradingStrategy`, discovered by name from a
//! case-insensitive registry (§9).

pub mod adx;
pub mod atr;
pub mod bollinger;
pub mod ema;
pub mod macd;
pub mod obv;
pub mod pivot;
pub mod rsi;
pub mod smma;
pub mod sma;
pub mod stochastic;
pub mod volume_sma;

use crate::domain::errors::IndicatorError;
use crate::domain::market::candle::Candle;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// A single parameter value, loosely typed the way a strategy's JSON schema
/// would supply it.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Int(i64),
    Decimal(Decimal),
    Str(String),
}

/// Parameter bag passed to an indicator's `validate`/`required_warmup`/`calculate`.
#[derive(Debug, Clone, Default)]
pub struct IndicatorParams(pub HashMap<String, ParamValue>);

impl IndicatorParams {
    pub fn new() -> Self {
        Self(HashMap::new())
    }

    pub fn with_int(mut self, key: &str, value: i64) -> Self {
        self.0.insert(key.to_string(), ParamValue::Int(value));
        self
    }

    pub fn with_decimal(mut self, key: &str, value: Decimal) -> Self {
        self.0.insert(key.to_string(), ParamValue::Decimal(value));
        self
    }

    pub fn with_str(mut self, key: &str, value: &str) -> Self {
        self.0
            .insert(key.to_string(), ParamValue::Str(value.to_string()));
        self
    }

    pub fn get_usize(&self, key: &str, default: usize) -> usize {
        match self.0.get(key) {
            Some(ParamValue::Int(v)) if *v > 0 => *v as usize,
            _ => default,
        }
    }

    pub fn get_decimal(&self, key: &str, default: Decimal) -> Decimal {
        match self.0.get(key) {
            Some(ParamValue::Decimal(v)) => *v,
            Some(ParamValue::Int(v)) => Decimal::from(*v),
            _ => default,
        }
    }

    pub fn get_source(&self, default: PriceSource) -> PriceSource {
        match self.0.get("source") {
            Some(ParamValue::Str(s)) => PriceSource::from_str(s).unwrap_or(default),
            _ => default,
        }
    }
}

/// A price field or derived price an indicator can be computed over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PriceSource {
    Open,
    High,
    Low,
    Close,
    Volume,
    Hl2,
    Hlc3,
    Ohlc4,
}

impl PriceSource {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "open" => Some(Self::Open),
            "high" => Some(Self::High),
            "low" => Some(Self::Low),
            "close" => Some(Self::Close),
            "volume" => Some(Self::Volume),
            "hl2" => Some(Self::Hl2),
            "hlc3" => Some(Self::Hlc3),
            "ohlc4" => Some(Self::Ohlc4),
            _ => None,
        }
    }

    pub fn extract(&self, c: &Candle) -> Decimal {
        match self {
            PriceSource::Open => c.open,
            PriceSource::High => c.high,
            PriceSource::Low => c.low,
            PriceSource::Close => c.close,
            PriceSource::Volume => c.volume,
            PriceSource::Hl2 => c.hl2(),
            PriceSource::Hlc3 => c.hlc3(),
            PriceSource::Ohlc4 => c.ohlc4(),
        }
    }
}

/// One candle's indicator output: a single scalar, or a named-line record
/// for multi-line indicators (MACD, Bollinger, Pivot, ADX, Stochastic, OBV).
#[derive(Debug, Clone, PartialEq)]
pub enum IndicatorValue {
    Scalar(Decimal),
    Lines(BTreeMap<&'static str, Decimal>),
}

impl IndicatorValue {
    pub fn scalar(v: Decimal) -> Self {
        Self::Scalar(v)
    }

    /// Bare-name access: the scalar, or the canonical primary line.
    pub fn primary(&self, primary_line: Option<&'static str>) -> Option<Decimal> {
        match self {
            IndicatorValue::Scalar(v) => Some(*v),
            IndicatorValue::Lines(lines) => {
                primary_line.and_then(|k| lines.get(k).copied())
            }
        }
    }

    pub fn line(&self, name: &str) -> Option<Decimal> {
        match self {
            IndicatorValue::Scalar(v) => Some(*v),
            IndicatorValue::Lines(lines) => lines.get(name).copied(),
        }
    }
}

/// Per-candle sequence of optional values; the first `warmup - 1` entries
/// are `None`.
pub type IndicatorSeries = Vec<Option<IndicatorValue>>;

/// The shared capability set every indicator implements: name, parameter
/// validation, warmup requirement, and the calculation itself.
pub trait Indicator: Send + Sync {
    fn name(&self) -> &'static str;

    fn validate(&self, params: &IndicatorParams) -> Result<(), IndicatorError>;

    fn required_warmup(&self, params: &IndicatorParams) -> usize;

    fn calculate(
        &self,
        series: &[Candle],
        params: &IndicatorParams,
    ) -> Result<IndicatorSeries, IndicatorError>;

    /// Canonical line returned for bare-name access on a multi-line result.
    /// `None` for single-line (scalar) indicators.
    fn primary_line(&self) -> Option<&'static str> {
        None
    }
}

/// Case-insensitive registry of indicators, built with the 12 required
/// built-ins and open to runtime registration (§5: read-only after startup).
pub struct IndicatorRegistry {
    indicators: HashMap<String, Arc<dyn Indicator>>,
}

impl IndicatorRegistry {
    pub fn with_builtins() -> Self {
        let mut registry = Self {
            indicators: HashMap::new(),
        };
        registry.register(Arc::new(sma::Sma));
        registry.register(Arc::new(ema::Ema));
        registry.register(Arc::new(smma::Smma));
        registry.register(Arc::new(rsi::Rsi));
        registry.register(Arc::new(atr::Atr));
        registry.register(Arc::new(macd::Macd));
        registry.register(Arc::new(bollinger::Bollinger));
        registry.register(Arc::new(pivot::PivotPoints));
        registry.register(Arc::new(adx::Adx));
        registry.register(Arc::new(stochastic::Stochastic));
        registry.register(Arc::new(obv::Obv));
        registry.register(Arc::new(volume_sma::VolumeSma));
        registry
    }

    pub fn register(&mut self, indicator: Arc<dyn Indicator>) {
        self.indicators
            .insert(indicator.name().to_uppercase(), indicator);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Indicator>> {
        self.indicators.get(&name.to_uppercase()).cloned()
    }
}

impl Default for IndicatorRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtins_registered_case_insensitive() {
        let registry = IndicatorRegistry::with_builtins();
        assert!(registry.get("sma").is_some());
        assert!(registry.get("SMA").is_some());
        assert!(registry.get("Sma").is_some());
        assert!(registry.get("nonexistent").is_none());
    }

    #[test]
    fn test_all_twelve_builtins_present() {
        let registry = IndicatorRegistry::with_builtins();
        for name in [
            "SMA", "EMA", "SMMA", "RSI", "ATR", "MACD", "BOLLINGER", "PIVOT", "ADX",
            "STOCHASTIC", "OBV", "VOLUME_SMA",
        ] {
            assert!(registry.get(name).is_some(), "missing indicator {name}");
        }
    }
}
