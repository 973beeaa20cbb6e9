use super::sma::Sma;
use super::{Indicator, IndicatorParams, IndicatorSeries, IndicatorValue};
use crate::domain::errors::IndicatorError;
use crate::domain::market::candle::Candle;
use rust_decimal::Decimal;
use std::collections::BTreeMap;

/// Stochastic oscillator: raw %K from the high/low range over `k_period`,
/// smoothed by `smooth`, and a %D signal SMA over `d_period`. Multi-line,
/// primary "k".
pub struct Stochastic;

impl Stochastic {
    pub fn series(
        candles: &[Candle],
        k_period: usize,
        smooth: usize,
        d_period: usize,
    ) -> Vec<Option<(Decimal, Decimal)>> {
        let len = candles.len();
        let mut raw_k = vec![None; len];

        for i in 0..len {
            if i + 1 < k_period {
                continue;
            }
            let window = &candles[i + 1 - k_period..=i];
            let highest = window.iter().map(|c| c.high).fold(window[0].high, |a, b| a.max(b));
            let lowest = window.iter().map(|c| c.low).fold(window[0].low, |a, b| a.min(b));
            let range = highest - lowest;
            let value = if range == Decimal::ZERO {
                Decimal::from(50)
            } else {
                Decimal::from(100) * (candles[i].close - lowest) / range
            };
            raw_k[i] = Some(value);
        }

        let first_valid = match raw_k.iter().position(|v| v.is_some()) {
            Some(i) => i,
            None => return vec![None; len],
        };
        let tail: Vec<Decimal> = raw_k[first_valid..].iter().map(|v| v.unwrap()).collect();
        let smoothed_k = Sma::series(&tail, smooth);

        let first_smoothed = smoothed_k.iter().position(|v| v.is_some());
        let mut out = vec![None; len];
        let Some(first_smoothed) = first_smoothed else {
            return out;
        };
        let smoothed_tail: Vec<Decimal> = smoothed_k[first_smoothed..]
            .iter()
            .map(|v| v.unwrap())
            .collect();
        let d = Sma::series(&smoothed_tail, d_period);

        for (offset, d_val) in d.into_iter().enumerate() {
            let idx = first_valid + first_smoothed + offset;
            if let Some(d_val) = d_val {
                let k_val = smoothed_k[first_smoothed + offset].unwrap();
                out[idx] = Some((k_val, d_val));
            }
        }
        out
    }
}

impl Indicator for Stochastic {
    fn name(&self) -> &'static str {
        "STOCHASTIC"
    }

    fn validate(&self, params: &IndicatorParams) -> Result<(), IndicatorError> {
        if params.get_usize("k_period", 0) == 0 {
            return Err(IndicatorError::InvalidParams {
                indicator: self.name().to_string(),
                reason: "k_period must be > 0".to_string(),
            });
        }
        Ok(())
    }

    fn required_warmup(&self, params: &IndicatorParams) -> usize {
        let k = params.get_usize("k_period", 14);
        let smooth = params.get_usize("smooth", 3);
        let d = params.get_usize("d_period", 3);
        k + smooth + d - 2
    }

    fn calculate(
        &self,
        series: &[Candle],
        params: &IndicatorParams,
    ) -> Result<IndicatorSeries, IndicatorError> {
        self.validate(params)?;
        let k_period = params.get_usize("k_period", 14);
        let smooth = params.get_usize("smooth", 3);
        let d_period = params.get_usize("d_period", 3);

        Ok(Self::series(series, k_period, smooth, d_period)
            .into_iter()
            .map(|v| {
                v.map(|(k, d)| {
                    let mut lines = BTreeMap::new();
                    lines.insert("k", k);
                    lines.insert("d", d);
                    IndicatorValue::Lines(lines)
                })
            })
            .collect())
    }

    fn primary_line(&self) -> Option<&'static str> {
        Some("k")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn candle(h: Decimal, l: Decimal, c: Decimal) -> Candle {
        Candle::new(0, c, h, l, c, dec!(1))
    }

    #[test]
    fn test_stochastic_bounded_0_100() {
        let series: Vec<Candle> = (0..30)
            .map(|i| {
                let base = Decimal::from(i % 7);
                candle(dec!(10) + base, dec!(5) + base, dec!(7) + base)
            })
            .collect();
        let result = Stochastic::series(&series, 14, 3, 3);
        let (k, d) = result.last().unwrap().unwrap();
        assert!(k >= Decimal::ZERO && k <= Decimal::from(100));
        assert!(d >= Decimal::ZERO && d <= Decimal::from(100));
    }

    #[test]
    fn test_stochastic_flat_range_is_50() {
        let series: Vec<Candle> = (0..20).map(|_| candle(dec!(10), dec!(10), dec!(10))).collect();
        let result = Stochastic::series(&series, 14, 3, 3);
        let (k, _) = result.last().unwrap().unwrap();
        assert_eq!(k, dec!(50));
    }
}
