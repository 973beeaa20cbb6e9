use super::sma::Sma;
use super::{Indicator, IndicatorParams, IndicatorSeries, IndicatorValue, PriceSource};
use crate::domain::errors::IndicatorError;
use crate::domain::market::candle::Candle;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::BTreeMap;

/// Bollinger Bands: middle = SMA(n), bands = middle ± k·σ (population
/// standard deviation), plus bandwidth and %B. Multi-line, primary "middle".
pub struct Bollinger;

impl Bollinger {
    pub fn series(
        values: &[Decimal],
        n: usize,
        k: Decimal,
    ) -> Vec<Option<(Decimal, Decimal, Decimal, Decimal, Decimal)>> {
        let middle = Sma::series(values, n);
        let mut out = vec![None; values.len()];

        for i in 0..values.len() {
            let Some(mid) = middle[i] else { continue };
            let window = &values[i + 1 - n..=i];
            let variance_sum: Decimal = window
                .iter()
                .map(|v| {
                    let d = *v - mid;
                    d * d
                })
                .sum();
            let variance = variance_sum / Decimal::from(n);
            let stddev = Decimal::from_f64_retain(variance.to_f64().unwrap_or(0.0).sqrt())
                .unwrap_or(Decimal::ZERO);
            let upper = mid + k * stddev;
            let lower = mid - k * stddev;
            let bandwidth = if mid != Decimal::ZERO {
                (upper - lower) / mid
            } else {
                Decimal::ZERO
            };
            let percent_b = if upper != lower {
                (values[i] - lower) / (upper - lower)
            } else {
                Decimal::ZERO
            };
            out[i] = Some((mid, upper, lower, bandwidth, percent_b));
        }
        out
    }
}

impl Indicator for Bollinger {
    fn name(&self) -> &'static str {
        "BOLLINGER"
    }

    fn validate(&self, params: &IndicatorParams) -> Result<(), IndicatorError> {
        if params.get_usize("period", 0) == 0 {
            return Err(IndicatorError::InvalidParams {
                indicator: self.name().to_string(),
                reason: "period must be > 0".to_string(),
            });
        }
        Ok(())
    }

    fn required_warmup(&self, params: &IndicatorParams) -> usize {
        params.get_usize("period", 20)
    }

    fn calculate(
        &self,
        series: &[Candle],
        params: &IndicatorParams,
    ) -> Result<IndicatorSeries, IndicatorError> {
        self.validate(params)?;
        let n = params.get_usize("period", 20);
        let k = params.get_decimal("std_dev", Decimal::TWO);
        let source = params.get_source(PriceSource::Close);
        let values: Vec<Decimal> = series.iter().map(|c| source.extract(c)).collect();

        Ok(Self::series(&values, n, k)
            .into_iter()
            .map(|v| {
                v.map(|(mid, upper, lower, bandwidth, percent_b)| {
                    let mut lines = BTreeMap::new();
                    lines.insert("middle", mid);
                    lines.insert("upper", upper);
                    lines.insert("lower", lower);
                    lines.insert("bandwidth", bandwidth);
                    lines.insert("percent_b", percent_b);
                    IndicatorValue::Lines(lines)
                })
            })
            .collect())
    }

    fn primary_line(&self) -> Option<&'static str> {
        Some("middle")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_bollinger_flat_series_zero_width() {
        let values = vec![dec!(10); 25];
        let result = Bollinger::series(&values, 20, Decimal::TWO);
        let (mid, upper, lower, _, _) = result[19].unwrap();
        assert_eq!(mid, dec!(10));
        assert_eq!(upper, dec!(10));
        assert_eq!(lower, dec!(10));
    }

    #[test]
    fn test_bollinger_upper_above_lower() {
        let values: Vec<Decimal> = (1..=30).map(Decimal::from).collect();
        let result = Bollinger::series(&values, 20, Decimal::TWO);
        let (_, upper, lower, _, _) = result[29].unwrap();
        assert!(upper > lower);
    }

    #[test]
    fn test_bollinger_warmup() {
        let values = vec![dec!(1), dec!(2)];
        let result = Bollinger::series(&values, 20, Decimal::TWO);
        assert!(result.iter().all(|v| v.is_none()));
    }
}
