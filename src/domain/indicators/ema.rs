use super::sma::Sma;
use super::{Indicator, IndicatorParams, IndicatorSeries, IndicatorValue, PriceSource};
use crate::domain::errors::IndicatorError;
use crate::domain::market::candle::Candle;
use rust_decimal::Decimal;

/// Exponential moving average, seeded by SMA(n); thereafter
/// `ema = α·x + (1-α)·ema_prev` with `α = 2/(n+1)`.
pub struct Ema;

impl Ema {
    pub fn series(values: &[Decimal], n: usize) -> Vec<Option<Decimal>> {
        let sma = Sma::series(values, n);
        let alpha = Decimal::TWO / Decimal::from(n + 1);
        let mut out = Vec::with_capacity(values.len());
        let mut ema_prev: Option<Decimal> = None;

        for (i, value) in values.iter().enumerate() {
            match ema_prev {
                None => {
                    if let Some(seed) = sma[i] {
                        out.push(Some(seed));
                        ema_prev = Some(seed);
                    } else {
                        out.push(None);
                    }
                }
                Some(prev) => {
                    let ema = alpha * value + (Decimal::ONE - alpha) * prev;
                    out.push(Some(ema));
                    ema_prev = Some(ema);
                }
            }
        }
        out
    }
}

impl Indicator for Ema {
    fn name(&self) -> &'static str {
        "EMA"
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
        let source = params.get_source(PriceSource::Close);
        let values: Vec<Decimal> = series.iter().map(|c| source.extract(c)).collect();
        Ok(Self::series(&values, n)
            .into_iter()
            .map(|v| v.map(IndicatorValue::scalar))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_ema_seeded_by_sma() {
        let values = vec![dec!(1), dec!(2), dec!(3), dec!(4), dec!(5)];
        let result = Ema::series(&values, 3);
        assert!(result[0].is_none());
        assert!(result[1].is_none());
        // SMA(3) of [1,2,3] = 2
        assert_eq!(result[2], Some(dec!(2)));
    }

    #[test]
    fn test_ema_tracks_upward_trend() {
        let values: Vec<Decimal> = (1..=20).map(Decimal::from).collect();
        let result = Ema::series(&values, 5);
        let last = result.last().unwrap().unwrap();
        assert!(last > dec!(10));
    }
}
