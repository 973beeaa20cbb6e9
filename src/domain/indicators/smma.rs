use super::sma::Sma;
use super::{Indicator, IndicatorParams, IndicatorSeries, IndicatorValue, PriceSource};
use crate::domain::errors::IndicatorError;
use crate::domain::market::candle::Candle;
use rust_decimal::Decimal;

/// Smoothed moving average, seeded by SMA(n); thereafter
/// `smma = (smma_prev·(n-1) + x)/n`.
pub struct Smma;

impl Smma {
    pub fn series(values: &[Decimal], n: usize) -> Vec<Option<Decimal>> {
        let sma = Sma::series(values, n);
        let n_dec = Decimal::from(n);
        let mut out = Vec::with_capacity(values.len());
        let mut prev: Option<Decimal> = None;

        for (i, value) in values.iter().enumerate() {
            match prev {
                None => {
                    if let Some(seed) = sma[i] {
                        out.push(Some(seed));
                        prev = Some(seed);
                    } else {
                        out.push(None);
                    }
                }
                Some(p) => {
                    let smma = (p * (n_dec - Decimal::ONE) + value) / n_dec;
                    out.push(Some(smma));
                    prev = Some(smma);
                }
            }
        }
        out
    }
}

impl Indicator for Smma {
    fn name(&self) -> &'static str {
        "SMMA"
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
    fn test_smma_seeded_by_sma() {
        let values = vec![dec!(1), dec!(2), dec!(3), dec!(4), dec!(5)];
        let result = Smma::series(&values, 3);
        assert_eq!(result[2], Some(dec!(2)));
    }

    #[test]
    fn test_smma_smooths_less_aggressively_than_ema() {
        use super::super::ema::Ema;
        let values: Vec<Decimal> = (1..=30).map(Decimal::from).collect();
        let smma = Smma::series(&values, 10);
        let ema = Ema::series(&values, 10);
        // SMMA lags a steady uptrend more than EMA.
        assert!(smma.last().unwrap().unwrap() <= ema.last().unwrap().unwrap());
    }
}
