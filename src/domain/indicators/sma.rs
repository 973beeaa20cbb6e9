use super::{Indicator, IndicatorParams, IndicatorSeries, IndicatorValue, PriceSource};
use crate::domain::errors::IndicatorError;
use crate::domain::market::candle::Candle;
use rust_decimal::Decimal;

/// Simple moving average: arithmetic mean of the last `n` values of the
/// chosen price source.
pub struct Sma;

impl Sma {
    pub fn series(values: &[Decimal], n: usize) -> Vec<Option<Decimal>> {
        let mut out = Vec::with_capacity(values.len());
        for i in 0..values.len() {
            if i + 1 < n {
                out.push(None);
                continue;
            }
            let window = &values[i + 1 - n..=i];
            let sum: Decimal = window.iter().sum();
            out.push(Some(sum / Decimal::from(n)));
        }
        out
    }
}

impl Indicator for Sma {
    fn name(&self) -> &'static str {
        "SMA"
    }

    fn validate(&self, params: &IndicatorParams) -> Result<(), IndicatorError> {
        let n = params.get_usize("period", 0);
        if n == 0 {
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

    fn candle(close: Decimal) -> Candle {
        Candle::new(0, close, close, close, close, dec!(1))
    }

    #[test]
    fn test_sma_warmup_nulls() {
        let series: Vec<Candle> = [1, 2, 3].iter().map(|v| candle(Decimal::from(*v))).collect();
        let params = IndicatorParams::new().with_int("period", 3);
        let result = Sma.calculate(&series, &params).unwrap();
        assert!(result[0].is_none());
        assert!(result[1].is_none());
        assert!(result[2].is_some());
    }

    #[test]
    fn test_sma_value() {
        let series: Vec<Candle> = [2, 4, 6].iter().map(|v| candle(Decimal::from(*v))).collect();
        let params = IndicatorParams::new().with_int("period", 3);
        let result = Sma.calculate(&series, &params).unwrap();
        assert_eq!(result[2].as_ref().unwrap().primary(None), Some(dec!(4)));
    }

    #[test]
    fn test_invalid_period_rejected() {
        let params = IndicatorParams::new().with_int("period", 0);
        assert!(Sma.validate(&params).is_err());
    }
}
