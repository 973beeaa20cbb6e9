use super::sma::Sma;
use super::{Indicator, IndicatorParams, IndicatorSeries, IndicatorValue};
use crate::domain::errors::IndicatorError;
use crate::domain::market::candle::Candle;
use rust_decimal::Decimal;

/// Simple moving average of volume over `n` candles.
pub struct VolumeSma;

impl Indicator for VolumeSma {
    fn name(&self) -> &'static str {
        "VOLUME_SMA"
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
        let volumes: Vec<Decimal> = series.iter().map(|c| c.volume).collect();
        Ok(Sma::series(&volumes, n)
            .into_iter()
            .map(|v| v.map(IndicatorValue::scalar))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn candle(volume: Decimal) -> Candle {
        Candle::new(0, dec!(1), dec!(1), dec!(1), dec!(1), volume)
    }

    #[test]
    fn test_volume_sma_value() {
        let series = vec![candle(dec!(10)), candle(dec!(20)), candle(dec!(30))];
        let params = IndicatorParams::new().with_int("period", 3);
        let result = VolumeSma.calculate(&series, &params).unwrap();
        assert_eq!(result[2].as_ref().unwrap().primary(None), Some(dec!(20)));
    }

    #[test]
    fn test_volume_sma_warmup() {
        let series = vec![candle(dec!(10))];
        let params = IndicatorParams::new().with_int("period", 3);
        let result = VolumeSma.calculate(&series, &params).unwrap();
        assert!(result[0].is_none());
    }
}
