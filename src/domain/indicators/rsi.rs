use super::{Indicator, IndicatorParams, IndicatorSeries, IndicatorValue, PriceSource};
use crate::domain::errors::IndicatorError;
use crate::domain::market::candle::Candle;
use rust_decimal::Decimal;

/// Relative Strength Index: Wilder-smoothed average gains and losses over
/// `n` price changes. Warmup = n+1.
pub struct Rsi;

impl Rsi {
    pub fn series(values: &[Decimal], n: usize) -> Vec<Option<Decimal>> {
        let len = values.len();
        let mut out = vec![None; len];
        if len < n + 1 {
            return out;
        }

        let n_dec = Decimal::from(n);
        let mut gains = Decimal::ZERO;
        let mut losses = Decimal::ZERO;
        for i in 1..=n {
            let delta = values[i] - values[i - 1];
            if delta > Decimal::ZERO {
                gains += delta;
            } else {
                losses += -delta;
            }
        }
        let mut avg_gain = gains / n_dec;
        let mut avg_loss = losses / n_dec;
        out[n] = Some(Self::rsi_from_averages(avg_gain, avg_loss));

        for i in (n + 1)..len {
            let delta = values[i] - values[i - 1];
            let (gain, loss) = if delta > Decimal::ZERO {
                (delta, Decimal::ZERO)
            } else {
                (Decimal::ZERO, -delta)
            };
            avg_gain = (avg_gain * (n_dec - Decimal::ONE) + gain) / n_dec;
            avg_loss = (avg_loss * (n_dec - Decimal::ONE) + loss) / n_dec;
            out[i] = Some(Self::rsi_from_averages(avg_gain, avg_loss));
        }
        out
    }

    fn rsi_from_averages(avg_gain: Decimal, avg_loss: Decimal) -> Decimal {
        if avg_loss == Decimal::ZERO {
            return Decimal::from(100);
        }
        let rs = avg_gain / avg_loss;
        Decimal::from(100) - Decimal::from(100) / (Decimal::ONE + rs)
    }
}

impl Indicator for Rsi {
    fn name(&self) -> &'static str {
        "RSI"
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
        params.get_usize("period", 14) + 1
    }

    fn calculate(
        &self,
        series: &[Candle],
        params: &IndicatorParams,
    ) -> Result<IndicatorSeries, IndicatorError> {
        self.validate(params)?;
        let n = params.get_usize("period", 14);
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
    fn test_rsi_all_gains_is_100() {
        let values: Vec<Decimal> = (1..=20).map(Decimal::from).collect();
        let result = Rsi::series(&values, 14);
        assert_eq!(result[14], Some(dec!(100)));
    }

    fn candle(close: Decimal) -> Candle {
        Candle::new(0, close, close, close, close, dec!(1))
    }

    #[test]
    fn test_rsi_warmup() {
        let series: Vec<Candle> = (1..=10).map(|v| candle(Decimal::from(v))).collect();
        let params = IndicatorParams::new().with_int("period", 14);
        let result = Rsi.calculate(&series, &params).unwrap();
        assert!(result.iter().all(|v| v.is_none()));
    }

    #[test]
    fn test_rsi_bounded_0_100() {
        let values = vec![
            dec!(100), dec!(102), dec!(99), dec!(105), dec!(98), dec!(110), dec!(108), dec!(112),
            dec!(107), dec!(115), dec!(113), dec!(118), dec!(116), dec!(120), dec!(119),
        ];
        let result = Rsi::series(&values, 14);
        let v = result[14].unwrap();
        assert!(v >= Decimal::ZERO && v <= Decimal::from(100));
    }
}
