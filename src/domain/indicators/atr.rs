use super::{Indicator, IndicatorParams, IndicatorSeries, IndicatorValue};
use crate::domain::errors::IndicatorError;
use crate::domain::market::candle::Candle;
use rust_decimal::Decimal;

/// Average True Range: Wilder smoothing of the true range. Warmup = n+1.
pub struct Atr;

impl Atr {
    fn true_range(c: &Candle, prev_close: Decimal) -> Decimal {
        let a = c.high - c.low;
        let b = (c.high - prev_close).abs();
        let d = (c.low - prev_close).abs();
        a.max(b).max(d)
    }

    pub fn series(candles: &[Candle], n: usize) -> Vec<Option<Decimal>> {
        let len = candles.len();
        let mut out = vec![None; len];
        if len < n + 1 {
            return out;
        }

        let n_dec = Decimal::from(n);
        let mut sum = Decimal::ZERO;
        for i in 1..=n {
            sum += Self::true_range(&candles[i], candles[i - 1].close);
        }
        let mut atr = sum / n_dec;
        out[n] = Some(atr);

        for i in (n + 1)..len {
            let tr = Self::true_range(&candles[i], candles[i - 1].close);
            atr = (atr * (n_dec - Decimal::ONE) + tr) / n_dec;
            out[i] = Some(atr);
        }
        out
    }
}

impl Indicator for Atr {
    fn name(&self) -> &'static str {
        "ATR"
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
        Ok(Self::series(series, n)
            .into_iter()
            .map(|v| v.map(IndicatorValue::scalar))
            .collect())
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
    fn test_atr_warmup() {
        let series = vec![
            candle(dec!(10), dec!(8), dec!(9)),
            candle(dec!(11), dec!(9), dec!(10)),
        ];
        let params = IndicatorParams::new().with_int("period", 14);
        let result = Atr.calculate(&series, &params).unwrap();
        assert!(result.iter().all(|v| v.is_none()));
    }

    #[test]
    fn test_atr_constant_range() {
        let series: Vec<Candle> = (0..10)
            .map(|_| candle(dec!(10), dec!(8), dec!(9)))
            .collect();
        let result = Atr::series(&series, 3);
        assert_eq!(result[3], Some(dec!(2)));
        assert_eq!(result[9], Some(dec!(2)));
    }

    #[test]
    fn test_atr_never_negative() {
        let series = vec![
            candle(dec!(10), dec!(8), dec!(9)),
            candle(dec!(9.5), dec!(8.5), dec!(9)),
            candle(dec!(9), dec!(7), dec!(8)),
            candle(dec!(8), dec!(6), dec!(7)),
        ];
        let result = Atr::series(&series, 3);
        assert!(result[3].unwrap() >= Decimal::ZERO);
    }
}
