use super::sma::Sma;
use super::{Indicator, IndicatorParams, IndicatorSeries, IndicatorValue};
use crate::domain::errors::IndicatorError;
use crate::domain::market::candle::Candle;
use rust_decimal::Decimal;
use std::collections::BTreeMap;

/// On-Balance Volume: cumulative signed-volume sum, with an optional SMA
/// signal line. Multi-line, primary "obv".
pub struct Obv;

impl Obv {
    pub fn series(candles: &[Candle]) -> Vec<Decimal> {
        let mut out = Vec::with_capacity(candles.len());
        let mut cumulative = Decimal::ZERO;
        for i in 0..candles.len() {
            if i > 0 {
                if candles[i].close > candles[i - 1].close {
                    cumulative += candles[i].volume;
                } else if candles[i].close < candles[i - 1].close {
                    cumulative -= candles[i].volume;
                }
            }
            out.push(cumulative);
        }
        out
    }
}

impl Indicator for Obv {
    fn name(&self) -> &'static str {
        "OBV"
    }

    fn validate(&self, _params: &IndicatorParams) -> Result<(), IndicatorError> {
        Ok(())
    }

    fn required_warmup(&self, _params: &IndicatorParams) -> usize {
        1
    }

    fn calculate(
        &self,
        series: &[Candle],
        params: &IndicatorParams,
    ) -> Result<IndicatorSeries, IndicatorError> {
        let obv = Self::series(series);
        let signal_period = params.get_usize("signal_period", 0);
        let signal = if signal_period > 0 {
            Sma::series(&obv, signal_period)
        } else {
            vec![None; obv.len()]
        };

        Ok(obv
            .into_iter()
            .zip(signal)
            .enumerate()
            .map(|(i, (obv_val, signal_val))| {
                if i == 0 {
                    return None;
                }
                let mut lines = BTreeMap::new();
                lines.insert("obv", obv_val);
                if let Some(s) = signal_val {
                    lines.insert("signal", s);
                }
                Some(IndicatorValue::Lines(lines))
            })
            .collect())
    }

    fn primary_line(&self) -> Option<&'static str> {
        Some("obv")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn candle(close: Decimal, volume: Decimal) -> Candle {
        Candle::new(0, close, close, close, close, volume)
    }

    #[test]
    fn test_obv_accumulates_on_up_moves() {
        let series = vec![
            candle(dec!(10), dec!(100)),
            candle(dec!(11), dec!(50)),
            candle(dec!(10), dec!(30)),
        ];
        let result = Obv::series(&series);
        assert_eq!(result[0], dec!(0));
        assert_eq!(result[1], dec!(50));
        assert_eq!(result[2], dec!(20));
    }

    #[test]
    fn test_obv_flat_close_no_change() {
        let series = vec![candle(dec!(10), dec!(100)), candle(dec!(10), dec!(50))];
        let result = Obv::series(&series);
        assert_eq!(result[1], dec!(0));
    }
}
