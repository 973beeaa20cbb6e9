use super::ema::Ema;
use super::{Indicator, IndicatorParams, IndicatorSeries, IndicatorValue, PriceSource};
use crate::domain::errors::IndicatorError;
use crate::domain::market::candle::Candle;
use rust_decimal::Decimal;
use std::collections::BTreeMap;

/// MACD: EMA(fast) - EMA(slow), a signal EMA(signal) of that line, and their
/// difference as a histogram. Multi-line, primary line "macd".
pub struct Macd;

impl Macd {
    pub fn series(
        values: &[Decimal],
        fast: usize,
        slow: usize,
        signal: usize,
    ) -> Vec<Option<(Decimal, Decimal, Decimal)>> {
        let ema_fast = Ema::series(values, fast);
        let ema_slow = Ema::series(values, slow);

        let macd_line: Vec<Option<Decimal>> = ema_fast
            .iter()
            .zip(ema_slow.iter())
            .map(|(f, s)| match (f, s) {
                (Some(f), Some(s)) => Some(*f - *s),
                _ => None,
            })
            .collect();

        let first_valid = macd_line.iter().position(|v| v.is_some());
        let Some(first_valid) = first_valid else {
            return vec![None; values.len()];
        };
        let tail: Vec<Decimal> = macd_line[first_valid..]
            .iter()
            .map(|v| v.unwrap())
            .collect();
        let signal_tail = Ema::series(&tail, signal);

        let mut out = vec![None; values.len()];
        for (i, sig) in signal_tail.into_iter().enumerate() {
            let idx = first_valid + i;
            if let Some(sig) = sig {
                let macd = macd_line[idx].unwrap();
                out[idx] = Some((macd, sig, macd - sig));
            }
        }
        out
    }
}

impl Indicator for Macd {
    fn name(&self) -> &'static str {
        "MACD"
    }

    fn validate(&self, params: &IndicatorParams) -> Result<(), IndicatorError> {
        let fast = params.get_usize("fast_period", 12);
        let slow = params.get_usize("slow_period", 26);
        if fast == 0 || slow == 0 || fast >= slow {
            return Err(IndicatorError::InvalidParams {
                indicator: self.name().to_string(),
                reason: "fast_period must be > 0 and less than slow_period".to_string(),
            });
        }
        if params.get_usize("signal_period", 9) == 0 {
            return Err(IndicatorError::InvalidParams {
                indicator: self.name().to_string(),
                reason: "signal_period must be > 0".to_string(),
            });
        }
        Ok(())
    }

    fn required_warmup(&self, params: &IndicatorParams) -> usize {
        let slow = params.get_usize("slow_period", 26);
        let signal = params.get_usize("signal_period", 9);
        slow + signal - 1
    }

    fn calculate(
        &self,
        series: &[Candle],
        params: &IndicatorParams,
    ) -> Result<IndicatorSeries, IndicatorError> {
        self.validate(params)?;
        let fast = params.get_usize("fast_period", 12);
        let slow = params.get_usize("slow_period", 26);
        let signal = params.get_usize("signal_period", 9);
        let source = params.get_source(PriceSource::Close);
        let values: Vec<Decimal> = series.iter().map(|c| source.extract(c)).collect();

        Ok(Self::series(&values, fast, slow, signal)
            .into_iter()
            .map(|v| {
                v.map(|(macd, sig, hist)| {
                    let mut lines = BTreeMap::new();
                    lines.insert("macd", macd);
                    lines.insert("signal", sig);
                    lines.insert("histogram", hist);
                    IndicatorValue::Lines(lines)
                })
            })
            .collect())
    }

    fn primary_line(&self) -> Option<&'static str> {
        Some("macd")
    }
}
