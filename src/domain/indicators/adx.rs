use super::{Indicator, IndicatorParams, IndicatorSeries, IndicatorValue};
use crate::domain::errors::IndicatorError;
use crate::domain::market::candle::Candle;
use rust_decimal::Decimal;
use std::collections::BTreeMap;

/// Average Directional Index: Wilder-smoothed +DM/-DM/TR combined into
/// +DI/-DI, DX, and a Wilder-smoothed ADX. Warmup = 2n. Multi-line,
/// primary "adx".
pub struct Adx;

impl Adx {
    fn true_range(c: &Candle, prev_close: Decimal) -> Decimal {
        let a = c.high - c.low;
        let b = (c.high - prev_close).abs();
        let d = (c.low - prev_close).abs();
        a.max(b).max(d)
    }

    fn directional_moves(candles: &[Candle], i: usize) -> (Decimal, Decimal) {
        let up_move = candles[i].high - candles[i - 1].high;
        let down_move = candles[i - 1].low - candles[i].low;
        let plus_dm = if up_move > down_move && up_move > Decimal::ZERO {
            up_move
        } else {
            Decimal::ZERO
        };
        let minus_dm = if down_move > up_move && down_move > Decimal::ZERO {
            down_move
        } else {
            Decimal::ZERO
        };
        (plus_dm, minus_dm)
    }

    pub fn series(
        candles: &[Candle],
        n: usize,
    ) -> Vec<Option<(Decimal, Decimal, Decimal)>> {
        let len = candles.len();
        let mut out = vec![None; len];
        if len < 2 * n + 1 {
            return out;
        }
        let n_dec = Decimal::from(n);

        let mut tr_sum = Decimal::ZERO;
        let mut plus_dm_sum = Decimal::ZERO;
        let mut minus_dm_sum = Decimal::ZERO;
        for i in 1..=n {
            tr_sum += Self::true_range(&candles[i], candles[i - 1].close);
            let (plus, minus) = Self::directional_moves(candles, i);
            plus_dm_sum += plus;
            minus_dm_sum += minus;
        }

        let mut smoothed_tr = tr_sum;
        let mut smoothed_plus_dm = plus_dm_sum;
        let mut smoothed_minus_dm = minus_dm_sum;

        let mut dx_values: Vec<Decimal> = Vec::with_capacity(len);
        let di_from = |plus_dm: Decimal, minus_dm: Decimal, tr: Decimal| -> (Decimal, Decimal) {
            if tr == Decimal::ZERO {
                (Decimal::ZERO, Decimal::ZERO)
            } else {
                (
                    Decimal::from(100) * plus_dm / tr,
                    Decimal::from(100) * minus_dm / tr,
                )
            }
        };
        let (plus_di, minus_di) = di_from(smoothed_plus_dm, smoothed_minus_dm, smoothed_tr);
        let dx = Self::dx(plus_di, minus_di);
        dx_values.push(dx);
        let mut di_at_index: Vec<(Decimal, Decimal)> = vec![(plus_di, minus_di)];

        for i in (n + 1)..len {
            let tr = Self::true_range(&candles[i], candles[i - 1].close);
            let (plus, minus) = Self::directional_moves(candles, i);
            smoothed_tr = smoothed_tr - smoothed_tr / n_dec + tr;
            smoothed_plus_dm = smoothed_plus_dm - smoothed_plus_dm / n_dec + plus;
            smoothed_minus_dm = smoothed_minus_dm - smoothed_minus_dm / n_dec + minus;

            let (plus_di, minus_di) = di_from(smoothed_plus_dm, smoothed_minus_dm, smoothed_tr);
            di_at_index.push((plus_di, minus_di));
            dx_values.push(Self::dx(plus_di, minus_di));
        }

        if dx_values.len() < n {
            return out;
        }
        let mut adx = dx_values[0..n].iter().sum::<Decimal>() / n_dec;
        let first_adx_offset = n - 1;
        let first_adx_index = n + first_adx_offset;
        let (pdi, mdi) = di_at_index[first_adx_offset];
        out[first_adx_index] = Some((pdi, mdi, adx));

        for (offset, dx) in dx_values.iter().enumerate().skip(n) {
            adx = (adx * (n_dec - Decimal::ONE) + dx) / n_dec;
            let (pdi, mdi) = di_at_index[offset];
            out[n + offset] = Some((pdi, mdi, adx));
        }
        out
    }

    fn dx(plus_di: Decimal, minus_di: Decimal) -> Decimal {
        let sum = plus_di + minus_di;
        if sum == Decimal::ZERO {
            Decimal::ZERO
        } else {
            Decimal::from(100) * (plus_di - minus_di).abs() / sum
        }
    }
}

impl Indicator for Adx {
    fn name(&self) -> &'static str {
        "ADX"
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
        2 * params.get_usize("period", 14)
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
            .map(|v| {
                v.map(|(pdi, mdi, adx)| {
                    let mut lines = BTreeMap::new();
                    lines.insert("plus_di", pdi);
                    lines.insert("minus_di", mdi);
                    lines.insert("adx", adx);
                    IndicatorValue::Lines(lines)
                })
            })
            .collect())
    }

    fn primary_line(&self) -> Option<&'static str> {
        Some("adx")
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
    fn test_adx_warmup_2n() {
        let series: Vec<Candle> = (0..10)
            .map(|i| candle(dec!(10) + Decimal::from(i), dec!(8), dec!(9) + Decimal::from(i)))
            .collect();
        let params = IndicatorParams::new().with_int("period", 14);
        let result = Adx.calculate(&series, &params).unwrap();
        assert!(result.iter().all(|v| v.is_none()));
    }

    #[test]
    fn test_adx_uptrend_produces_positive_plus_di() {
        let series: Vec<Candle> = (0..40)
            .map(|i| {
                let base = Decimal::from(i);
                candle(dec!(10) + base, dec!(8) + base, dec!(9) + base)
            })
            .collect();
        let result = Adx::series(&series, 5);
        let last = result.last().unwrap().unwrap();
        assert!(last.0 > last.1);
    }
}
