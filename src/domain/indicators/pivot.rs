use super::{Indicator, IndicatorParams, IndicatorSeries, IndicatorValue};
use crate::domain::errors::IndicatorError;
use crate::domain::market::candle::Candle;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::BTreeMap;

/// Pivot point variant, selected via the `variant` string parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PivotVariant {
    Traditional,
    Fibonacci,
    Camarilla,
    Woodie,
    Demark,
}

impl PivotVariant {
    fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "fibonacci" => Self::Fibonacci,
            "camarilla" => Self::Camarilla,
            "woodie" => Self::Woodie,
            "demark" => Self::Demark,
            _ => Self::Traditional,
        }
    }
}

/// Pivot points computed from the previous candle's H/L/C/O. Five variants.
/// Multi-line, primary "PP".
pub struct PivotPoints;

impl PivotPoints {
    pub fn compute(prev: &Candle, variant: PivotVariant) -> BTreeMap<&'static str, Decimal> {
        let (h, l, c, o) = (prev.high, prev.low, prev.close, prev.open);
        let range = h - l;
        let mut lines = BTreeMap::new();

        match variant {
            PivotVariant::Traditional => {
                let pp = (h + l + c) / dec!(3);
                lines.insert("PP", pp);
                lines.insert("R1", dec!(2) * pp - l);
                lines.insert("S1", dec!(2) * pp - h);
                lines.insert("R2", pp + range);
                lines.insert("S2", pp - range);
                lines.insert("R3", h + dec!(2) * (pp - l));
                lines.insert("S3", l - dec!(2) * (h - pp));
            }
            PivotVariant::Fibonacci => {
                let pp = (h + l + c) / dec!(3);
                lines.insert("PP", pp);
                lines.insert("R1", pp + dec!(0.382) * range);
                lines.insert("S1", pp - dec!(0.382) * range);
                lines.insert("R2", pp + dec!(0.618) * range);
                lines.insert("S2", pp - dec!(0.618) * range);
                lines.insert("R3", pp + range);
                lines.insert("S3", pp - range);
            }
            PivotVariant::Camarilla => {
                let pp = (h + l + c) / dec!(3);
                lines.insert("PP", pp);
                lines.insert("R1", c + dec!(1.1) / dec!(12) * range);
                lines.insert("R2", c + dec!(1.1) / dec!(6) * range);
                lines.insert("R3", c + dec!(1.1) / dec!(4) * range);
                lines.insert("R4", c + dec!(1.1) / dec!(2) * range);
                lines.insert("S1", c - dec!(1.1) / dec!(12) * range);
                lines.insert("S2", c - dec!(1.1) / dec!(6) * range);
                lines.insert("S3", c - dec!(1.1) / dec!(4) * range);
                lines.insert("S4", c - dec!(1.1) / dec!(2) * range);
            }
            PivotVariant::Woodie => {
                let pp = (h + l + dec!(2) * c) / dec!(4);
                lines.insert("PP", pp);
                lines.insert("R1", dec!(2) * pp - l);
                lines.insert("S1", dec!(2) * pp - h);
                lines.insert("R2", pp + range);
                lines.insert("S2", pp - range);
            }
            PivotVariant::Demark => {
                let x = if c < o {
                    h + dec!(2) * l + c
                } else if c > o {
                    dec!(2) * h + l + c
                } else {
                    h + l + dec!(2) * c
                };
                let pp = x / dec!(4);
                lines.insert("PP", pp);
                lines.insert("R1", x / dec!(2) - l);
                lines.insert("S1", x / dec!(2) - h);
            }
        }
        lines
    }
}

impl Indicator for PivotPoints {
    fn name(&self) -> &'static str {
        "PIVOT"
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
        let variant_name = match params.0.get("variant") {
            Some(super::ParamValue::Str(s)) => s.clone(),
            _ => "traditional".to_string(),
        };
        let variant = PivotVariant::from_str(&variant_name);

        let mut out = vec![None; series.len()];
        for i in 1..series.len() {
            let lines = Self::compute(&series[i - 1], variant);
            out[i] = Some(IndicatorValue::Lines(lines));
        }
        Ok(out)
    }

    fn primary_line(&self) -> Option<&'static str> {
        Some("PP")
    }
}
