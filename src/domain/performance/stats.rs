use rust_decimal::Decimal;

/// Shared statistics utilities for financial calculations.
pub struct Stats;

impl Stats {
    /// Calculate Sharpe Ratio using Decimal.
    ///
    /// `returns`: per-equity-point returns. `periods_per_year`, when given,
    /// annualizes by its square root (§4.6 annualizes by ·√365 for
    /// per-equity-point series).
    pub fn sharpe_ratio(returns: &[Decimal], periods_per_year: Option<u32>) -> Decimal {
        if returns.len() < 2 {
            return Decimal::ZERO;
        }

        let n = Decimal::from(returns.len());
        let sum: Decimal = returns.iter().sum();
        let mean_return = sum / n;

        // Population variance (÷n), matching the mean/stddev convention used
        // throughout the rest of the indicator library (e.g. bollinger.rs).
        let mut variance_sum = Decimal::ZERO;
        for r in returns {
            let diff = r - mean_return;
            variance_sum += diff * diff;
        }

        let variance = variance_sum / n;

        let std_dev_f64 = rust_decimal::prelude::ToPrimitive::to_f64(&variance)
            .unwrap_or(0.0)
            .sqrt();
        let std_dev = Decimal::from_f64_retain(std_dev_f64).unwrap_or(Decimal::ZERO);

        if std_dev > rust_decimal_macros::dec!(1e-9) {
            let ratio = mean_return / std_dev;
            if let Some(periods) = periods_per_year {
                let sqrt_periods =
                    Decimal::from_f64_retain((periods as f64).sqrt()).unwrap_or(Decimal::ONE);
                ratio * sqrt_periods
            } else {
                ratio
            }
        } else {
            Decimal::ZERO
        }
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_sharpe_ratio() {
        let returns = vec![dec!(0.01), dec!(0.02), dec!(0.01), dec!(0.02)];
        let sharpe = Stats::sharpe_ratio(&returns, None);
        assert!(sharpe > Decimal::ZERO);

        let returns_zero = vec![dec!(0.01), dec!(0.01), dec!(0.01)];
        assert_eq!(Stats::sharpe_ratio(&returns_zero, None), Decimal::ZERO);
    }

    #[test]
    fn test_sharpe_ratio_annualized_by_365() {
        let returns = vec![dec!(0.01), dec!(0.02), dec!(0.01), dec!(0.02)];
        let daily = Stats::sharpe_ratio(&returns, None);
        let annualized = Stats::sharpe_ratio(&returns, Some(365));
        assert!(annualized > daily);
    }
}
