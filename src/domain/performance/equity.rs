use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One point on the equity curve, appended once per processed primary
/// candle (§3). `drawdown_percent` is always in `[0, 100]`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EquityPoint {
    pub timestamp: i64,
    pub equity: Decimal,
    pub drawdown_abs: Decimal,
    pub drawdown_percent: Decimal,
    pub open_positions: usize,
}

impl EquityPoint {
    pub fn new(timestamp: i64, equity: Decimal, peak_equity: Decimal, open_positions: usize) -> Self {
        let drawdown_abs = (peak_equity - equity).max(Decimal::ZERO);
        let drawdown_percent = if peak_equity > Decimal::ZERO {
            (drawdown_abs / peak_equity * Decimal::from(100)).min(Decimal::from(100))
        } else {
            Decimal::ZERO
        };
        Self {
            timestamp,
            equity,
            drawdown_abs,
            drawdown_percent,
            open_positions,
        }
    }
}
