use crate::domain::trading::types::PositionSide;
use rust_decimal::Decimal;
use std::fmt::Debug;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TradeCost {
    pub commission: Decimal,
}

/// Charges commission on trade notional; slippage is applied separately by
/// the simulator as a price adjustment, not a fee (§4.4).
pub trait FeeModel: Debug + Send + Sync {
    fn calculate_cost(&self, notional: Decimal, side: PositionSide) -> TradeCost;

    fn description(&self) -> String;
}

/// Flat commission as a percentage of trade notional, the only model the
/// backtest engine's config surface exposes (§6.1's `commission_percent`).
#[derive(Debug, Clone, Copy)]
pub struct PercentFeeModel {
    pub commission_percent: Decimal,
}

impl PercentFeeModel {
    pub fn new(commission_percent: Decimal) -> Self {
        Self { commission_percent }
    }
}

impl FeeModel for PercentFeeModel {
    fn calculate_cost(&self, notional: Decimal, _side: PositionSide) -> TradeCost {
        TradeCost {
            commission: notional * self.commission_percent / Decimal::from(100),
        }
    }

    fn description(&self) -> String {
        format!("Percent Fee Model ({}%)", self.commission_percent)
    }
}
