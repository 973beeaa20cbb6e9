//! Core trading types: positions and trades produced by the market
//! simulator (§3 data model).

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionSide {
    Long,
    Short,
}

impl fmt::Display for PositionSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PositionSide::Long => write!(f, "LONG"),
            PositionSide::Short => write!(f, "SHORT"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
    TrailingStop,
    Signal,
    Manual,
    Timeout,
}

/// Trailing-stop state machine: inactive until profit since entry reaches
/// `activation_pct`, then `current_stop` only moves in the favourable
/// direction (§4.4).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TrailingStopState {
    pub activated: bool,
    pub peak_price: Decimal,
    pub current_stop: Decimal,
    pub activation_pct: Decimal,
    pub trail_pct: Decimal,
}

impl TrailingStopState {
    pub fn new(entry_price: Decimal, activation_pct: Decimal, trail_pct: Decimal) -> Self {
        Self {
            activated: false,
            peak_price: entry_price,
            current_stop: Decimal::ZERO,
            activation_pct,
            trail_pct,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub id: usize,
    pub symbol: String,
    pub side: PositionSide,
    pub entry_price: Decimal,
    pub size: Decimal,
    pub entry_time: i64,
    pub stop_loss: Option<Decimal>,
    pub take_profit: Option<Decimal>,
    pub trailing_stop: Option<TrailingStopState>,
    pub unrealized_pnl: Decimal,
}

impl Position {
    /// Marks the position's unrealized P&L to `close_price` (§4.4
    /// `processCandle`'s "mark-to-close" step when no exit triggers).
    pub fn mark_to_market(&mut self, close_price: Decimal) {
        self.unrealized_pnl = match self.side {
            PositionSide::Long => (close_price - self.entry_price) * self.size,
            PositionSide::Short => (self.entry_price - close_price) * self.size,
        };
    }
}

/// A completed trade. `net_pnl` always equals `gross_pnl - commission`
/// (§3 invariant), enforced at construction rather than trusted from
/// callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub position_id: usize,
    pub symbol: String,
    pub side: PositionSide,
    pub entry_price: Decimal,
    pub exit_price: Decimal,
    pub entry_time: i64,
    pub exit_time: i64,
    pub size: Decimal,
    pub gross_pnl: Decimal,
    pub gross_pnl_percent: Decimal,
    pub commission: Decimal,
    pub net_pnl: Decimal,
    pub exit_reason: ExitReason,
    pub holding_time_ms: i64,
}

impl Trade {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        position_id: usize,
        symbol: String,
        side: PositionSide,
        entry_price: Decimal,
        exit_price: Decimal,
        entry_time: i64,
        exit_time: i64,
        size: Decimal,
        gross_pnl: Decimal,
        commission: Decimal,
        exit_reason: ExitReason,
    ) -> Self {
        let gross_pnl_percent = match side {
            PositionSide::Long => (exit_price / entry_price - Decimal::ONE) * Decimal::from(100),
            PositionSide::Short => (Decimal::ONE - exit_price / entry_price) * Decimal::from(100),
        };
        Self {
            position_id,
            symbol,
            side,
            entry_price,
            exit_price,
            entry_time,
            exit_time,
            size,
            gross_pnl,
            gross_pnl_percent,
            commission,
            net_pnl: gross_pnl - commission,
            exit_reason,
            holding_time_ms: exit_time - entry_time,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_trade_net_equals_gross_minus_commission() {
        let trade = Trade::new(
            1,
            "BTC/USD".to_string(),
            PositionSide::Long,
            dec!(100),
            dec!(110),
            0,
            1000,
            dec!(1),
            dec!(10),
            dec!(1),
            ExitReason::TakeProfit,
        );
        assert_eq!(trade.net_pnl, dec!(9));
    }

    #[test]
    fn test_short_gross_percent_sign() {
        let trade = Trade::new(
            1,
            "BTC/USD".to_string(),
            PositionSide::Short,
            dec!(100),
            dec!(90),
            0,
            1000,
            dec!(1),
            dec!(10),
            dec!(0),
            ExitReason::TakeProfit,
        );
        assert!(trade.gross_pnl_percent > Decimal::ZERO);
    }

    #[test]
    fn test_mark_to_market_long() {
        let mut position = Position {
            id: 1,
            symbol: "BTC/USD".to_string(),
            side: PositionSide::Long,
            entry_price: dec!(100),
            size: dec!(2),
            entry_time: 0,
            stop_loss: None,
            take_profit: None,
            trailing_stop: None,
            unrealized_pnl: Decimal::ZERO,
        };
        position.mark_to_market(dec!(110));
        assert_eq!(position.unrealized_pnl, dec!(20));
    }
}
