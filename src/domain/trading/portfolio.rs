use super::types::{Position, Trade};
use rust_decimal::Decimal;
use serde::Serialize;

/// Capital ledger and open-position book for one backtest run (§3).
/// `equity = current_capital + Σ unrealized P&L`; `available_capital ≥ 0`
/// is enforced by the simulator rejecting oversized entries before they
/// reach this struct.
#[derive(Debug, Clone, Serialize)]
pub struct Portfolio {
    pub initial_capital: Decimal,
    pub current_capital: Decimal,
    pub available_capital: Decimal,
    pub open_positions: Vec<Position>,
    pub cumulative_pnl: Decimal,
    pub cumulative_commission: Decimal,
}

impl Portfolio {
    pub fn new(initial_capital: Decimal) -> Self {
        Self {
            initial_capital,
            current_capital: initial_capital,
            available_capital: initial_capital,
            open_positions: Vec::new(),
            cumulative_pnl: Decimal::ZERO,
            cumulative_commission: Decimal::ZERO,
        }
    }

    pub fn equity(&self) -> Decimal {
        self.current_capital
            + self
                .open_positions
                .iter()
                .map(|p| p.unrealized_pnl)
                .sum::<Decimal>()
    }

    pub fn has_open_position(&self, symbol: &str) -> bool {
        self.open_positions.iter().any(|p| p.symbol == symbol)
    }

    pub fn open_position(&mut self, symbol: &str) -> Option<&Position> {
        self.open_positions.iter().find(|p| p.symbol == symbol)
    }

    pub fn open_position_mut(&mut self, symbol: &str) -> Option<&mut Position> {
        self.open_positions.iter_mut().find(|p| p.symbol == symbol)
    }

    /// Deducts `notional` from available capital and charges `commission`
    /// against the cumulative accumulator (§4.4 `openPosition`).
    pub fn record_open(&mut self, position: Position, notional: Decimal, commission: Decimal) {
        self.available_capital -= notional;
        self.cumulative_commission += commission;
        self.open_positions.push(position);
    }

    /// Removes the closed position, returns its notional to available
    /// capital, applies net P&L to current capital, and appends the trade
    /// (§4.4 `closePosition`).
    pub fn record_close(&mut self, position_id: usize, exit_notional: Decimal, trade: Trade) {
        self.open_positions.retain(|p| p.id != position_id);
        self.available_capital += exit_notional;
        self.current_capital += trade.net_pnl;
        self.cumulative_pnl += trade.net_pnl;
        self.cumulative_commission += trade.commission;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::trading::types::{ExitReason, PositionSide};
    use rust_decimal_macros::dec;

    fn position(id: usize, symbol: &str) -> Position {
        Position {
            id,
            symbol: symbol.to_string(),
            side: PositionSide::Long,
            entry_price: dec!(100),
            size: dec!(1),
            entry_time: 0,
            stop_loss: None,
            take_profit: None,
            trailing_stop: None,
            unrealized_pnl: Decimal::ZERO,
        }
    }

    #[test]
    fn test_equity_includes_unrealized_pnl() {
        let mut portfolio = Portfolio::new(dec!(10000));
        let mut pos = position(1, "BTC/USD");
        pos.unrealized_pnl = dec!(50);
        portfolio.open_positions.push(pos);
        assert_eq!(portfolio.equity(), dec!(10050));
    }

    #[test]
    fn test_record_open_deducts_available_capital() {
        let mut portfolio = Portfolio::new(dec!(10000));
        portfolio.record_open(position(1, "BTC/USD"), dec!(1000), dec!(1));
        assert_eq!(portfolio.available_capital, dec!(9000));
        assert_eq!(portfolio.cumulative_commission, dec!(1));
    }

    #[test]
    fn test_record_close_updates_capital_and_removes_position() {
        let mut portfolio = Portfolio::new(dec!(10000));
        portfolio.record_open(position(1, "BTC/USD"), dec!(1000), dec!(1));
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
        portfolio.record_close(1, dec!(1100), trade);
        assert!(portfolio.open_positions.is_empty());
        assert_eq!(portfolio.available_capital, dec!(10100));
        assert_eq!(portfolio.current_capital, dec!(10009));
    }
}
