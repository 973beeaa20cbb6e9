//! Deterministic market simulator (§4.4): position lifecycle, stop-loss /
//! take-profit / trailing-stop evaluation, risk-based sizing, commission
//! and slippage.

use crate::config::BacktestConfig;
use crate::domain::market::candle::Candle;
use crate::domain::strategy::schema::{StopLossConfig, StopLossKind, TakeProfitConfig, TrailingStopConfig};
use crate::domain::trading::fee_model::FeeModel;
use crate::domain::trading::portfolio::Portfolio;
use crate::domain::trading::types::{ExitReason, Position, PositionSide, Trade, TrailingStopState};
use rust_decimal::Decimal;
use std::sync::Arc;

/// The signal that asks the simulator to open a position (mirrors
/// [`crate::application::executor::Signal`] without the executor's
/// exit-vs-entry bookkeeping — the simulator only needs a side).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntrySide {
    Long,
    Short,
}

/// Owns the portfolio and trade log for one backtest run (§4.4).
pub struct MarketSimulator {
    portfolio: Portfolio,
    trades: Vec<Trade>,
    fee_model: Arc<dyn FeeModel>,
    slippage_percent: Decimal,
    max_open_positions: usize,
    next_position_id: usize,
}

impl MarketSimulator {
    pub fn new(config: &BacktestConfig, fee_model: Arc<dyn FeeModel>, max_open_positions: usize) -> Self {
        Self {
            portfolio: Portfolio::new(config.initial_capital),
            trades: Vec::new(),
            fee_model,
            slippage_percent: config.slippage_percent,
            max_open_positions,
            next_position_id: 1,
        }
    }

    fn slippage(&self, price: Decimal, buying: bool) -> Decimal {
        let adj = price * self.slippage_percent / Decimal::from(100);
        if buying { price + adj } else { price - adj }
    }

    /// §4.4 `openPosition`: sizes by risk percent, rejects if it would
    /// exceed `maxOpenPositions` or available capital, and charges entry
    /// commission. Returns `None` rather than an error on rejection (§7
    /// "tolerate, don't abort").
    #[allow(clippy::too_many_arguments)]
    pub fn open_position(
        &mut self,
        side: EntrySide,
        candle: &Candle,
        symbol: &str,
        stop_loss: Option<StopLossConfig>,
        take_profit: Option<TakeProfitConfig>,
        trailing_stop: Option<TrailingStopConfig>,
        risk_percent: Decimal,
        atr: Option<Decimal>,
    ) -> Option<Position> {
        if self.portfolio.open_positions.len() >= self.max_open_positions {
            return None;
        }
        if self.portfolio.has_open_position(symbol) {
            return None;
        }

        let position_side = match side {
            EntrySide::Long => PositionSide::Long,
            EntrySide::Short => PositionSide::Short,
        };
        let entry_price = self.slippage(candle.close, position_side == PositionSide::Long);

        let sl = stop_loss.and_then(|cfg| {
            let distance = match cfg.kind {
                StopLossKind::FixedPercent => entry_price * cfg.value / Decimal::from(100),
                StopLossKind::FixedPrice => return Some(cfg.value),
                StopLossKind::AtrMultiple => atr? * cfg.value,
            };
            Some(match position_side {
                PositionSide::Long => entry_price - distance,
                PositionSide::Short => entry_price + distance,
            })
        });

        let tp = take_profit.map(|cfg| match cfg.kind {
            StopLossKind::FixedPrice => cfg.value,
            _ => {
                let distance = match cfg.risk_reward {
                    Some(rr) => {
                        let risk_per_unit = sl.map(|s| (entry_price - s).abs()).unwrap_or(entry_price * Decimal::new(2, 2));
                        rr * risk_per_unit
                    }
                    None => match cfg.kind {
                        StopLossKind::FixedPercent => entry_price * cfg.value / Decimal::from(100),
                        StopLossKind::AtrMultiple => atr.unwrap_or(Decimal::ZERO) * cfg.value,
                        StopLossKind::FixedPrice => unreachable!(),
                    },
                };
                match position_side {
                    PositionSide::Long => entry_price + distance,
                    PositionSide::Short => entry_price - distance,
                }
            }
        });

        let risk_per_unit = sl
            .map(|s| (entry_price - s).abs())
            .filter(|d| *d > Decimal::ZERO)
            .unwrap_or(entry_price * Decimal::new(2, 2));
        if risk_per_unit <= Decimal::ZERO {
            return None;
        }

        let size = (self.portfolio.current_capital * risk_percent / Decimal::from(100)) / risk_per_unit;
        if size <= Decimal::ZERO {
            return None;
        }

        let notional = size * entry_price;
        if notional > self.portfolio.available_capital {
            return None;
        }

        let commission = self.fee_model.calculate_cost(notional, position_side).commission;

        let position = Position {
            id: self.next_position_id,
            symbol: symbol.to_string(),
            side: position_side,
            entry_price,
            size,
            entry_time: candle.timestamp,
            stop_loss: sl,
            take_profit: tp,
            trailing_stop: trailing_stop
                .map(|cfg| TrailingStopState::new(entry_price, cfg.activation_percent, cfg.trail_percent)),
            unrealized_pnl: Decimal::ZERO,
        };
        self.next_position_id += 1;

        self.portfolio.record_open(position.clone(), notional, commission);
        Some(position)
    }

    /// §4.4 `processCandle`: checks exits in priority stop_loss →
    /// trailing_stop → take_profit, updates trailing-stop state and marks
    /// to market otherwise.
    pub fn process_candle(&mut self, candle: &Candle, symbol: &str) -> Vec<Trade> {
        let Some(position) = self.portfolio.open_position_mut(symbol) else {
            return Vec::new();
        };

        Self::advance_trailing_stop(position, candle);

        let exit = match position.side {
            PositionSide::Long => {
                if position.stop_loss.is_some_and(|sl| candle.low <= sl) {
                    Some((position.stop_loss.unwrap(), ExitReason::StopLoss))
                } else if position
                    .trailing_stop
                    .is_some_and(|ts| ts.activated && candle.low <= ts.current_stop)
                {
                    Some((position.trailing_stop.unwrap().current_stop, ExitReason::TrailingStop))
                } else if position.take_profit.is_some_and(|tp| candle.high >= tp) {
                    Some((position.take_profit.unwrap(), ExitReason::TakeProfit))
                } else {
                    None
                }
            }
            PositionSide::Short => {
                if position.stop_loss.is_some_and(|sl| candle.high >= sl) {
                    Some((position.stop_loss.unwrap(), ExitReason::StopLoss))
                } else if position
                    .trailing_stop
                    .is_some_and(|ts| ts.activated && candle.high >= ts.current_stop)
                {
                    Some((position.trailing_stop.unwrap().current_stop, ExitReason::TrailingStop))
                } else if position.take_profit.is_some_and(|tp| candle.low <= tp) {
                    Some((position.take_profit.unwrap(), ExitReason::TakeProfit))
                } else {
                    None
                }
            }
        };

        if let Some((price, reason)) = exit {
            let position = self.portfolio.open_positions.iter().find(|p| p.symbol == symbol).unwrap().clone();
            let trade = self.close_position(&position, price, candle.timestamp, reason);
            vec![trade]
        } else {
            position.mark_to_market(candle.close);
            Vec::new()
        }
    }

    /// Trailing-stop state machine (§4.4): activates once profit since
    /// entry reaches `activationPct`, then only ever moves favourably.
    fn advance_trailing_stop(position: &mut Position, candle: &Candle) {
        let Some(mut trailing) = position.trailing_stop else {
            return;
        };

        match position.side {
            PositionSide::Long => {
                trailing.peak_price = trailing.peak_price.max(candle.high);
                let profit_pct = (trailing.peak_price / position.entry_price - Decimal::ONE) * Decimal::from(100);
                if !trailing.activated && profit_pct >= trailing.activation_pct {
                    trailing.activated = true;
                    trailing.current_stop = position.entry_price;
                }
                if trailing.activated {
                    let candidate = trailing.peak_price * (Decimal::ONE - trailing.trail_pct / Decimal::from(100));
                    trailing.current_stop = trailing.current_stop.max(candidate).max(position.entry_price);
                }
            }
            PositionSide::Short => {
                trailing.peak_price = trailing.peak_price.min(candle.low);
                let profit_pct = (Decimal::ONE - trailing.peak_price / position.entry_price) * Decimal::from(100);
                if !trailing.activated && profit_pct >= trailing.activation_pct {
                    trailing.activated = true;
                    trailing.current_stop = position.entry_price;
                }
                if trailing.activated {
                    let candidate = trailing.peak_price * (Decimal::ONE + trailing.trail_pct / Decimal::from(100));
                    trailing.current_stop = trailing.current_stop.min(candidate).min(position.entry_price);
                }
            }
        }
        position.trailing_stop = Some(trailing);
    }

    /// §4.4 `closePosition`: applies exit slippage, computes gross/net P&L,
    /// and folds the result back into the portfolio.
    pub fn close_position(&mut self, position: &Position, price: Decimal, time: i64, reason: ExitReason) -> Trade {
        let closing_buy = position.side == PositionSide::Short;
        let exit_price = self.slippage(price, closing_buy);
        let exit_notional = position.size * exit_price;

        let gross_pnl = match position.side {
            PositionSide::Long => (exit_price - position.entry_price) * position.size,
            PositionSide::Short => (position.entry_price - exit_price) * position.size,
        };
        let commission = self.fee_model.calculate_cost(exit_notional, position.side).commission;

        let trade = Trade::new(
            position.id,
            position.symbol.clone(),
            position.side,
            position.entry_price,
            exit_price,
            position.entry_time,
            time,
            position.size,
            gross_pnl,
            commission,
            reason,
        );

        self.portfolio.record_close(position.id, exit_notional, trade.clone());
        self.trades.push(trade.clone());
        trade
    }

    /// Force-closes every open position at `price`/`time` (§4.5 step 7,
    /// §5 cancellation), used at the end of a run or on cancel.
    pub fn close_all(&mut self, price: Decimal, time: i64, reason: ExitReason) -> Vec<Trade> {
        let positions: Vec<Position> = self.portfolio.open_positions.clone();
        positions
            .iter()
            .map(|p| self.close_position(p, price, time, reason))
            .collect()
    }

    pub fn open_position_for(&self, symbol: &str) -> Option<&Position> {
        self.portfolio.open_positions.iter().find(|p| p.symbol == symbol)
    }

    pub fn has_open_position(&self, symbol: &str) -> bool {
        self.portfolio.has_open_position(symbol)
    }

    pub fn trades(&self) -> &[Trade] {
        &self.trades
    }

    pub fn portfolio(&self) -> &Portfolio {
        &self.portfolio
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::trading::fee_model::PercentFeeModel;
    use rust_decimal_macros::dec;

    fn config() -> BacktestConfig {
        BacktestConfig {
            start_date: 0,
            end_date: 1_000_000,
            initial_capital: dec!(10000),
            currency: "USD".to_string(),
            commission_percent: dec!(0.1),
            slippage_percent: dec!(0),
            fill_model: crate::config::FillModel::Realistic,
            data_source: crate::config::DataSource::Local,
            progress_interval: 100,
        }
    }

    fn candle(ts: i64, o: Decimal, h: Decimal, l: Decimal, c: Decimal) -> Candle {
        Candle::new(ts, o, h, l, c, dec!(100))
    }

    fn simulator() -> MarketSimulator {
        MarketSimulator::new(&config(), Arc::new(PercentFeeModel::new(dec!(0.1))), 1)
    }

    #[test]
    fn test_open_position_sizes_by_risk_percent() {
        let mut sim = simulator();
        let c = candle(0, dec!(100), dec!(100), dec!(100), dec!(100));
        let stop_loss = StopLossConfig { kind: StopLossKind::FixedPercent, value: dec!(2) };
        let position = sim
            .open_position(EntrySide::Long, &c, "BTC/USD", Some(stop_loss), None, None, dec!(1), None)
            .unwrap();
        assert!(position.stop_loss.unwrap() < position.entry_price);
        assert!(position.size > Decimal::ZERO);
    }

    #[test]
    fn test_max_open_positions_rejects_second_symbol() {
        let mut sim = simulator();
        let c = candle(0, dec!(100), dec!(100), dec!(100), dec!(100));
        sim.open_position(EntrySide::Long, &c, "BTC/USD", None, None, None, dec!(1), None).unwrap();
        let second = sim.open_position(EntrySide::Long, &c, "ETH/USD", None, None, None, dec!(1), None);
        assert!(second.is_none());
    }

    #[test]
    fn test_stop_loss_triggers_on_low() {
        let mut sim = simulator();
        let entry = candle(0, dec!(100), dec!(100), dec!(100), dec!(100));
        let stop_loss = StopLossConfig { kind: StopLossKind::FixedPercent, value: dec!(2) };
        sim.open_position(EntrySide::Long, &entry, "BTC/USD", Some(stop_loss), None, None, dec!(1), None).unwrap();

        let drop = candle(60_000, dec!(99), dec!(99), dec!(95), dec!(96));
        let trades = sim.process_candle(&drop, "BTC/USD");
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].exit_reason, ExitReason::StopLoss);
    }

    #[test]
    fn test_trailing_stop_never_moves_backward() {
        let mut sim = simulator();
        let entry = candle(0, dec!(100), dec!(100), dec!(100), dec!(100));
        let trailing = TrailingStopConfig { activation_percent: dec!(1), trail_percent: dec!(1) };
        sim.open_position(EntrySide::Long, &entry, "BTC/USD", None, None, Some(trailing), dec!(1), None).unwrap();

        sim.process_candle(&candle(60_000, dec!(100), dec!(105), dec!(100), dec!(105)), "BTC/USD");
        let stop_after_rise = sim.open_position_for("BTC/USD").unwrap().trailing_stop.unwrap().current_stop;

        sim.process_candle(&candle(120_000, dec!(105), dec!(106), dec!(102), dec!(103)), "BTC/USD");
        let stop_after_pullback = sim.open_position_for("BTC/USD").unwrap().trailing_stop.unwrap().current_stop;

        assert!(stop_after_pullback >= stop_after_rise);
    }

    #[test]
    fn test_close_all_force_closes_open_positions() {
        let mut sim = simulator();
        let entry = candle(0, dec!(100), dec!(100), dec!(100), dec!(100));
        sim.open_position(EntrySide::Long, &entry, "BTC/USD", None, None, None, dec!(1), None).unwrap();
        let trades = sim.close_all(dec!(110), 60_000, ExitReason::Manual);
        assert_eq!(trades.len(), 1);
        assert!(sim.portfolio().open_positions.is_empty());
    }
}
