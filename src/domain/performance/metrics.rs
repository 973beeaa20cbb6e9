use super::equity::EquityPoint;
use super::stats::Stats;
use crate::domain::trading::types::{PositionSide, Trade};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// Preserves infinity/undefined through serde_json, which rejects
/// `f64::INFINITY` outright (§4.6.1).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProfitFactor {
    Finite(Decimal),
    Infinite,
    Undefined,
}

impl Serialize for ProfitFactor {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            ProfitFactor::Finite(v) => v.serialize(serializer),
            ProfitFactor::Infinite => serializer.serialize_str("Infinity"),
            ProfitFactor::Undefined => serializer.serialize_str("Undefined"),
        }
    }
}

struct ProfitFactorVisitor;

impl<'de> Visitor<'de> for ProfitFactorVisitor {
    type Value = ProfitFactor;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a decimal number or \"Infinity\"/\"Undefined\"")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        match v {
            "Infinity" => Ok(ProfitFactor::Infinite),
            "Undefined" => Ok(ProfitFactor::Undefined),
            other => other
                .parse::<Decimal>()
                .map(ProfitFactor::Finite)
                .map_err(de::Error::custom),
        }
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
        Decimal::from_f64_retain(v)
            .map(ProfitFactor::Finite)
            .ok_or_else(|| de::Error::custom("invalid decimal"))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
        Ok(ProfitFactor::Finite(Decimal::from(v)))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
        Ok(ProfitFactor::Finite(Decimal::from(v)))
    }
}

impl<'de> Deserialize<'de> for ProfitFactor {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(ProfitFactorVisitor)
    }
}

/// Comprehensive performance metrics computed from a completed trade log
/// and equity curve (§4.6). Decimal carries money-denominated figures;
/// ratios and percentages are f64, matching the project's
/// Decimal-for-money/f64-for-continuous-stats split.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metrics {
    pub total_return_percent: f64,
    pub total_return_abs: Decimal,
    pub cagr_percent: f64,
    pub monthly_avg_return_percent: f64,

    pub max_drawdown_percent: f64,
    pub max_drawdown_abs: Decimal,
    pub max_drawdown_duration_days: f64,

    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    pub calmar_ratio: f64,

    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub win_rate_percent: f64,
    pub profit_factor: ProfitFactor,
    pub avg_win_percent: f64,
    pub avg_loss_percent: f64,
    pub avg_trade_percent: f64,
    pub largest_win: Decimal,
    pub largest_loss: Decimal,
    pub max_consecutive_wins: usize,
    pub max_consecutive_losses: usize,

    pub long_trades: usize,
    pub short_trades: usize,
    pub long_win_rate_percent: f64,
    pub short_win_rate_percent: f64,
    pub avg_holding_time_minutes: f64,
    pub time_in_market_percent: f64,

    pub initial_capital: Decimal,
    pub final_capital: Decimal,
    pub peak_capital: Decimal,
    pub total_commission: Decimal,
}

impl Metrics {
    pub fn calculate(trades: &[Trade], equity_curve: &[EquityPoint], initial_capital: Decimal) -> Self {
        if trades.is_empty() || equity_curve.is_empty() {
            return Self::zeroed(initial_capital);
        }

        let final_equity = equity_curve.last().unwrap().equity;
        let peak_capital = equity_curve
            .iter()
            .map(|p| p.equity)
            .fold(initial_capital, Decimal::max);

        let total_return_percent = ((final_equity / initial_capital - Decimal::ONE)
            * Decimal::from(100))
        .to_f64()
        .unwrap_or(0.0);
        let total_return_abs = final_equity - initial_capital;

        let t0 = equity_curve.first().unwrap().timestamp;
        let t1 = equity_curve.last().unwrap().timestamp;
        let years = (t1 - t0) as f64 / (365.25 * 86_400_000.0);
        let cagr_percent = if years > 0.0 {
            let final_f = final_equity.to_f64().unwrap_or(0.0);
            let initial_f = initial_capital.to_f64().unwrap_or(1.0);
            if initial_f > 0.0 && final_f > 0.0 {
                ((final_f / initial_f).powf(1.0 / years) - 1.0) * 100.0
            } else {
                total_return_percent
            }
        } else {
            total_return_percent
        };

        let monthly_avg_return_percent = Self::monthly_avg_return(equity_curve);

        let (max_dd_pct, max_dd_abs, max_dd_duration_days) = Self::drawdown_stats(equity_curve);

        let returns: Vec<Decimal> = equity_curve
            .windows(2)
            .filter_map(|w| {
                if w[0].equity > Decimal::ZERO {
                    Some((w[1].equity - w[0].equity) / w[0].equity)
                } else {
                    None
                }
            })
            .collect();
        let sharpe_ratio = Stats::sharpe_ratio(&returns, Some(365)).to_f64().unwrap_or(0.0);
        let sortino_ratio = Self::sortino_ratio(&returns);
        let calmar_ratio = if max_dd_pct.abs() > f64::EPSILON {
            cagr_percent / max_dd_pct.abs()
        } else {
            0.0
        };

        let winners: Vec<&Trade> = trades.iter().filter(|t| t.net_pnl > Decimal::ZERO).collect();
        let losers: Vec<&Trade> = trades.iter().filter(|t| t.net_pnl < Decimal::ZERO).collect();
        let total_trades = trades.len();
        let win_rate_percent = winners.len() as f64 / total_trades as f64 * 100.0;

        let gross_profit: Decimal = winners.iter().map(|t| t.gross_pnl).sum();
        let gross_loss: Decimal = losers.iter().map(|t| t.gross_pnl).sum();
        let profit_factor = if gross_loss < Decimal::ZERO {
            ProfitFactor::Finite(gross_profit / gross_loss.abs())
        } else if gross_profit > Decimal::ZERO {
            ProfitFactor::Infinite
        } else {
            // No gross profit or loss present: 0 by convention, not undefined.
            ProfitFactor::Finite(Decimal::ZERO)
        };

        let avg_win_percent = Self::mean_percent(&winners);
        let avg_loss_percent = Self::mean_percent(&losers);
        let avg_trade_percent =
            trades.iter().map(|t| t.gross_pnl_percent).sum::<Decimal>().to_f64().unwrap_or(0.0)
                / total_trades as f64;

        let largest_win = winners
            .iter()
            .map(|t| t.net_pnl)
            .max()
            .unwrap_or(Decimal::ZERO);
        let largest_loss = losers
            .iter()
            .map(|t| t.net_pnl)
            .min()
            .unwrap_or(Decimal::ZERO);

        let (max_consecutive_wins, max_consecutive_losses) = Self::consecutive_streaks(trades);

        let long_trades_vec: Vec<&Trade> =
            trades.iter().filter(|t| t.side == PositionSide::Long).collect();
        let short_trades_vec: Vec<&Trade> =
            trades.iter().filter(|t| t.side == PositionSide::Short).collect();
        let long_win_rate_percent = Self::win_rate(&long_trades_vec);
        let short_win_rate_percent = Self::win_rate(&short_trades_vec);

        let avg_holding_time_minutes = trades.iter().map(|t| t.holding_time_ms).sum::<i64>() as f64
            / total_trades as f64
            / 60_000.0;
        let covered_ms = (t1 - t0).max(1) as f64;
        let time_in_market_percent =
            trades.iter().map(|t| t.holding_time_ms).sum::<i64>() as f64 / covered_ms * 100.0;

        let total_commission: Decimal = trades.iter().map(|t| t.commission).sum();

        Self {
            total_return_percent,
            total_return_abs,
            cagr_percent,
            monthly_avg_return_percent,
            max_drawdown_percent: max_dd_pct,
            max_drawdown_abs: max_dd_abs,
            max_drawdown_duration_days: max_dd_duration_days,
            sharpe_ratio,
            sortino_ratio,
            calmar_ratio,
            total_trades,
            winning_trades: winners.len(),
            losing_trades: losers.len(),
            win_rate_percent,
            profit_factor,
            avg_win_percent,
            avg_loss_percent,
            avg_trade_percent,
            largest_win,
            largest_loss,
            max_consecutive_wins,
            max_consecutive_losses,
            long_trades: long_trades_vec.len(),
            short_trades: short_trades_vec.len(),
            long_win_rate_percent,
            short_win_rate_percent,
            avg_holding_time_minutes,
            time_in_market_percent,
            initial_capital,
            final_capital: final_equity,
            peak_capital,
            total_commission,
        }
    }

    fn zeroed(initial_capital: Decimal) -> Self {
        Self {
            total_return_percent: 0.0,
            total_return_abs: Decimal::ZERO,
            cagr_percent: 0.0,
            monthly_avg_return_percent: 0.0,
            max_drawdown_percent: 0.0,
            max_drawdown_abs: Decimal::ZERO,
            max_drawdown_duration_days: 0.0,
            sharpe_ratio: 0.0,
            sortino_ratio: 0.0,
            calmar_ratio: 0.0,
            total_trades: 0,
            winning_trades: 0,
            losing_trades: 0,
            win_rate_percent: 0.0,
            profit_factor: ProfitFactor::Finite(Decimal::ZERO),
            avg_win_percent: 0.0,
            avg_loss_percent: 0.0,
            avg_trade_percent: 0.0,
            largest_win: Decimal::ZERO,
            largest_loss: Decimal::ZERO,
            max_consecutive_wins: 0,
            max_consecutive_losses: 0,
            long_trades: 0,
            short_trades: 0,
            long_win_rate_percent: 0.0,
            short_win_rate_percent: 0.0,
            avg_holding_time_minutes: 0.0,
            time_in_market_percent: 0.0,
            initial_capital,
            final_capital: initial_capital,
            peak_capital: initial_capital,
            total_commission: Decimal::ZERO,
        }
    }

    fn drawdown_stats(equity_curve: &[EquityPoint]) -> (f64, Decimal, f64) {
        let max_dd_pct = equity_curve
            .iter()
            .map(|p| p.drawdown_percent.to_f64().unwrap_or(0.0))
            .fold(0.0, f64::max);
        let max_dd_abs = equity_curve
            .iter()
            .map(|p| p.drawdown_abs)
            .fold(Decimal::ZERO, Decimal::max);

        let mut longest_span_ms = 0i64;
        let mut span_start: Option<i64> = None;
        for point in equity_curve {
            if point.drawdown_percent > Decimal::ZERO {
                if span_start.is_none() {
                    span_start = Some(point.timestamp);
                }
                let start = span_start.unwrap();
                longest_span_ms = longest_span_ms.max(point.timestamp - start);
            } else {
                span_start = None;
            }
        }
        (max_dd_pct, max_dd_abs, longest_span_ms as f64 / 86_400_000.0)
    }

    fn monthly_avg_return(equity_curve: &[EquityPoint]) -> f64 {
        const MONTH_MS: i64 = 30 * 86_400_000;
        let t0 = equity_curve.first().unwrap().timestamp;
        let mut bucket_end_equity: Vec<Decimal> = Vec::new();
        let mut current_bucket = 0i64;
        for point in equity_curve {
            let bucket = (point.timestamp - t0) / MONTH_MS;
            if bucket != current_bucket || bucket_end_equity.is_empty() {
                bucket_end_equity.push(point.equity);
                current_bucket = bucket;
            } else {
                *bucket_end_equity.last_mut().unwrap() = point.equity;
            }
        }
        if bucket_end_equity.len() < 2 {
            return 0.0;
        }
        let returns: Vec<f64> = bucket_end_equity
            .windows(2)
            .filter_map(|w| {
                if w[0] > Decimal::ZERO {
                    Some(((w[1] - w[0]) / w[0]).to_f64().unwrap_or(0.0))
                } else {
                    None
                }
            })
            .collect();
        if returns.is_empty() {
            0.0
        } else {
            returns.iter().sum::<f64>() / returns.len() as f64 * 100.0
        }
    }

    fn sortino_ratio(returns: &[Decimal]) -> f64 {
        if returns.is_empty() {
            return 0.0;
        }
        let returns_f: Vec<f64> = returns.iter().map(|r| r.to_f64().unwrap_or(0.0)).collect();
        let mean = returns_f.iter().sum::<f64>() / returns_f.len() as f64;
        let downside: Vec<f64> = returns_f.iter().filter(|r| **r < 0.0).copied().collect();
        if downside.is_empty() {
            return if mean > 0.0 { f64::INFINITY } else { 0.0 };
        }
        let downside_variance =
            downside.iter().map(|r| r.powi(2)).sum::<f64>() / downside.len() as f64;
        let downside_dev = downside_variance.sqrt();
        if downside_dev > 0.0 {
            mean * 365.0 / (downside_dev * 365.0_f64.sqrt())
        } else {
            0.0
        }
    }

    fn mean_percent(trades: &[&Trade]) -> f64 {
        if trades.is_empty() {
            return 0.0;
        }
        trades
            .iter()
            .map(|t| t.gross_pnl_percent.to_f64().unwrap_or(0.0))
            .sum::<f64>()
            / trades.len() as f64
    }

    fn win_rate(trades: &[&Trade]) -> f64 {
        if trades.is_empty() {
            return 0.0;
        }
        let wins = trades.iter().filter(|t| t.net_pnl > Decimal::ZERO).count();
        wins as f64 / trades.len() as f64 * 100.0
    }

    fn consecutive_streaks(trades: &[Trade]) -> (usize, usize) {
        let mut max_wins = 0;
        let mut max_losses = 0;
        let mut current_wins = 0;
        let mut current_losses = 0;
        for trade in trades {
            if trade.net_pnl > Decimal::ZERO {
                current_wins += 1;
                current_losses = 0;
                max_wins = max_wins.max(current_wins);
            } else if trade.net_pnl < Decimal::ZERO {
                current_losses += 1;
                current_wins = 0;
                max_losses = max_losses.max(current_losses);
            }
        }
        (max_wins, max_losses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::trading::types::ExitReason;
    use rust_decimal_macros::dec;

    fn trade(net_pnl: Decimal, side: PositionSide, entry: i64, exit: i64) -> Trade {
        let gross = net_pnl;
        Trade::new(
            1,
            "BTC/USD".to_string(),
            side,
            dec!(100),
            dec!(100) + gross,
            entry,
            exit,
            dec!(1),
            gross,
            Decimal::ZERO,
            ExitReason::Signal,
        )
    }

    #[test]
    fn test_zero_metrics_when_no_trades() {
        let metrics = Metrics::calculate(&[], &[], dec!(10000));
        assert_eq!(metrics.total_trades, 0);
        assert_eq!(metrics.profit_factor, ProfitFactor::Finite(Decimal::ZERO));
    }

    #[test]
    fn test_profit_factor_infinite_with_no_losses() {
        let trades = vec![trade(dec!(10), PositionSide::Long, 0, 1000)];
        let curve = vec![
            EquityPoint::new(0, dec!(10000), dec!(10000), 0),
            EquityPoint::new(1000, dec!(10010), dec!(10010), 0),
        ];
        let metrics = Metrics::calculate(&trades, &curve, dec!(10000));
        assert_eq!(metrics.profit_factor, ProfitFactor::Infinite);
    }

    #[test]
    fn test_profit_factor_serializes_as_string() {
        let json = serde_json::to_string(&ProfitFactor::Infinite).unwrap();
        assert_eq!(json, "\"Infinity\"");
        let json = serde_json::to_string(&ProfitFactor::Finite(dec!(1.5))).unwrap();
        assert_eq!(json, "1.5");
    }

    #[test]
    fn test_win_rate_and_streaks() {
        let trades = vec![
            trade(dec!(10), PositionSide::Long, 0, 1000),
            trade(dec!(-5), PositionSide::Long, 1000, 2000),
            trade(dec!(10), PositionSide::Long, 2000, 3000),
        ];
        let curve = vec![
            EquityPoint::new(0, dec!(10000), dec!(10000), 0),
            EquityPoint::new(3000, dec!(10015), dec!(10015), 0),
        ];
        let metrics = Metrics::calculate(&trades, &curve, dec!(10000));
        assert_eq!(metrics.total_trades, 3);
        assert_eq!(metrics.winning_trades, 2);
        assert_eq!(metrics.losing_trades, 1);
        assert_eq!(metrics.max_consecutive_wins, 1);
    }
}
