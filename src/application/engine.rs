//! Backtest orchestration (§4.5): clips data to the configured range,
//! drives the executor and simulator candle-by-candle, and produces a
//! `BacktestResult` with trade log, equity curve, and metrics.

use crate::application::executor::{ExecutionRecord, Signal, StrategyExecutor};
use crate::application::simulator::{EntrySide, MarketSimulator};
use crate::config::BacktestConfig;
use crate::domain::errors::EngineError;
use crate::domain::indicators::IndicatorRegistry;
use crate::domain::market::candle::Candle;
use crate::domain::market::timeframe::Timeframe;
use crate::domain::market::timeframe_candle::TimeframeCandle;
use crate::domain::performance::equity::EquityPoint;
use crate::domain::performance::metrics::Metrics;
use crate::domain::strategy::schema::StrategySchema;
use crate::domain::trading::fee_model::FeeModel;
use crate::domain::trading::types::{ExitReason, Trade};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, instrument};

/// Default ATR lookback used for SL/TP distance when a strategy's own
/// indicator definitions don't already provide one (§4.5 step 4).
const DEFAULT_ATR_PERIOD: usize = 14;

/// Outcome of a backtest run (§3 `Backtest Result`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BacktestStatus {
    Completed,
    Failed,
    Cancelled,
}

/// Progress update streamed over an `mpsc::Sender` during a run (§3.1,
/// §9 "progress callback as a channel of values").
#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub backtest_id: String,
    pub progress_percent: f64,
    pub processed_candles: usize,
    pub total_candles: usize,
    pub current_date: Option<i64>,
    pub eta_ms: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct BacktestResult {
    pub strategy_id: String,
    pub strategy_version: u32,
    pub status: BacktestStatus,
    pub trades: Vec<Trade>,
    pub equity_curve: Vec<EquityPoint>,
    pub metrics: Option<Metrics>,
    pub started_at: i64,
    pub completed_at: i64,
    pub error: Option<String>,
    pub total_candles: usize,
    pub processed_candles: usize,
}

/// Orchestrates one backtest run (§4.5). Constructs a fresh executor and
/// simulator per call so concurrent runs share nothing (§5).
pub struct BacktestEngine {
    config: BacktestConfig,
    fee_model: Arc<dyn FeeModel>,
    registry: Arc<IndicatorRegistry>,
}

impl BacktestEngine {
    pub fn new(config: BacktestConfig, fee_model: Arc<dyn FeeModel>, registry: Arc<IndicatorRegistry>) -> Self {
        Self { config, fee_model, registry }
    }

    #[instrument(skip(self, schema, series, mtf, cancel, progress), fields(symbol = %symbol))]
    #[allow(clippy::too_many_arguments)]
    pub fn run(
        &self,
        backtest_id: &str,
        schema: StrategySchema,
        series: &[Candle],
        mtf: &HashMap<Timeframe, Vec<TimeframeCandle>>,
        symbol: &str,
        started_at: i64,
        cancel: Arc<AtomicBool>,
        progress: Option<tokio::sync::mpsc::Sender<ProgressEvent>>,
    ) -> BacktestResult {
        let strategy_id = schema.id.clone();
        let strategy_version = schema.version;

        let clipped: Vec<Candle> = series
            .iter()
            .filter(|c| c.timestamp >= self.config.start_date && c.timestamp <= self.config.end_date)
            .copied()
            .collect();

        if clipped.is_empty() {
            return self.failed_result(
                strategy_id,
                strategy_version,
                started_at,
                EngineError::NoDataInRange,
            );
        }

        let executor = StrategyExecutor::new(schema.clone(), self.registry.clone());
        let warmup = executor.required_warmup();
        if clipped.len() < warmup {
            return self.failed_result(
                strategy_id,
                strategy_version,
                started_at,
                EngineError::InsufficientData { required: warmup, got: clipped.len() },
            );
        }

        let atr = crate::domain::indicators::atr::Atr::series(&clipped, DEFAULT_ATR_PERIOD);

        let mut executor = executor;
        let execution_result = match executor.execute(&clipped, symbol, mtf) {
            Ok(records) => records,
            Err(e) => {
                return self.failed_result(
                    strategy_id,
                    strategy_version,
                    started_at,
                    EngineError::Runtime { reason: e.to_string() },
                );
            }
        };

        let mut simulator = MarketSimulator::new(&self.config, self.fee_model.clone(), schema.risk_policy.max_open_positions);
        let mut equity_curve: Vec<EquityPoint> = Vec::with_capacity(clipped.len() - warmup);
        let mut peak_equity = self.config.initial_capital;
        let total_candles = clipped.len();
        let start_instant = std::time::Instant::now();

        let mut cancelled = false;
        for i in warmup..clipped.len() {
            if cancel.load(Ordering::Relaxed) {
                cancelled = true;
                break;
            }

            let candle = &clipped[i];
            let closed_trades = simulator.process_candle(candle, symbol);
            if !closed_trades.is_empty() {
                executor.set_position(symbol, None);
            }

            self.apply_signal(&mut simulator, &mut executor, &execution_result[i], candle, symbol, &schema, atr[i]);

            let equity = simulator.portfolio().equity();
            peak_equity = peak_equity.max(equity);
            equity_curve.push(EquityPoint::new(
                candle.timestamp,
                equity,
                peak_equity,
                simulator.portfolio().open_positions.len(),
            ));

            if let Some(tx) = &progress {
                let processed = i - warmup + 1;
                if processed % self.config.progress_interval == 0 || i == clipped.len() - 1 {
                    let elapsed_ms = start_instant.elapsed().as_millis() as u64;
                    let remaining = total_candles.saturating_sub(processed);
                    let eta_ms = if processed > 0 {
                        Some(elapsed_ms * remaining as u64 / processed as u64)
                    } else {
                        None
                    };
                    let _ = tx.try_send(ProgressEvent {
                        backtest_id: backtest_id.to_string(),
                        progress_percent: processed as f64 / total_candles as f64 * 100.0,
                        processed_candles: processed,
                        total_candles,
                        current_date: Some(candle.timestamp),
                        eta_ms,
                    });
                }
            }
        }

        let last_candle = clipped.last().unwrap();
        simulator.close_all(last_candle.close, last_candle.timestamp, ExitReason::Manual);

        let trades = simulator.trades().to_vec();
        let metrics = Metrics::calculate(&trades, &equity_curve, self.config.initial_capital);
        let processed_candles = equity_curve.len();

        info!(trades = trades.len(), processed_candles, "backtest run finished");

        BacktestResult {
            strategy_id,
            strategy_version,
            status: if cancelled { BacktestStatus::Cancelled } else { BacktestStatus::Completed },
            trades,
            equity_curve,
            metrics: Some(metrics),
            started_at,
            completed_at: last_candle.timestamp,
            error: if cancelled { Some(EngineError::Cancelled.to_string()) } else { None },
            total_candles,
            processed_candles,
        }
    }

    /// Applies one candle's execution signal (§4.5 step 6b): exits close
    /// the open position at the candle's close with reason `signal`;
    /// entries open a new one using the strategy's configured exits.
    fn apply_signal(
        &self,
        simulator: &mut MarketSimulator,
        executor: &mut StrategyExecutor,
        record: &ExecutionRecord,
        candle: &Candle,
        symbol: &str,
        schema: &StrategySchema,
        atr: Option<Decimal>,
    ) {
        match record.signal {
            Signal::ExitLong | Signal::ExitShort => {
                if let Some(position) = simulator.open_position_for(symbol).cloned() {
                    simulator.close_position(&position, candle.close, candle.timestamp, ExitReason::Signal);
                    executor.set_position(symbol, None);
                }
            }
            Signal::EntryLong | Signal::EntryShort => {
                let side = if record.signal == Signal::EntryLong { EntrySide::Long } else { EntrySide::Short };
                let opened = simulator.open_position(
                    side,
                    candle,
                    symbol,
                    schema.exit_signals.stop_loss,
                    schema.exit_signals.take_profit,
                    schema.exit_signals.trailing_stop,
                    schema.risk_policy.risk_percent_per_trade,
                    atr,
                );
                if let Some(position) = opened {
                    executor.set_position(symbol, Some(position.side));
                }
            }
            Signal::None => {}
        }
    }

    fn failed_result(
        &self,
        strategy_id: String,
        strategy_version: u32,
        started_at: i64,
        error: EngineError,
    ) -> BacktestResult {
        let status = match error {
            EngineError::Cancelled => BacktestStatus::Cancelled,
            _ => BacktestStatus::Failed,
        };
        BacktestResult {
            strategy_id,
            strategy_version,
            status,
            trades: Vec::new(),
            equity_curve: Vec::new(),
            metrics: None,
            started_at,
            completed_at: started_at,
            error: Some(error.to_string()),
            total_candles: 0,
            processed_candles: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::strategy::schema::*;
    use crate::domain::trading::fee_model::PercentFeeModel;
    use rust_decimal_macros::dec;

    fn config(start: i64, end: i64) -> BacktestConfig {
        BacktestConfig {
            start_date: start,
            end_date: end,
            initial_capital: dec!(10000),
            currency: "USD".to_string(),
            commission_percent: dec!(0.1),
            slippage_percent: dec!(0),
            fill_model: crate::config::FillModel::Realistic,
            data_source: crate::config::DataSource::Local,
            progress_interval: 100,
        }
    }

    fn candle(ts: i64, close: Decimal) -> Candle {
        Candle::new(ts, close, close, close, close, dec!(10))
    }

    fn always_long_schema(required: usize) -> StrategySchema {
        StrategySchema {
            id: "always-long".to_string(),
            version: 1,
            status: StrategyStatus::Active,
            data: DataRequirements {
                primary_timeframe: Timeframe::OneMin,
                additional_timeframes: vec![],
                lookback: required,
                symbols: vec!["BTC/USD".to_string()],
            },
            indicators: vec![],
            computed_variables: vec![],
            entry_signals: EntrySignals {
                long: Some(SignalDefinition {
                    conditions: ConditionGroup {
                        operator: GroupOperator::And,
                        children: vec![ConditionNode::Leaf(Condition {
                            predicate: PredicateTag::GreaterThan,
                            left: "close".to_string(),
                            right: Some("0".to_string()),
                            min: None,
                            max: None,
                        })],
                    },
                    filters: None,
                }),
                short: None,
            },
            exit_signals: ExitSignals {
                stop_loss: None,
                take_profit: None,
                trailing_stop: None,
                signal_exit: None,
                timeout_candles: None,
            },
            risk_policy: RiskPolicy { risk_percent_per_trade: dec!(1), max_open_positions: 1 },
        }
    }

    fn engine(start: i64, end: i64) -> BacktestEngine {
        BacktestEngine::new(
            config(start, end),
            Arc::new(PercentFeeModel::new(dec!(0.1))),
            Arc::new(IndicatorRegistry::with_builtins()),
        )
    }

    #[test]
    fn test_no_data_in_range_fails() {
        let series: Vec<Candle> = (0..10).map(|i| candle(i * 60_000, dec!(100))).collect();
        let eng = engine(100_000_000, 200_000_000);
        let result = eng.run(
            "bt-1",
            always_long_schema(1),
            &series,
            &HashMap::new(),
            "BTC/USD",
            0,
            Arc::new(AtomicBool::new(false)),
            None,
        );
        assert_eq!(result.status, BacktestStatus::Failed);
        assert!(result.error.unwrap().contains("No data"));
    }

    #[test]
    fn test_insufficient_data_fails() {
        let series: Vec<Candle> = (0..5).map(|i| candle(i * 60_000, dec!(100))).collect();
        let eng = engine(0, 10_000_000);
        let result = eng.run(
            "bt-2",
            always_long_schema(50),
            &series,
            &HashMap::new(),
            "BTC/USD",
            0,
            Arc::new(AtomicBool::new(false)),
            None,
        );
        assert_eq!(result.status, BacktestStatus::Failed);
        assert!(result.error.unwrap().contains("Insufficient"));
    }

    #[test]
    fn test_always_long_force_closes_at_end() {
        let series: Vec<Candle> = (0..100).map(|i| candle(i * 60_000, dec!(100) + Decimal::from(i % 5))).collect();
        let eng = engine(0, 100 * 60_000);
        let result = eng.run(
            "bt-3",
            always_long_schema(1),
            &series,
            &HashMap::new(),
            "BTC/USD",
            0,
            Arc::new(AtomicBool::new(false)),
            None,
        );
        assert_eq!(result.status, BacktestStatus::Completed);
        assert!(!result.trades.is_empty());
        let last_trade = result.trades.last().unwrap();
        assert_eq!(last_trade.exit_reason, ExitReason::Manual);
        assert_eq!(last_trade.exit_time, series.last().unwrap().timestamp);
    }

    #[test]
    fn test_cancellation_produces_cancelled_status() {
        let series: Vec<Candle> = (0..100).map(|i| candle(i * 60_000, dec!(100))).collect();
        let eng = engine(0, 100 * 60_000);
        let cancel = Arc::new(AtomicBool::new(true));
        let result = eng.run(
            "bt-4",
            always_long_schema(1),
            &series,
            &HashMap::new(),
            "BTC/USD",
            0,
            cancel,
            None,
        );
        assert_eq!(result.status, BacktestStatus::Cancelled);
    }
}
