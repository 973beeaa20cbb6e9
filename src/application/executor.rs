//! Per-candle signal generation loop (§4.3). Computes indicator sequences,
//! builds the condition-evaluator context for every primary candle, and
//! walks entry/exit logic against executor-held per-symbol position state.

use crate::domain::errors::StrategyError;
use crate::domain::indicators::{IndicatorParams, IndicatorRegistry};
use crate::domain::market::candle::Candle;
use crate::domain::market::dynamics::CandleDynamics;
use crate::domain::market::timeframe::Timeframe;
use crate::domain::market::timeframe_candle::TimeframeCandle;
use crate::domain::strategy::condition::{CandleContext, EvalContext};
use crate::domain::strategy::expr::Expr;
use crate::domain::strategy::schema::StrategySchema;
use crate::domain::trading::types::PositionSide;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

/// The signal an executed candle produces (§4.3 step 3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    EntryLong,
    EntryShort,
    ExitLong,
    ExitShort,
    None,
}

/// One candle's execution result: signal plus the context it was evaluated
/// against (§4.3 "a record {signal, context, per-indicator values}").
#[derive(Debug, Clone)]
pub struct ExecutionRecord {
    pub signal: Signal,
    pub timestamp: i64,
    pub price: rust_decimal::Decimal,
    pub context: EvalContext,
}

/// Per-candle evaluation loop over a strategy schema (§4.3). Holds no
/// candle data itself; `execute` is called once per run with the clipped
/// series already prepared by the engine.
pub struct StrategyExecutor {
    schema: StrategySchema,
    registry: Arc<IndicatorRegistry>,
    positions: HashMap<String, Option<PositionSide>>,
}

impl StrategyExecutor {
    pub fn new(schema: StrategySchema, registry: Arc<IndicatorRegistry>) -> Self {
        Self {
            schema,
            registry,
            positions: HashMap::new(),
        }
    }

    pub fn required_warmup(&self) -> usize {
        self.schema.required_warmup(&self.registry)
    }

    /// The engine's single write into executor state (§9 "break the
    /// cycle": the engine owns position state, the executor only reads it).
    pub fn set_position(&mut self, symbol: &str, side: Option<PositionSide>) {
        self.positions.insert(symbol.to_string(), side);
    }

    pub fn execute(
        &self,
        series: &[Candle],
        symbol: &str,
        mtf: &HashMap<Timeframe, Vec<TimeframeCandle>>,
    ) -> Result<Vec<ExecutionRecord>, StrategyError> {
        let primary = self.schema.data.primary_timeframe;
        let indicator_values = self.compute_indicators(series, primary, mtf)?;

        // §4.7: dynamics are exposed from the first additional timeframe, since
        // the schema has no field naming which one filters should read from.
        let dynamics_timeframe = self.schema.data.additional_timeframes.first().copied();
        let dynamics_aligned: Vec<Option<CandleDynamics>> = match dynamics_timeframe
            .and_then(|tf| mtf.get(&tf).map(|candles| (tf, candles)))
        {
            Some((tf, htf_candles)) => align_dynamics(series, htf_candles, tf),
            None => vec![None; series.len()],
        };
        let variable_exprs: Vec<(String, Expr)> = self
            .schema
            .computed_variables
            .iter()
            .filter_map(|v| match Expr::parse(&v.expression) {
                Ok(expr) => Some((v.id.clone(), expr)),
                Err(e) => {
                    warn!(variable = %v.id, error = %e, "computed variable failed to parse, skipping");
                    None
                }
            })
            .collect();

        let primary_lines = self.primary_line_map();

        let mut contexts: Vec<CandleContext> = Vec::with_capacity(series.len());
        for (i, candle) in series.iter().enumerate() {
            let mut ctx = CandleContext {
                candle: Some(*candle),
                indicators: HashMap::new(),
                indicator_primary_line: primary_lines.clone(),
                variables: HashMap::new(),
                dynamics: dynamics_aligned[i].map(|d| d.to_field_map()).unwrap_or_default(),
            };
            for (id, series_values) in &indicator_values {
                if let Some(value) = series_values.get(i).and_then(|v| v.clone()) {
                    ctx.indicators.insert(id.clone(), value);
                }
            }
            for (id, expr) in &variable_exprs {
                if let Some(value) = expr.eval(&ctx) {
                    ctx.variables.insert(id.clone(), value);
                }
            }
            contexts.push(ctx);
        }

        let mut current_position = self.positions.get(symbol).copied().flatten();
        let mut records = Vec::with_capacity(series.len());
        for (i, candle) in series.iter().enumerate() {
            let eval_ctx = EvalContext {
                current: contexts[i].clone(),
                previous: if i > 0 { Some(contexts[i - 1].clone()) } else { None },
            };

            let signal = self.decide_signal(&eval_ctx, current_position);
            match signal {
                Signal::ExitLong | Signal::ExitShort => current_position = None,
                Signal::EntryLong => current_position = Some(PositionSide::Long),
                Signal::EntryShort => current_position = Some(PositionSide::Short),
                Signal::None => {}
            }

            records.push(ExecutionRecord {
                signal,
                timestamp: candle.timestamp,
                price: candle.close,
                context: eval_ctx,
            });
        }

        Ok(records)
    }

    fn decide_signal(&self, ctx: &EvalContext, position: Option<PositionSide>) -> Signal {
        if let Some(side) = position {
            if let Some(exit) = &self.schema.exit_signals.signal_exit {
                if exit.conditions.evaluate(ctx) {
                    return match side {
                        PositionSide::Long => Signal::ExitLong,
                        PositionSide::Short => Signal::ExitShort,
                    };
                }
            }
            return Signal::None;
        }

        if let Some(long) = &self.schema.entry_signals.long {
            if long.conditions.evaluate(ctx) && long.filters.as_ref().is_none_or(|f| f.evaluate(ctx))
            {
                return Signal::EntryLong;
            }
        }
        if let Some(short) = &self.schema.entry_signals.short {
            if short.conditions.evaluate(ctx)
                && short.filters.as_ref().is_none_or(|f| f.evaluate(ctx))
            {
                return Signal::EntryShort;
            }
        }
        Signal::None
    }

    fn primary_line_map(&self) -> HashMap<String, &'static str> {
        let mut map = HashMap::new();
        for def in &self.schema.indicators {
            if let Some(indicator) = self.registry.get(&def.indicator_type) {
                if let Some(line) = indicator.primary_line() {
                    map.insert(def.id.clone(), line);
                }
            }
        }
        map
    }

    /// Computes every indicator definition's per-candle sequence aligned to
    /// `series` (§4.3 step 1): same timeframe indicators are computed
    /// directly, higher-timeframe ones are computed on their own series and
    /// mapped back via the last-closed-candle rule.
    fn compute_indicators(
        &self,
        series: &[Candle],
        primary: Timeframe,
        mtf: &HashMap<Timeframe, Vec<TimeframeCandle>>,
    ) -> Result<HashMap<String, crate::domain::indicators::IndicatorSeries>, StrategyError> {
        let mut out = HashMap::new();
        for def in &self.schema.indicators {
            let Some(indicator) = self.registry.get(&def.indicator_type) else {
                warn!(indicator_type = %def.indicator_type, "unknown indicator type, skipping");
                continue;
            };
            let params: IndicatorParams = def.params.to_indicator_params();
            let timeframe = def.timeframe.unwrap_or(primary);

            let aligned = if timeframe == primary {
                indicator
                    .calculate(series, &params)
                    .map_err(|e| StrategyError::InvalidStrategy { reason: e.to_string() })?
            } else {
                let Some(htf_candles) = mtf.get(&timeframe) else {
                    warn!(indicator = %def.id, ?timeframe, "missing mtf series for indicator, skipping");
                    continue;
                };
                let htf_series: Vec<Candle> = htf_candles.iter().map(|c| c.to_candle()).collect();
                let htf_values = indicator
                    .calculate(&htf_series, &params)
                    .map_err(|e| StrategyError::InvalidStrategy { reason: e.to_string() })?;
                align_mtf(series, &htf_series, &htf_values, timeframe)
            };

            out.insert(def.id.clone(), aligned);
        }
        Ok(out)
    }
}

/// Maps every primary candle to the value of the most recently *closed*
/// higher-timeframe candle (§4.3 step 1, §GLOSSARY "Multi-timeframe"):
/// the htf candle whose period start is `≤ align(t_i) − htf_ms`.
fn align_mtf(
    primary: &[Candle],
    htf_series: &[Candle],
    htf_values: &crate::domain::indicators::IndicatorSeries,
    htf_timeframe: Timeframe,
) -> crate::domain::indicators::IndicatorSeries {
    let htf_ms = htf_timeframe.to_millis();
    let htf_starts: Vec<i64> = htf_series.iter().map(|c| c.timestamp).collect();

    primary
        .iter()
        .map(|candle| {
            let aligned = htf_timeframe.period_start(candle.timestamp);
            let cutoff = aligned - htf_ms;
            let idx = htf_starts.partition_point(|&ts| ts <= cutoff);
            if idx == 0 {
                None
            } else {
                htf_values.get(idx - 1).cloned().flatten()
            }
        })
        .collect()
}

/// Same last-closed-candle alignment as [`align_mtf`], but sourcing
/// `CandleDynamics` off the higher-timeframe aggregator output directly
/// instead of an indicator series (§4.7).
fn align_dynamics(
    primary: &[Candle],
    htf_candles: &[TimeframeCandle],
    htf_timeframe: Timeframe,
) -> Vec<Option<CandleDynamics>> {
    let htf_ms = htf_timeframe.to_millis();
    let htf_starts: Vec<i64> = htf_candles.iter().map(|c| c.timestamp).collect();

    primary
        .iter()
        .map(|candle| {
            let aligned = htf_timeframe.period_start(candle.timestamp);
            let cutoff = aligned - htf_ms;
            let idx = htf_starts.partition_point(|&ts| ts <= cutoff);
            if idx == 0 {
                None
            } else {
                htf_candles.get(idx - 1).and_then(|c| c.dynamics)
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::strategy::schema::*;
    use rust_decimal_macros::dec;

    fn candle(ts: i64, close: rust_decimal::Decimal) -> Candle {
        Candle::new(ts, close, close, close, close, dec!(10))
    }

    fn always_long_schema() -> StrategySchema {
        StrategySchema {
            id: "test".to_string(),
            version: 1,
            status: StrategyStatus::Active,
            data: DataRequirements {
                primary_timeframe: Timeframe::OneMin,
                additional_timeframes: vec![],
                lookback: 1,
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
            risk_policy: RiskPolicy {
                risk_percent_per_trade: dec!(1),
                max_open_positions: 1,
            },
        }
    }

    #[test]
    fn test_always_long_enters_once_then_holds() {
        let executor = StrategyExecutor::new(always_long_schema(), Arc::new(IndicatorRegistry::with_builtins()));
        let series: Vec<Candle> = (0..5).map(|i| candle(i * 60_000, dec!(100))).collect();
        let records = executor.execute(&series, "BTC/USD", &HashMap::new()).unwrap();
        assert_eq!(records[0].signal, Signal::EntryLong);
        for record in &records[1..] {
            assert_eq!(record.signal, Signal::None);
        }
    }

    #[test]
    fn test_dynamics_from_additional_timeframe_reach_context() {
        let mut schema = always_long_schema();
        schema.data.additional_timeframes = vec![Timeframe::FiveMin];
        let executor = StrategyExecutor::new(schema, Arc::new(IndicatorRegistry::with_builtins()));

        let series: Vec<Candle> = (0..6).map(|i| candle(i * 60_000, dec!(100))).collect();

        let mut htf_candle = TimeframeCandle::new(
            "BTC/USD".to_string(),
            Timeframe::FiveMin,
            dec!(100),
            dec!(100),
            dec!(100),
            dec!(100),
            dec!(10),
            0,
        );
        htf_candle.dynamics = Some(CandleDynamics::compute(
            &[candle(0, dec!(100)), candle(60_000, dec!(101))],
            None,
        ));
        let mtf = HashMap::from([(Timeframe::FiveMin, vec![htf_candle])]);

        let records = executor.execute(&series, "BTC/USD", &mtf).unwrap();
        // The 6th candle (index 5) falls after the first 5-min period closes.
        assert!(records[5].context.current.dynamics.contains_key("velocity"));
    }

    #[test]
    fn test_unknown_indicator_type_is_skipped_not_fatal() {
        let mut schema = always_long_schema();
        schema.indicators.push(IndicatorDefinition {
            id: "bogus".to_string(),
            indicator_type: "NOT_A_REAL_INDICATOR".to_string(),
            params: IndicatorParamsDto::default(),
            timeframe: None,
        });
        let executor = StrategyExecutor::new(schema, Arc::new(IndicatorRegistry::with_builtins()));
        let series: Vec<Candle> = (0..3).map(|i| candle(i * 60_000, dec!(100))).collect();
        let records = executor.execute(&series, "BTC/USD", &HashMap::new()).unwrap();
        assert_eq!(records.len(), 3);
    }
}
