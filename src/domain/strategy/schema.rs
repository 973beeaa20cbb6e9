//! User-owned strategy definitions: the data shape a strategy author
//! submits, as opposed to the built-in Rust types of the engine itself (§9:
//! strategies are data, not compiled code).

use crate::domain::indicators::IndicatorParams;
use crate::domain::market::timeframe::Timeframe;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StrategyStatus {
    Draft,
    Active,
    Archived,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataRequirements {
    pub primary_timeframe: Timeframe,
    #[serde(default)]
    pub additional_timeframes: Vec<Timeframe>,
    pub lookback: usize,
    pub symbols: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndicatorDefinition {
    pub id: String,
    #[serde(rename = "type")]
    pub indicator_type: String,
    #[serde(default)]
    pub params: IndicatorParamsDto,
    pub timeframe: Option<Timeframe>,
}

/// Wire-friendly wrapper over `IndicatorParams` for JSON schemas. Kept
/// separate from the engine's in-memory `IndicatorParams` so the
/// serde-facing shape can evolve without touching calculation code.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndicatorParamsDto(pub std::collections::HashMap<String, serde_json::Value>);

impl IndicatorParamsDto {
    pub fn to_indicator_params(&self) -> IndicatorParams {
        let mut params = IndicatorParams::new();
        for (k, v) in &self.0 {
            match v {
                serde_json::Value::Number(n) if n.is_i64() => {
                    params = params.with_int(k, n.as_i64().unwrap());
                }
                serde_json::Value::Number(n) => {
                    if let Some(f) = n.as_f64() {
                        if let Some(d) = Decimal::from_f64_retain(f) {
                            params = params.with_decimal(k, d);
                        }
                    }
                }
                serde_json::Value::String(s) => {
                    params = params.with_str(k, s);
                }
                _ => {}
            }
        }
        params
    }
}

use rust_decimal::prelude::FromPrimitive;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputedVariable {
    pub id: String,
    pub expression: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredicateTag {
    GreaterThan,
    LessThan,
    Equals,
    NotEquals,
    Between,
    CrossesAbove,
    CrossesBelow,
    IsRising,
    IsFalling,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Condition {
    pub predicate: PredicateTag,
    pub left: String,
    #[serde(default)]
    pub right: Option<String>,
    #[serde(default)]
    pub min: Option<Decimal>,
    #[serde(default)]
    pub max: Option<Decimal>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum GroupOperator {
    And,
    Or,
}

/// A tree of conditions. Leaves are `Condition`, internal nodes are
/// AND/OR-combined child groups (§4.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConditionNode {
    Leaf(Condition),
    Group(ConditionGroup),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionGroup {
    pub operator: GroupOperator,
    #[serde(default)]
    pub children: Vec<ConditionNode>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalDefinition {
    pub conditions: ConditionGroup,
    #[serde(default)]
    pub filters: Option<ConditionGroup>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntrySignals {
    pub long: Option<SignalDefinition>,
    pub short: Option<SignalDefinition>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopLossKind {
    FixedPercent,
    FixedPrice,
    AtrMultiple,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StopLossConfig {
    pub kind: StopLossKind,
    pub value: Decimal,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TakeProfitConfig {
    pub kind: StopLossKind,
    pub value: Decimal,
    /// Interpreted as a risk/reward multiple when `kind` isn't used directly.
    pub risk_reward: Option<Decimal>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TrailingStopConfig {
    pub activation_percent: Decimal,
    pub trail_percent: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExitSignals {
    pub stop_loss: Option<StopLossConfig>,
    pub take_profit: Option<TakeProfitConfig>,
    pub trailing_stop: Option<TrailingStopConfig>,
    pub signal_exit: Option<SignalDefinition>,
    pub timeout_candles: Option<usize>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RiskPolicy {
    pub risk_percent_per_trade: Decimal,
    pub max_open_positions: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategySchema {
    pub id: String,
    pub version: u32,
    pub status: StrategyStatus,
    pub data: DataRequirements,
    #[serde(default)]
    pub indicators: Vec<IndicatorDefinition>,
    #[serde(default)]
    pub computed_variables: Vec<ComputedVariable>,
    pub entry_signals: EntrySignals,
    pub exit_signals: ExitSignals,
    pub risk_policy: RiskPolicy,
}

impl StrategySchema {
    /// `max(lookback, max over indicators of their requiredWarmup)` (§4.3);
    /// the registry argument resolves each indicator's own warmup formula.
    pub fn required_warmup(&self, registry: &crate::domain::indicators::IndicatorRegistry) -> usize {
        let indicator_max = self
            .indicators
            .iter()
            .filter_map(|def| {
                registry
                    .get(&def.indicator_type)
                    .map(|ind| ind.required_warmup(&def.params.to_indicator_params()))
            })
            .max()
            .unwrap_or(0);
        self.data.lookback.max(indicator_max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_group_serde_roundtrip() {
        let group = ConditionGroup {
            operator: GroupOperator::And,
            children: vec![],
        };
        let json = serde_json::to_string(&group).unwrap();
        let parsed: ConditionGroup = serde_json::from_str(&json).unwrap();
        assert!(parsed.children.is_empty());
    }
}
