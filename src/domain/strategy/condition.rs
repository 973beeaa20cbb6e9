//! Condition and condition-group evaluation over a per-candle context
//! (§4.2). All predicates return false when an operand is unresolved.

use super::expr::Resolver;
use super::schema::{Condition, ConditionGroup, ConditionNode, GroupOperator, PredicateTag};
use crate::domain::indicators::IndicatorValue;
use crate::domain::market::candle::Candle;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::str::FromStr;

/// One candle's resolvable symbol space: price fields, indicator outputs
/// (current primary line order preserved via `BTreeMap`), and computed
/// variables.
#[derive(Debug, Clone, Default)]
pub struct CandleContext {
    pub candle: Option<Candle>,
    pub indicators: HashMap<String, IndicatorValue>,
    pub indicator_primary_line: HashMap<String, &'static str>,
    pub variables: HashMap<String, Decimal>,
    /// Flattened `CandleDynamics` fields (§4.7) for the aligned additional
    /// timeframe, keyed by field name. Referenced as `dynamics.<field>`.
    pub dynamics: HashMap<String, Decimal>,
}

impl CandleContext {
    fn resolve_price_field(&self, name: &str) -> Option<Decimal> {
        let candle = self.candle.as_ref()?;
        match name {
            "open" => Some(candle.open),
            "high" => Some(candle.high),
            "low" => Some(candle.low),
            "close" => Some(candle.close),
            "volume" => Some(candle.volume),
            _ => None,
        }
    }

    pub fn resolve(&self, name: &str, line: Option<&str>) -> Option<Decimal> {
        if name == "dynamics" {
            return line.and_then(|field| self.dynamics.get(field).copied());
        }
        if let Some(line) = line {
            return self.indicators.get(name).and_then(|v| v.line(line));
        }
        if let Some(price) = self.resolve_price_field(name) {
            return Some(price);
        }
        if let Some(indicator) = self.indicators.get(name) {
            let primary = self.indicator_primary_line.get(name).copied();
            return indicator.primary(primary);
        }
        if let Some(var) = self.variables.get(name) {
            return Some(*var);
        }
        Decimal::from_str(name).ok()
    }
}

impl Resolver for CandleContext {
    fn resolve(&self, name: &str, line: Option<&str>) -> Option<Decimal> {
        CandleContext::resolve(self, name, line)
    }
}

/// Full evaluation context for one candle: current values plus the prior
/// primary candle's context for crossing/direction predicates (§4.2).
#[derive(Debug, Clone, Default)]
pub struct EvalContext {
    pub current: CandleContext,
    pub previous: Option<CandleContext>,
}

fn split_reference(reference: &str) -> (&str, Option<&str>) {
    match reference.split_once('.') {
        Some((name, line)) => (name, Some(line)),
        None => (reference, None),
    }
}

fn resolve_side(ctx: &CandleContext, reference: &str) -> Option<Decimal> {
    if let Ok(n) = Decimal::from_str(reference) {
        return Some(n);
    }
    let (name, line) = split_reference(reference);
    ctx.resolve(name, line)
}

impl Condition {
    pub fn evaluate(&self, ctx: &EvalContext) -> bool {
        let left = resolve_side(&ctx.current, &self.left);
        let right = self.right.as_deref().and_then(|r| resolve_side(&ctx.current, r));

        match self.predicate {
            PredicateTag::GreaterThan => matches!((left, right), (Some(l), Some(r)) if l > r),
            PredicateTag::LessThan => matches!((left, right), (Some(l), Some(r)) if l < r),
            PredicateTag::Equals => matches!((left, right), (Some(l), Some(r)) if l == r),
            PredicateTag::NotEquals => matches!((left, right), (Some(l), Some(r)) if l != r),
            PredicateTag::Between => self.evaluate_between(left, right),
            PredicateTag::CrossesAbove => self.evaluate_cross(ctx, left, right, true),
            PredicateTag::CrossesBelow => self.evaluate_cross(ctx, left, right, false),
            PredicateTag::IsRising => self.evaluate_direction(ctx, left, true),
            PredicateTag::IsFalling => self.evaluate_direction(ctx, left, false),
        }
    }

    fn evaluate_between(&self, left: Option<Decimal>, right: Option<Decimal>) -> bool {
        let (Some(min), Some(max)) = (self.min, self.max) else {
            return false;
        };
        let Some(left) = left else { return false };
        let left_in_range = left >= min && left <= max;
        match right {
            Some(right) if right != Decimal::ZERO => {
                left_in_range && right >= min && right <= max
            }
            _ => left_in_range,
        }
    }

    fn evaluate_cross(
        &self,
        ctx: &EvalContext,
        left: Option<Decimal>,
        right: Option<Decimal>,
        above: bool,
    ) -> bool {
        let Some(previous) = ctx.previous.as_ref() else {
            return false;
        };
        let prev_left = resolve_side(previous, &self.left);
        let prev_right = self.right.as_deref().and_then(|r| resolve_side(previous, r));
        match (left, right, prev_left, prev_right) {
            (Some(l), Some(r), Some(pl), Some(pr)) => {
                if above {
                    pl <= pr && l > r
                } else {
                    pl >= pr && l < r
                }
            }
            _ => false,
        }
    }

    fn evaluate_direction(&self, ctx: &EvalContext, left: Option<Decimal>, rising: bool) -> bool {
        let Some(previous) = ctx.previous.as_ref() else {
            return false;
        };
        let prev_left = resolve_side(previous, &self.left);
        match (left, prev_left) {
            (Some(l), Some(pl)) => {
                if rising {
                    l > pl
                } else {
                    l < pl
                }
            }
            _ => false,
        }
    }
}

impl ConditionGroup {
    pub fn evaluate(&self, ctx: &EvalContext) -> bool {
        if self.children.is_empty() {
            return true;
        }
        match self.operator {
            GroupOperator::And => self.children.iter().all(|c| c.evaluate(ctx)),
            GroupOperator::Or => self.children.iter().any(|c| c.evaluate(ctx)),
        }
    }
}

impl ConditionNode {
    pub fn evaluate(&self, ctx: &EvalContext) -> bool {
        match self {
            ConditionNode::Leaf(condition) => condition.evaluate(ctx),
            ConditionNode::Group(group) => group.evaluate(ctx),
        }
    }
}
