//! Optional per-aggregate "dynamics" metrics (§4.7), computed from the raw
//! 1-minute candles folded into one higher-timeframe candle. Kept separate
//! from [`crate::domain::market::timeframe_candle::TimeframeCandle`] so
//! plain OHLCV consumers are unaffected by this richer, optional context.

use crate::domain::market::candle::Candle;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CandleDynamics {
    /// Close-to-close price change over the group, per constituent candle.
    pub velocity: f64,
    /// Change in velocity relative to the previous group (0 if unavailable).
    pub velocity_acceleration: f64,
    /// True when group volume exceeds `spike_multiplier` × the average of
    /// the constituent candles' own volumes.
    pub volume_spike: bool,
    /// Fraction of total volume traded in candles whose close sat above the
    /// group midprice (high+low)/2.
    pub volume_distribution_over_midprice: f64,
    /// |close - open| / (high - low), 0 when the range is 0.
    pub body_to_wick_ratio: f64,
    /// Where the close sits within [low, high], 0 = at low, 1 = at high.
    pub close_position_in_range: f64,
    /// Run length of same-direction (up/down) constituent candles ending
    /// at the last one, signed (positive = up streak, negative = down).
    pub consecutive_direction: i32,
    /// Population stddev of constituent close-to-close returns.
    pub intrabar_volatility: f64,
    /// Population stddev of the rolling absolute return, a simple proxy for
    /// volatility-of-volatility / clustering.
    pub volatility_clustering: f64,
    /// Count of direction sign changes across constituent candles.
    pub direction_reversals: u32,
    /// Largest peak-to-trough drop in cumulative close-to-close return
    /// within the group.
    pub max_intrabar_drawdown: f64,
    /// Mean (high - low) across constituent candles.
    pub average_candle_size: f64,
}

impl CandleDynamics {
    /// Computes dynamics for one completed aggregate from its constituent
    /// 1-minute candles (in chronological order) and the previous group's
    /// velocity, if known.
    pub fn compute(constituents: &[Candle], previous_velocity: Option<f64>) -> Self {
        assert!(!constituents.is_empty());

        let to_f64 = |d: Decimal| d.to_f64().unwrap_or(0.0);

        let closes: Vec<f64> = constituents.iter().map(|c| to_f64(c.close)).collect();
        let first_open = to_f64(constituents[0].open);
        let last_close = *closes.last().unwrap();
        let n = constituents.len() as f64;

        let velocity = (last_close - first_open) / n;
        let velocity_acceleration = previous_velocity.map(|p| velocity - p).unwrap_or(0.0);

        let total_volume: f64 = constituents.iter().map(|c| to_f64(c.volume)).sum();
        let avg_volume = total_volume / n;
        // A spike candle within the group traded well above the group's own average.
        let volume_spike = constituents
            .iter()
            .any(|c| to_f64(c.volume) > 1.5 * avg_volume);

        let group_high = constituents
            .iter()
            .map(|c| to_f64(c.high))
            .fold(f64::MIN, f64::max);
        let group_low = constituents
            .iter()
            .map(|c| to_f64(c.low))
            .fold(f64::MAX, f64::min);
        let midprice = (group_high + group_low) / 2.0;

        let volume_above_mid: f64 = constituents
            .iter()
            .filter(|c| to_f64(c.close) > midprice)
            .map(|c| to_f64(c.volume))
            .sum();
        let volume_distribution_over_midprice = if total_volume > 0.0 {
            volume_above_mid / total_volume
        } else {
            0.0
        };

        let group_open = first_open;
        let group_close = last_close;
        let range = group_high - group_low;
        let body_to_wick_ratio = if range > 0.0 {
            (group_close - group_open).abs() / range
        } else {
            0.0
        };
        let close_position_in_range = if range > 0.0 {
            (group_close - group_low) / range
        } else {
            0.0
        };

        let mut returns = Vec::with_capacity(constituents.len().saturating_sub(1));
        for w in constituents.windows(2) {
            let prev = to_f64(w[0].close);
            let curr = to_f64(w[1].close);
            if prev != 0.0 {
                returns.push((curr - prev) / prev);
            }
        }

        let mean_return = if returns.is_empty() {
            0.0
        } else {
            returns.iter().sum::<f64>() / returns.len() as f64
        };
        let intrabar_volatility = if returns.is_empty() {
            0.0
        } else {
            (returns.iter().map(|r| (r - mean_return).powi(2)).sum::<f64>() / returns.len() as f64)
                .sqrt()
        };

        let abs_returns: Vec<f64> = returns.iter().map(|r| r.abs()).collect();
        let mean_abs = if abs_returns.is_empty() {
            0.0
        } else {
            abs_returns.iter().sum::<f64>() / abs_returns.len() as f64
        };
        let volatility_clustering = if abs_returns.is_empty() {
            0.0
        } else {
            (abs_returns
                .iter()
                .map(|r| (r - mean_abs).powi(2))
                .sum::<f64>()
                / abs_returns.len() as f64)
                .sqrt()
        };

        let mut direction_reversals = 0u32;
        let mut last_sign = 0i32;
        let mut consecutive_direction = 0i32;
        for r in &returns {
            let sign = if *r > 0.0 {
                1
            } else if *r < 0.0 {
                -1
            } else {
                0
            };
            if sign != 0 {
                if last_sign != 0 && sign != last_sign {
                    direction_reversals += 1;
                }
                if sign == consecutive_direction.signum() || consecutive_direction == 0 {
                    consecutive_direction += sign;
                } else {
                    consecutive_direction = sign;
                }
                last_sign = sign;
            }
        }

        let mut cumulative = 0.0;
        let mut peak = 0.0;
        let mut max_intrabar_drawdown = 0.0;
        for r in &returns {
            cumulative += r;
            if cumulative > peak {
                peak = cumulative;
            }
            let drawdown = peak - cumulative;
            if drawdown > max_intrabar_drawdown {
                max_intrabar_drawdown = drawdown;
            }
        }

        let average_candle_size =
            constituents.iter().map(|c| to_f64(c.high) - to_f64(c.low)).sum::<f64>() / n;

        Self {
            velocity,
            velocity_acceleration,
            volume_spike,
            volume_distribution_over_midprice,
            body_to_wick_ratio,
            close_position_in_range,
            consecutive_direction,
            intrabar_volatility,
            volatility_clustering,
            direction_reversals,
            max_intrabar_drawdown,
            average_candle_size,
        }
    }

    /// Flattens this block into a name → value map for condition/filter
    /// resolution (§4.7 "consumable by filters"). Booleans become 1/0.
    pub fn to_field_map(&self) -> HashMap<String, Decimal> {
        let d = |v: f64| Decimal::from_f64_retain(v).unwrap_or(Decimal::ZERO);
        HashMap::from([
            ("velocity".to_string(), d(self.velocity)),
            ("velocity_acceleration".to_string(), d(self.velocity_acceleration)),
            ("volume_spike".to_string(), if self.volume_spike { Decimal::ONE } else { Decimal::ZERO }),
            (
                "volume_distribution_over_midprice".to_string(),
                d(self.volume_distribution_over_midprice),
            ),
            ("body_to_wick_ratio".to_string(), d(self.body_to_wick_ratio)),
            ("close_position_in_range".to_string(), d(self.close_position_in_range)),
            ("consecutive_direction".to_string(), Decimal::from(self.consecutive_direction)),
            ("intrabar_volatility".to_string(), d(self.intrabar_volatility)),
            ("volatility_clustering".to_string(), d(self.volatility_clustering)),
            ("direction_reversals".to_string(), Decimal::from(self.direction_reversals)),
            ("max_intrabar_drawdown".to_string(), d(self.max_intrabar_drawdown)),
            ("average_candle_size".to_string(), d(self.average_candle_size)),
        ])
    }
}
