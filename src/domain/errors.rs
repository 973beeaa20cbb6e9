use thiserror::Error;

/// Errors raised constructing or editing a strategy schema.
#[derive(Debug, Error)]
pub enum StrategyError {
    #[error("Invalid strategy: {reason}")]
    InvalidStrategy { reason: String },

    #[error("Unknown indicator type: {type_name}")]
    UnknownIndicatorType { type_name: String },
}

/// Errors raised by an individual indicator.
#[derive(Debug, Error)]
pub enum IndicatorError {
    #[error("Invalid parameters for {indicator}: {reason}")]
    InvalidParams { indicator: String, reason: String },

    #[error("Insufficient series for {indicator}: need {required} candles, got {got}")]
    InsufficientSeries {
        indicator: String,
        required: usize,
        got: usize,
    },
}

/// Errors surfaced by the backtest engine's run loop.
///
/// These correspond 1:1 to `BacktestResult::status` outcomes; the engine
/// never panics on a reachable bad input, it returns a failed/cancelled
/// result instead.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("No data in range")]
    NoDataInRange,

    #[error("Insufficient data: strategy requires {required} candles, got {got}")]
    InsufficientData { required: usize, got: usize },

    #[error("Backtest cancelled")]
    Cancelled,

    #[error("Runtime error: {reason}")]
    Runtime { reason: String },
}

/// Errors raised by the candle cache and cached data provider.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Exchange fetch failed: {reason}")]
    ExchangeFetchFailure { reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_error_formatting() {
        let err = EngineError::InsufficientData {
            required: 50,
            got: 10,
        };
        let msg = err.to_string();
        assert!(msg.contains("50"));
        assert!(msg.contains("10"));
    }

    #[test]
    fn test_strategy_error_formatting() {
        let err = StrategyError::UnknownIndicatorType {
            type_name: "FOO".to_string(),
        };
        assert!(err.to_string().contains("FOO"));
    }
}
