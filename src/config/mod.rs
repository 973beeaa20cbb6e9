//! Environment-driven configuration for the backtest engine, cache, and
//! exchange client (§6.1). Every value falls back to a default silently on
//! an absent or unparseable env var — there is no hard failure at
//! config-load time.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::env;
use std::str::FromStr;

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

/// Fill model for simulated order execution (§6). Only `Realistic` is
/// normative; the others are accepted for schema compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillModel {
    Optimistic,
    Pessimistic,
    Realistic,
}

impl FromStr for FillModel {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "optimistic" => Ok(Self::Optimistic),
            "pessimistic" => Ok(Self::Pessimistic),
            "realistic" => Ok(Self::Realistic),
            _ => Err(()),
        }
    }
}

/// Source a backtest's candles are fetched from (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSource {
    Local,
    Exchange,
}

impl FromStr for DataSource {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "exchange" => Ok(Self::Exchange),
            _ => Err(()),
        }
    }
}

/// Configuration recognised by a single backtest run (§3.1, §6).
#[derive(Debug, Clone)]
pub struct BacktestConfig {
    pub start_date: i64,
    pub end_date: i64,
    pub initial_capital: Decimal,
    pub currency: String,
    pub commission_percent: Decimal,
    pub slippage_percent: Decimal,
    pub fill_model: FillModel,
    pub data_source: DataSource,
    /// How many candles between progress events (§9.1 decision: exposed as
    /// config rather than hardcoded).
    pub progress_interval: usize,
}

impl BacktestConfig {
    /// Builds a config for `[start_date, end_date]` from the env defaults in
    /// §6.1, overridable per-run by constructing the struct directly.
    pub fn from_env(start_date: i64, end_date: i64) -> Self {
        let initial_capital = env::var("BACKTEST_INITIAL_CAPITAL")
            .ok()
            .and_then(|v| Decimal::from_str(&v).ok())
            .unwrap_or(dec!(10000));
        let commission_percent = env::var("BACKTEST_COMMISSION_PERCENT")
            .ok()
            .and_then(|v| Decimal::from_str(&v).ok())
            .unwrap_or(dec!(0.1));
        let slippage_percent = env::var("BACKTEST_SLIPPAGE_PERCENT")
            .ok()
            .and_then(|v| Decimal::from_str(&v).ok())
            .unwrap_or(dec!(0.05));
        let fill_model = env::var("BACKTEST_FILL_MODEL")
            .ok()
            .and_then(|v| FillModel::from_str(&v).ok())
            .unwrap_or(FillModel::Realistic);
        let data_source = env::var("BACKTEST_DATA_SOURCE")
            .ok()
            .and_then(|v| DataSource::from_str(&v).ok())
            .unwrap_or(DataSource::Local);

        Self {
            start_date,
            end_date,
            initial_capital,
            currency: "USD".to_string(),
            commission_percent,
            slippage_percent,
            fill_model,
            data_source,
            progress_interval: 100,
        }
    }
}

/// Candle cache connection and batching parameters (§3.1, §6.1).
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub database_url: String,
    pub upsert_batch_size: usize,
}

impl CacheConfig {
    pub fn from_env() -> Self {
        Self {
            database_url: env::var("CACHE_DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://cache.db".to_string()),
            upsert_batch_size: env_or("CACHE_UPSERT_BATCH_SIZE", 1000),
        }
    }
}

/// Exchange client pagination/rate-limit parameters (§4.7, §6.1).
#[derive(Debug, Clone)]
pub struct ExchangeConfig {
    pub page_size: usize,
    pub page_delay_ms: u64,
    pub timeout_secs: u64,
}

impl ExchangeConfig {
    pub fn from_env() -> Self {
        Self {
            page_size: env_or("EXCHANGE_PAGE_SIZE", 200),
            page_delay_ms: env_or("EXCHANGE_PAGE_DELAY_MS", 100),
            timeout_secs: env_or("EXCHANGE_TIMEOUT_SECS", 30),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backtest_config_defaults() {
        let config = BacktestConfig::from_env(0, 1000);
        assert_eq!(config.initial_capital, dec!(10000));
        assert_eq!(config.fill_model, FillModel::Realistic);
        assert_eq!(config.data_source, DataSource::Local);
    }

    #[test]
    fn test_cache_config_defaults() {
        let config = CacheConfig::from_env();
        assert_eq!(config.database_url, "sqlite://cache.db");
        assert_eq!(config.upsert_batch_size, 1000);
    }

    #[test]
    fn test_exchange_config_defaults() {
        let config = ExchangeConfig::from_env();
        assert_eq!(config.page_size, 200);
        assert_eq!(config.page_delay_ms, 100);
        assert_eq!(config.timeout_secs, 30);
    }

    #[test]
    fn test_unparseable_env_falls_back_to_default() {
        unsafe {
            env::set_var("EXCHANGE_PAGE_SIZE", "not_a_number");
        }
        let config = ExchangeConfig::from_env();
        assert_eq!(config.page_size, 200);
        unsafe {
            env::remove_var("EXCHANGE_PAGE_SIZE");
        }
    }
}
