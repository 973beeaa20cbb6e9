//! Fixture-backed [`ExchangeClient`]. Generates a deterministic synthetic
//! series per symbol so repeated calls for the same `(symbol, since_ms)`
//! return identical candles, and paginates it honoring `limit` like a real
//! OHLCV endpoint would (§4.7.1, §6 "Exchange OHLCV fetch").

use crate::application::market_data::synthetic::SyntheticGenerator;
use crate::domain::errors::CacheError;
use crate::domain::market::candle::Candle;
use crate::domain::market::timeframe::Timeframe;
use crate::domain::ports::ExchangeClient;
use async_trait::async_trait;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

fn seed_for(symbol: &str) -> u32 {
    let mut hasher = DefaultHasher::new();
    symbol.hash(&mut hasher);
    (hasher.finish() & 0xFFFF_FFFF) as u32
}

/// Stands in for a real exchange SDK binding. Emits 1-minute candles only,
/// matching [`CachedDataProvider`](crate::application::market_data::cache_provider::CachedDataProvider)'s
/// fetch contract, which always requests `Timeframe::OneMin` from the exchange
/// and aggregates higher timeframes itself.
pub struct MockExchangeClient {
    base_price: f64,
    available_candles: usize,
}

impl MockExchangeClient {
    pub fn new(base_price: f64, available_candles: usize) -> Self {
        Self { base_price, available_candles }
    }
}

impl Default for MockExchangeClient {
    fn default() -> Self {
        Self::new(50_000.0, 100_000)
    }
}

#[async_trait]
impl ExchangeClient for MockExchangeClient {
    async fn fetch_ohlcv(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        since_ms: Option<i64>,
        limit: usize,
    ) -> Result<Vec<Candle>, CacheError> {
        if timeframe != Timeframe::OneMin {
            return Err(CacheError::ExchangeFetchFailure {
                reason: format!("mock exchange only serves 1m candles, got {timeframe}"),
            });
        }

        let since = since_ms.unwrap_or(0);
        let start_index = (since / Timeframe::OneMin.to_millis()).max(0) as usize;
        if start_index >= self.available_candles {
            return Ok(Vec::new());
        }

        let count = limit.min(self.available_candles - start_index);
        let mut generator = SyntheticGenerator::new(seed_for(symbol));
        // Deterministic regardless of pagination offset: regenerate the full
        // prefix up to `start_index` and discard it, rather than seeding
        // mid-stream, so every page is reproducible from (symbol, since_ms).
        if start_index > 0 {
            generator.generate(0, start_index, self.base_price);
        }
        let aligned_start = start_index as i64 * Timeframe::OneMin.to_millis();
        Ok(generator.generate(aligned_start, count, self.base_price))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fetch_respects_limit() {
        let client = MockExchangeClient::default();
        let candles = client.fetch_ohlcv("BTC/USD", Timeframe::OneMin, None, 50).await.unwrap();
        assert_eq!(candles.len(), 50);
    }

    #[tokio::test]
    async fn test_same_symbol_and_since_is_deterministic() {
        let client = MockExchangeClient::default();
        let a = client.fetch_ohlcv("BTC/USD", Timeframe::OneMin, Some(600_000), 10).await.unwrap();
        let b = client.fetch_ohlcv("BTC/USD", Timeframe::OneMin, Some(600_000), 10).await.unwrap();
        assert_eq!(a.len(), b.len());
        for (ca, cb) in a.iter().zip(b.iter()) {
            assert_eq!(ca.timestamp, cb.timestamp);
            assert_eq!(ca.close, cb.close);
        }
    }

    #[tokio::test]
    async fn test_different_symbols_diverge() {
        let client = MockExchangeClient::default();
        let a = client.fetch_ohlcv("BTC/USD", Timeframe::OneMin, None, 20).await.unwrap();
        let b = client.fetch_ohlcv("ETH/USD", Timeframe::OneMin, None, 20).await.unwrap();
        assert!(a.iter().zip(b.iter()).any(|(ca, cb)| ca.close != cb.close));
    }

    #[tokio::test]
    async fn test_exhausted_range_returns_empty() {
        let client = MockExchangeClient::new(100.0, 10);
        let candles = client
            .fetch_ohlcv("BTC/USD", Timeframe::OneMin, Some(10 * Timeframe::OneMin.to_millis()), 10)
            .await
            .unwrap();
        assert!(candles.is_empty());
    }

    #[tokio::test]
    async fn test_wrong_timeframe_errors() {
        let client = MockExchangeClient::default();
        let result = client.fetch_ohlcv("BTC/USD", Timeframe::OneHour, None, 10).await;
        assert!(result.is_err());
    }
}
