//! In-process [`CandleCache`], for tests and for running without a SQLite
//! file on disk (§4.7.1 "a pure in-memory cache ... lets the provider's
//! fetch/merge logic be exercised without a filesystem").

use crate::domain::errors::CacheError;
use crate::domain::market::candle::Candle;
use crate::domain::market::timeframe::Timeframe;
use crate::domain::ports::{CandleCache, CandleMetadata};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::Mutex;

#[derive(Default)]
pub struct InMemoryCandleCache {
    store: Mutex<HashMap<(String, Timeframe), BTreeMap<i64, Candle>>>,
}

impl InMemoryCandleCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CandleCache for InMemoryCandleCache {
    async fn upsert_many(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        candles: &[Candle],
    ) -> Result<(), CacheError> {
        let mut store = self.store.lock().await;
        let series = store.entry((symbol.to_string(), timeframe)).or_default();
        for candle in candles {
            series.insert(candle.timestamp, *candle);
        }
        Ok(())
    }

    async fn read_range(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        start: i64,
        end: i64,
    ) -> Result<Vec<Candle>, CacheError> {
        let store = self.store.lock().await;
        let Some(series) = store.get(&(symbol.to_string(), timeframe)) else {
            return Ok(Vec::new());
        };
        Ok(series.range(start..=end).map(|(_, c)| *c).collect())
    }

    async fn delete_many(
        &self,
        symbol: Option<&str>,
        timeframe: Option<Timeframe>,
    ) -> Result<(), CacheError> {
        let mut store = self.store.lock().await;
        store.retain(|(s, tf), _| {
            let symbol_matches = symbol.is_none_or(|sym| sym != s);
            let timeframe_matches = timeframe.is_none_or(|t| t != *tf);
            symbol_matches || timeframe_matches
        });
        Ok(())
    }

    async fn metadata(
        &self,
        symbol: &str,
        timeframe: Timeframe,
    ) -> Result<Option<CandleMetadata>, CacheError> {
        let store = self.store.lock().await;
        let Some(series) = store.get(&(symbol.to_string(), timeframe)) else {
            return Ok(None);
        };
        if series.is_empty() {
            return Ok(None);
        }
        Ok(Some(CandleMetadata {
            first_ts: *series.keys().next().unwrap(),
            last_ts: *series.keys().next_back().unwrap(),
            count: series.len() as i64,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn candle(ts: i64, close: rust_decimal::Decimal) -> Candle {
        Candle::new(ts, close, close, close, close, dec!(10))
    }

    #[tokio::test]
    async fn test_upsert_and_read_range() {
        let cache = InMemoryCandleCache::new();
        cache
            .upsert_many("BTC/USD", Timeframe::OneMin, &[candle(0, dec!(1)), candle(60_000, dec!(2))])
            .await
            .unwrap();
        let read = cache.read_range("BTC/USD", Timeframe::OneMin, 0, 60_000).await.unwrap();
        assert_eq!(read.len(), 2);
    }

    #[tokio::test]
    async fn test_delete_many_all_clears_everything() {
        let cache = InMemoryCandleCache::new();
        cache.upsert_many("BTC/USD", Timeframe::OneMin, &[candle(0, dec!(1))]).await.unwrap();
        cache.delete_many(None, None).await.unwrap();
        assert!(cache.read_range("BTC/USD", Timeframe::OneMin, 0, 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_metadata_none_when_empty() {
        let cache = InMemoryCandleCache::new();
        assert!(cache.metadata("BTC/USD", Timeframe::OneMin).await.unwrap().is_none());
    }
}
