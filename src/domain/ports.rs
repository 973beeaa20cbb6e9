//! Port interfaces the application layer depends on and the infrastructure
//! layer implements, mirroring this codebase's existing `async_trait`
//! service-boundary pattern (§4.7.1).

use crate::domain::errors::CacheError;
use crate::domain::market::candle::Candle;
use crate::domain::market::timeframe::Timeframe;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Earliest/latest timestamp and count on hand for one (symbol, timeframe)
/// pair (§3 `Candle Metadata`).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CandleMetadata {
    pub first_ts: i64,
    pub last_ts: i64,
    pub count: i64,
}

/// A persistent ordered store of OHLCV candles keyed by (symbol, timeframe,
/// timestamp), with range reads and bulk writes (§4.7).
#[async_trait]
pub trait CandleCache: Send + Sync {
    async fn upsert_many(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        candles: &[Candle],
    ) -> Result<(), CacheError>;

    async fn read_range(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        start: i64,
        end: i64,
    ) -> Result<Vec<Candle>, CacheError>;

    async fn delete_many(
        &self,
        symbol: Option<&str>,
        timeframe: Option<Timeframe>,
    ) -> Result<(), CacheError>;

    async fn metadata(
        &self,
        symbol: &str,
        timeframe: Timeframe,
    ) -> Result<Option<CandleMetadata>, CacheError>;
}

/// Read-only OHLCV fetch boundary (§6 "Exchange OHLCV fetch"). `limit` is
/// capped at 200 by the caller per the exchange's pagination contract.
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    async fn fetch_ohlcv(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        since_ms: Option<i64>,
        limit: usize,
    ) -> Result<Vec<Candle>, CacheError>;
}
