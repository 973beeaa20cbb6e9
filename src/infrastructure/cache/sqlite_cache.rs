//! SQLite-backed [`CandleCache`] (§4.7.1). Candles and their per-symbol
//! metadata are tables unique on `(symbol, timeframe, timestamp)` /
//! `(symbol, timeframe)`; money fields are stored as `TEXT` and round-tripped
//! through `Decimal`'s `Display`/`FromStr`, matching this codebase's existing
//! persistence layer.

use crate::domain::errors::CacheError;
use crate::domain::market::candle::Candle;
use crate::domain::market::timeframe::Timeframe;
use crate::domain::ports::{CandleCache, CandleMetadata};
use anyhow::Context;
use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::path::Path;
use std::str::FromStr;

fn cache_unavailable(err: impl std::fmt::Display) -> CacheError {
    CacheError::Unavailable { reason: err.to_string() }
}

pub struct SqliteCandleCache {
    pool: SqlitePool,
}

impl SqliteCandleCache {
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        if let Some(path_part) = database_url.strip_prefix("sqlite://") {
            let path = Path::new(path_part);
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() && !parent.exists() {
                    tokio::fs::create_dir_all(parent)
                        .await
                        .context("failed to create cache database directory")?;
                }
            }
        }

        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .context("failed to connect to candle cache database")?;

        let cache = Self { pool };
        cache.init().await?;
        Ok(cache)
    }

    async fn init(&self) -> anyhow::Result<()> {
        let mut conn = self.pool.acquire().await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS candles (
                symbol TEXT NOT NULL,
                timeframe TEXT NOT NULL,
                timestamp INTEGER NOT NULL,
                open TEXT NOT NULL,
                high TEXT NOT NULL,
                low TEXT NOT NULL,
                close TEXT NOT NULL,
                volume TEXT NOT NULL,
                created_at INTEGER DEFAULT (strftime('%s', 'now')),
                PRIMARY KEY (symbol, timeframe, timestamp)
            );
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("failed to create candles table")?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_candles_symbol_timeframe_time
            ON candles (symbol, timeframe, timestamp);
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("failed to create candle index")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS candle_metadata (
                symbol TEXT NOT NULL,
                timeframe TEXT NOT NULL,
                first_timestamp INTEGER NOT NULL,
                last_timestamp INTEGER NOT NULL,
                candle_count INTEGER NOT NULL,
                updated_at INTEGER DEFAULT (strftime('%s', 'now')),
                PRIMARY KEY (symbol, timeframe)
            );
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("failed to create candle_metadata table")?;

        Ok(())
    }
}

#[async_trait]
impl CandleCache for SqliteCandleCache {
    async fn upsert_many(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        candles: &[Candle],
    ) -> Result<(), CacheError> {
        if candles.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await.map_err(cache_unavailable)?;
        let tf = timeframe.to_string();

        for candle in candles {
            sqlx::query(
                r#"
                INSERT INTO candles (symbol, timeframe, timestamp, open, high, low, close, volume)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(symbol, timeframe, timestamp) DO UPDATE SET
                    open = excluded.open,
                    high = excluded.high,
                    low = excluded.low,
                    close = excluded.close,
                    volume = excluded.volume
                "#,
            )
            .bind(symbol)
            .bind(&tf)
            .bind(candle.timestamp)
            .bind(candle.open.to_string())
            .bind(candle.high.to_string())
            .bind(candle.low.to_string())
            .bind(candle.close.to_string())
            .bind(candle.volume.to_string())
            .execute(&mut *tx)
            .await
            .map_err(cache_unavailable)?;
        }

        let first = candles.iter().map(|c| c.timestamp).min().unwrap();
        let last = candles.iter().map(|c| c.timestamp).max().unwrap();

        sqlx::query(
            r#"
            INSERT INTO candle_metadata (symbol, timeframe, first_timestamp, last_timestamp, candle_count)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(symbol, timeframe) DO UPDATE SET
                first_timestamp = MIN(first_timestamp, excluded.first_timestamp),
                last_timestamp = MAX(last_timestamp, excluded.last_timestamp),
                candle_count = (SELECT COUNT(*) FROM candles WHERE symbol = ? AND timeframe = ?),
                updated_at = strftime('%s', 'now')
            "#,
        )
        .bind(symbol)
        .bind(&tf)
        .bind(first)
        .bind(last)
        .bind(candles.len() as i64)
        .bind(symbol)
        .bind(&tf)
        .execute(&mut *tx)
        .await
        .map_err(cache_unavailable)?;

        tx.commit().await.map_err(cache_unavailable)?;
        Ok(())
    }

    async fn read_range(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        start: i64,
        end: i64,
    ) -> Result<Vec<Candle>, CacheError> {
        let rows = sqlx::query(
            r#"
            SELECT timestamp, open, high, low, close, volume FROM candles
            WHERE symbol = ? AND timeframe = ? AND timestamp >= ? AND timestamp <= ?
            ORDER BY timestamp ASC
            "#,
        )
        .bind(symbol)
        .bind(timeframe.to_string())
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await
        .map_err(cache_unavailable)?;

        let mut candles = Vec::with_capacity(rows.len());
        for row in rows {
            let open: String = row.try_get("open").map_err(cache_unavailable)?;
            let high: String = row.try_get("high").map_err(cache_unavailable)?;
            let low: String = row.try_get("low").map_err(cache_unavailable)?;
            let close: String = row.try_get("close").map_err(cache_unavailable)?;
            let volume: String = row.try_get("volume").map_err(cache_unavailable)?;
            candles.push(Candle::new(
                row.try_get("timestamp").map_err(cache_unavailable)?,
                Decimal::from_str(&open).unwrap_or_default(),
                Decimal::from_str(&high).unwrap_or_default(),
                Decimal::from_str(&low).unwrap_or_default(),
                Decimal::from_str(&close).unwrap_or_default(),
                Decimal::from_str(&volume).unwrap_or_default(),
            ));
        }
        Ok(candles)
    }

    async fn delete_many(
        &self,
        symbol: Option<&str>,
        timeframe: Option<Timeframe>,
    ) -> Result<(), CacheError> {
        match (symbol, timeframe) {
            (Some(symbol), Some(timeframe)) => {
                sqlx::query("DELETE FROM candles WHERE symbol = ? AND timeframe = ?")
                    .bind(symbol)
                    .bind(timeframe.to_string())
                    .execute(&self.pool)
                    .await
                    .map_err(cache_unavailable)?;
                sqlx::query("DELETE FROM candle_metadata WHERE symbol = ? AND timeframe = ?")
                    .bind(symbol)
                    .bind(timeframe.to_string())
                    .execute(&self.pool)
                    .await
                    .map_err(cache_unavailable)?;
            }
            (Some(symbol), None) => {
                sqlx::query("DELETE FROM candles WHERE symbol = ?")
                    .bind(symbol)
                    .execute(&self.pool)
                    .await
                    .map_err(cache_unavailable)?;
                sqlx::query("DELETE FROM candle_metadata WHERE symbol = ?")
                    .bind(symbol)
                    .execute(&self.pool)
                    .await
                    .map_err(cache_unavailable)?;
            }
            (None, Some(timeframe)) => {
                sqlx::query("DELETE FROM candles WHERE timeframe = ?")
                    .bind(timeframe.to_string())
                    .execute(&self.pool)
                    .await
                    .map_err(cache_unavailable)?;
                sqlx::query("DELETE FROM candle_metadata WHERE timeframe = ?")
                    .bind(timeframe.to_string())
                    .execute(&self.pool)
                    .await
                    .map_err(cache_unavailable)?;
            }
            (None, None) => {
                sqlx::query("DELETE FROM candles").execute(&self.pool).await.map_err(cache_unavailable)?;
                sqlx::query("DELETE FROM candle_metadata")
                    .execute(&self.pool)
                    .await
                    .map_err(cache_unavailable)?;
            }
        }
        Ok(())
    }

    async fn metadata(
        &self,
        symbol: &str,
        timeframe: Timeframe,
    ) -> Result<Option<CandleMetadata>, CacheError> {
        let row = sqlx::query(
            "SELECT first_timestamp, last_timestamp, candle_count FROM candle_metadata WHERE symbol = ? AND timeframe = ?",
        )
        .bind(symbol)
        .bind(timeframe.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(cache_unavailable)?;

        let Some(row) = row else { return Ok(None) };
        Ok(Some(CandleMetadata {
            first_ts: row.try_get("first_timestamp").map_err(cache_unavailable)?,
            last_ts: row.try_get("last_timestamp").map_err(cache_unavailable)?,
            count: row.try_get("candle_count").map_err(cache_unavailable)?,
        }))
    }
}
