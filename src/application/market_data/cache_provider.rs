//! Turns "give me candles for symbol between t0 and t1" into the minimum
//! amount of exchange work possible, backed by a [`CandleCache`] (§4.7).

use crate::config::{CacheConfig, ExchangeConfig};
use crate::domain::errors::CacheError;
use crate::domain::market::candle::Candle;
use crate::domain::market::timeframe::Timeframe;
use crate::domain::ports::{CandleCache, ExchangeClient};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::{Mutex, Notify};
use tracing::{debug, warn};

/// One batch's worth of download progress, delivered to an optional
/// caller-supplied channel (§4.7 "Progress reporting").
#[derive(Debug, Clone)]
pub struct DownloadProgress {
    pub message: String,
    pub loaded: Option<u64>,
    pub total: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadState {
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone)]
pub struct DownloadStatus {
    pub state: DownloadState,
    pub loaded: u64,
    pub total: u64,
    pub message: String,
}

/// Candle counts and timing for one `fetch_cached_candles` call.
#[derive(Debug, Clone, Copy, Default)]
pub struct FetchStats {
    pub from_cache: usize,
    pub from_api: usize,
    pub saved_to_cache: usize,
    pub total_time_ms: u64,
}

struct DownloadSlot {
    status: DownloadStatus,
    notify: Arc<Notify>,
}

/// Composes a cache and an exchange client behind the single `fetch`
/// procedure described in §4.7, with a process-wide single-flight map so
/// concurrent requests for the same symbol attach to one in-flight
/// download instead of racing the exchange (§5).
pub struct CachedDataProvider {
    cache: Arc<dyn CandleCache>,
    exchange: Arc<dyn ExchangeClient>,
    cache_config: CacheConfig,
    exchange_config: ExchangeConfig,
    active_downloads: Arc<Mutex<HashMap<String, DownloadSlot>>>,
    cache_enabled: bool,
}

impl CachedDataProvider {
    pub fn new(
        cache: Arc<dyn CandleCache>,
        exchange: Arc<dyn ExchangeClient>,
        cache_config: CacheConfig,
        exchange_config: ExchangeConfig,
    ) -> Self {
        Self {
            cache,
            exchange,
            cache_config,
            exchange_config,
            active_downloads: Arc::new(Mutex::new(HashMap::new())),
            cache_enabled: true,
        }
    }

    /// Disables the cache for this provider; every fetch streams the
    /// exchange directly (§4.7 step 5).
    pub fn without_cache(mut self) -> Self {
        self.cache_enabled = false;
        self
    }

    pub async fn download_status(&self, symbol: &str) -> Option<DownloadStatus> {
        self.active_downloads
            .lock()
            .await
            .get(symbol)
            .map(|slot| slot.status.clone())
    }

    pub async fn fetch_cached_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        start: i64,
        end: i64,
        progress: Option<tokio::sync::mpsc::Sender<DownloadProgress>>,
    ) -> Result<(Vec<Candle>, FetchStats), CacheError> {
        if let Some(notify) = self.attach_or_start(symbol).await {
            notify.notified().await;
        }

        let result = self.fetch_inner(symbol, timeframe, start, end, &progress).await;
        self.finish(symbol, &result).await;
        result
    }

    /// Returns `Some(notify)` if an identical download was already running
    /// and the caller should wait on it instead of starting a new one.
    async fn attach_or_start(&self, symbol: &str) -> Option<Arc<Notify>> {
        let mut downloads = self.active_downloads.lock().await;
        if let Some(slot) = downloads.get(symbol) {
            if slot.status.state == DownloadState::Running {
                return Some(slot.notify.clone());
            }
        }
        downloads.insert(
            symbol.to_string(),
            DownloadSlot {
                status: DownloadStatus {
                    state: DownloadState::Running,
                    loaded: 0,
                    total: 0,
                    message: "starting".to_string(),
                },
                notify: Arc::new(Notify::new()),
            },
        );
        None
    }

    async fn finish(&self, symbol: &str, result: &Result<(Vec<Candle>, FetchStats), CacheError>) {
        let mut downloads = self.active_downloads.lock().await;
        if let Some(slot) = downloads.get_mut(symbol) {
            slot.status.state = match result {
                Ok(_) => DownloadState::Completed,
                Err(_) => DownloadState::Failed,
            };
            slot.status.message = match result {
                Ok((candles, _)) => format!("completed: {} candles", candles.len()),
                Err(e) => e.to_string(),
            };
            slot.notify.notify_waiters();
        }
    }

    async fn fetch_inner(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        start: i64,
        end: i64,
        progress: &Option<tokio::sync::mpsc::Sender<DownloadProgress>>,
    ) -> Result<(Vec<Candle>, FetchStats), CacheError> {
        let started = std::time::Instant::now();
        let step = Timeframe::OneMin.to_millis();

        if !self.cache_enabled {
            let candles = self.stream_exchange(symbol, start, end, progress).await?;
            return Ok((
                candles.clone(),
                FetchStats {
                    from_cache: 0,
                    from_api: candles.len(),
                    saved_to_cache: 0,
                    total_time_ms: started.elapsed().as_millis() as u64,
                },
            ));
        }

        let cached = match self.cache.read_range(symbol, Timeframe::OneMin, start, end).await {
            Ok(candles) => candles,
            Err(e) => {
                warn!(%symbol, error = %e, "cache read failed, falling back to direct exchange fetch");
                let candles = self.stream_exchange(symbol, start, end, progress).await?;
                return Ok((
                    candles.clone(),
                    FetchStats {
                        from_cache: 0,
                        from_api: candles.len(),
                        saved_to_cache: 0,
                        total_time_ms: started.elapsed().as_millis() as u64,
                    },
                ));
            }
        };

        let existing: BTreeSet<i64> = cached.iter().map(|c| c.timestamp).collect();
        let missing = missing_ranges(&existing, start, end, step);

        let mut from_api = 0usize;
        let mut saved_to_cache = 0usize;
        let mut buffer: Vec<Candle> = Vec::new();

        for (range_start, range_end) in missing {
            let mut since = range_start;
            loop {
                let batch = self
                    .exchange
                    .fetch_ohlcv(symbol, Timeframe::OneMin, Some(since), self.exchange_config.page_size)
                    .await?;
                if batch.is_empty() {
                    break;
                }

                let filtered: Vec<Candle> = batch
                    .iter()
                    .copied()
                    .filter(|c| c.timestamp >= range_start && c.timestamp <= range_end)
                    .collect();
                from_api += filtered.len();

                if let Some(tx) = progress {
                    let _ = tx
                        .send(DownloadProgress {
                            message: format!("fetched {} candles for {symbol}", filtered.len()),
                            loaded: Some(from_api as u64),
                            total: None,
                        })
                        .await;
                }

                let last_ts = batch.last().map(|c| c.timestamp).unwrap_or(since);
                buffer.extend(filtered);

                if buffer.len() >= self.cache_config.upsert_batch_size {
                    self.cache.upsert_many(symbol, Timeframe::OneMin, &buffer).await?;
                    saved_to_cache += buffer.len();
                    buffer.clear();
                }

                if last_ts >= range_end || batch.len() < self.exchange_config.page_size {
                    break;
                }
                since = last_ts + step;
                tokio::time::sleep(std::time::Duration::from_millis(self.exchange_config.page_delay_ms))
                    .await;
            }
        }

        if !buffer.is_empty() {
            self.cache.upsert_many(symbol, Timeframe::OneMin, &buffer).await?;
            saved_to_cache += buffer.len();
        }

        let final_candles = self.cache.read_range(symbol, Timeframe::OneMin, start, end).await?;
        debug!(%symbol, from_cache = final_candles.len() - from_api, from_api, "fetch_cached_candles complete");

        Ok((
            final_candles,
            FetchStats {
                from_cache: cached.len(),
                from_api,
                saved_to_cache,
                total_time_ms: started.elapsed().as_millis() as u64,
            },
        ))
    }

    async fn stream_exchange(
        &self,
        symbol: &str,
        start: i64,
        end: i64,
        progress: &Option<tokio::sync::mpsc::Sender<DownloadProgress>>,
    ) -> Result<Vec<Candle>, CacheError> {
        let step = Timeframe::OneMin.to_millis();
        let mut since = start;
        let mut out = Vec::new();
        loop {
            let batch = self
                .exchange
                .fetch_ohlcv(symbol, Timeframe::OneMin, Some(since), self.exchange_config.page_size)
                .await?;
            if batch.is_empty() {
                break;
            }
            let filtered: Vec<Candle> =
                batch.iter().copied().filter(|c| c.timestamp >= start && c.timestamp <= end).collect();
            if let Some(tx) = progress {
                let _ = tx
                    .send(DownloadProgress {
                        message: format!("streamed {} candles for {symbol}", filtered.len()),
                        loaded: Some(out.len() as u64 + filtered.len() as u64),
                        total: None,
                    })
                    .await;
            }
            let last_ts = batch.last().map(|c| c.timestamp).unwrap_or(since);
            out.extend(filtered);
            if last_ts >= end || batch.len() < self.exchange_config.page_size {
                break;
            }
            since = last_ts + step;
            tokio::time::sleep(std::time::Duration::from_millis(self.exchange_config.page_delay_ms)).await;
        }
        Ok(out)
    }
}

/// Enumerates required timestamps `t0, t0+step, ..., <= t1`, collapses
/// those absent from `existing` into contiguous `[start, end]` ranges
/// (§4.7 "Missing-range scan").
fn missing_ranges(existing: &BTreeSet<i64>, start: i64, end: i64, step: i64) -> Vec<(i64, i64)> {
    let mut ranges = Vec::new();
    let mut run_start: Option<i64> = None;
    let mut t = start;
    let mut prev = start - step;

    while t <= end {
        if !existing.contains(&t) {
            if run_start.is_none() {
                run_start = Some(t);
            }
            prev = t;
        } else if let Some(s) = run_start.take() {
            ranges.push((s, prev));
        }
        t += step;
    }
    if let Some(s) = run_start {
        ranges.push((s, prev));
    }
    ranges
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_ranges_all_absent() {
        let existing = BTreeSet::new();
        let ranges = missing_ranges(&existing, 0, 300_000, 60_000);
        assert_eq!(ranges, vec![(0, 300_000)]);
    }

    #[test]
    fn test_missing_ranges_none_absent() {
        let existing: BTreeSet<i64> = (0..=300_000).step_by(60_000).collect();
        let ranges = missing_ranges(&existing, 0, 300_000, 60_000);
        assert!(ranges.is_empty());
    }

    #[test]
    fn test_missing_ranges_middle_gap() {
        let mut existing: BTreeSet<i64> = BTreeSet::new();
        existing.insert(0);
        existing.insert(60_000);
        existing.insert(240_000);
        existing.insert(300_000);
        let ranges = missing_ranges(&existing, 0, 300_000, 60_000);
        assert_eq!(ranges, vec![(120_000, 180_000)]);
    }
}
