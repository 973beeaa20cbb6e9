//! CLI harness for running one backtest against a strategy schema (§1.1).
//! Loads a JSON schema and a data source (synthetic, in-memory, or a
//! SQLite-backed cache fronting the mock exchange), runs the engine once,
//! and prints the result.

use anyhow::{Context, Result};
use chrono::{NaiveDate, TimeZone, Utc};
use clap::Parser;
use rustrade_backtest::application::engine::{BacktestEngine, BacktestStatus};
use rustrade_backtest::application::market_data::cache_provider::CachedDataProvider;
use rustrade_backtest::application::market_data::synthetic::SyntheticGenerator;
use rustrade_backtest::application::market_data::timeframe_aggregator::TimeframeAggregator;
use rustrade_backtest::config::{BacktestConfig, CacheConfig, ExchangeConfig};
use rustrade_backtest::domain::indicators::IndicatorRegistry;
use rustrade_backtest::domain::market::candle::Candle;
use rustrade_backtest::domain::market::timeframe::Timeframe;
use rustrade_backtest::domain::market::timeframe_candle::TimeframeCandle;
use rustrade_backtest::domain::strategy::schema::StrategySchema;
use rustrade_backtest::domain::trading::fee_model::PercentFeeModel;
use rustrade_backtest::infrastructure::{InMemoryCandleCache, MockExchangeClient, SqliteCandleCache};
use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(author, version, about = "Run a single strategy backtest", long_about = None)]
struct Cli {
    /// Path to a strategy schema JSON file.
    #[arg(short, long)]
    schema: PathBuf,

    /// Symbol to backtest, e.g. BTC/USD. Defaults to the schema's first symbol.
    #[arg(long)]
    symbol: Option<String>,

    /// Start date (YYYY-MM-DD).
    #[arg(long, default_value = "2024-01-01")]
    start: String,

    /// End date (YYYY-MM-DD).
    #[arg(long, default_value = "2024-02-01")]
    end: String,

    /// Candle source: "synthetic" (no persistence), "memory" (in-process
    /// cache over the mock exchange), or "sqlite" (persistent cache).
    #[arg(long, default_value = "synthetic")]
    source: String,

    /// Seed for the synthetic generator.
    #[arg(long, default_value = "42")]
    seed: u32,
}

fn parse_date_ms(s: &str) -> Result<i64> {
    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d").with_context(|| format!("invalid date: {s}"))?;
    let dt = Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0).unwrap());
    Ok(dt.timestamp_millis())
}

async fn load_candles(
    source: &str,
    symbol: &str,
    start: i64,
    end: i64,
    seed: u32,
) -> Result<Vec<Candle>> {
    match source {
        "synthetic" => {
            let count = ((end - start) / Timeframe::OneMin.to_millis()).max(1) as usize;
            let mut generator = SyntheticGenerator::new(seed);
            Ok(generator.generate(start, count, 50_000.0))
        }
        "memory" | "sqlite" => {
            let cache: Arc<dyn rustrade_backtest::domain::ports::CandleCache> = if source == "memory" {
                Arc::new(InMemoryCandleCache::new())
            } else {
                let cache_config = CacheConfig::from_env();
                Arc::new(SqliteCandleCache::connect(&cache_config.database_url).await?)
            };
            let exchange = Arc::new(MockExchangeClient::default());
            let provider = CachedDataProvider::new(
                cache,
                exchange,
                CacheConfig::from_env(),
                ExchangeConfig::from_env(),
            );
            let (candles, stats) = provider.fetch_cached_candles(symbol, Timeframe::OneMin, start, end, None).await?;
            info!(from_cache = stats.from_cache, from_api = stats.from_api, "loaded candles");
            Ok(candles)
        }
        other => anyhow::bail!("unknown source: {other} (expected synthetic, memory, or sqlite)"),
    }
}

fn build_mtf(
    primary: &[Candle],
    symbol: &str,
    timeframes: &[Timeframe],
) -> HashMap<Timeframe, Vec<TimeframeCandle>> {
    let mut aggregator = TimeframeAggregator::new();
    let mut out: HashMap<Timeframe, Vec<TimeframeCandle>> = HashMap::new();
    for candle in primary {
        for completed in aggregator.process_candle(symbol, candle, timeframes) {
            out.entry(completed.timeframe).or_default().push(completed);
        }
    }
    for completed in aggregator.flush(Some(symbol)) {
        out.entry(completed.timeframe).or_default().push(completed);
    }
    out
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let cli = Cli::parse();

    let schema_json = std::fs::read_to_string(&cli.schema)
        .with_context(|| format!("failed to read schema file: {}", cli.schema.display()))?;
    let schema: StrategySchema = serde_json::from_str(&schema_json).context("failed to parse strategy schema")?;

    let symbol = cli
        .symbol
        .clone()
        .or_else(|| schema.data.symbols.first().cloned())
        .context("no symbol given and schema has none configured")?;

    let start = parse_date_ms(&cli.start)?;
    let end = parse_date_ms(&cli.end)?;

    let candles = load_candles(&cli.source, &symbol, start, end, cli.seed).await?;
    info!(count = candles.len(), %symbol, "fetched primary series");

    let mtf = build_mtf(&candles, &symbol, &schema.data.additional_timeframes);

    let config = BacktestConfig::from_env(start, end);
    let fee_model = Arc::new(PercentFeeModel::new(config.commission_percent));
    let registry = Arc::new(IndicatorRegistry::with_builtins());
    let engine = BacktestEngine::new(config, fee_model, registry);

    let started_at = chrono::Utc::now().timestamp_millis();
    let result = engine.run(
        &format!("cli-{}", schema.id),
        schema,
        &candles,
        &mtf,
        &symbol,
        started_at,
        Arc::new(AtomicBool::new(false)),
        None,
    );

    print_result(&result);
    Ok(())
}

fn print_result(result: &rustrade_backtest::application::engine::BacktestResult) {
    println!("strategy:   {} v{}", result.strategy_id, result.strategy_version);
    println!("status:     {:?}", result.status);
    println!("candles:    {}/{}", result.processed_candles, result.total_candles);
    println!("trades:     {}", result.trades.len());

    if result.status != BacktestStatus::Completed {
        if let Some(err) = &result.error {
            println!("error:      {err}");
        }
        return;
    }

    if let Some(metrics) = &result.metrics {
        println!("final:      {}", metrics.final_capital);
        println!("return:     {:.2}%", metrics.total_return_percent);
        println!("max dd:     {:.2}%", metrics.max_drawdown_percent);
        println!("sharpe:     {:.2}", metrics.sharpe_ratio);
        println!("win rate:   {:.1}%", metrics.win_rate_percent);
    }
}
