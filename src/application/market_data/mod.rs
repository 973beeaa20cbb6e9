// Market data processing modules
pub mod cache_provider;
pub mod synthetic;
pub mod timeframe_aggregator;
