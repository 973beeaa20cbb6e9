pub mod candle;
pub mod dynamics;
pub mod timeframe;
pub mod timeframe_candle;
