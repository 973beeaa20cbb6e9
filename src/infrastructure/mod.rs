//! Concrete adapters for the ports declared in `domain::ports` (§4.7.1).
pub mod cache;
pub mod exchange;

pub use cache::{InMemoryCandleCache, SqliteCandleCache};
pub use exchange::MockExchangeClient;
