//! User-defined strategies as data: schema, expression language, and
//! condition evaluation (§4.2, §3). Strategies are not compiled Rust types
//! — they're a JSON-shaped schema interpreted at run time by the executor.

pub mod condition;
pub mod expr;
pub mod schema;

pub use condition::{CandleContext, EvalContext};
pub use schema::StrategySchema;
