//! Shared types for the wallet orchestration system.

pub mod ids;
pub mod pool;
pub mod types;

pub use ids::PrefixCounter;
pub use pool::TaskPool;
pub use types::{ExecutionId, OrderId, TransactionId};
