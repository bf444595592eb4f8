// Connection pooling, executors and transaction sessions
pub mod context;
pub mod executor;
pub mod manager;
pub mod pool;
pub mod transaction;

pub use context::ActionContext;
pub use executor::{PoolExecutor, QueryExecutor, SessionExecutor};
pub use manager::{SessionInfo, SessionManager, SessionSummary};
pub use pool::{ConnectionPool, PoolStats};
pub use transaction::{BatchOperation, IsolationLevel};
