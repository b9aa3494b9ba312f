pub mod breaker;
pub mod gas;
pub mod nonce;
pub mod transaction;

pub use breaker::{CircuitBreaker, CircuitBreakerState};
pub use gas::GasEstimator;
pub use nonce::NonceSequencer;
pub use transaction::RouteExecutor;
