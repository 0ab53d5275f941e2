mod circuit_breaker;
mod retry;

pub use circuit_breaker::{BreakerConfig, BreakerState, BreakerStatus, FaultToleranceGuard};
