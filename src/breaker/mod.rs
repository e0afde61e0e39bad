//! Circuit breaking for downstream HTTP dependencies.

pub mod circuit;
pub mod policy;

pub use circuit::{
    CallPermit, CircuitBreaker, CircuitBreakerMetrics, CircuitBreakerRegistry, CircuitState,
};
pub use policy::{CircuitBreakerPolicy, FailureKind, Verdict};
