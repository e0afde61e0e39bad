//! Telemetry metric name constants and defaults.
//!
//! Statistic timers live in a [`TimerRegistry`](crate::timer::TimerRegistry)
//! and are additionally forwarded to the `metrics` facade. Circuit breakers
//! report calls and transitions through the facade; their state and window
//! statistics are exported from the
//! [`CircuitBreakerRegistry`](crate::breaker::CircuitBreakerRegistry).
//! Consumers install their own `metrics` recorder (e.g. prometheus, statsd);
//! without a recorder installed, facade calls are no-ops.
//!
//! # Metric naming conventions
//!
//! Statistic timers are named `<base>_statistic_seconds`, where `<base>` is
//! the command or flow name. Facade-only metrics are prefixed with
//! `heimdall_`. Counters end in `_total`.
//!
//! # Common labels
//!
//! - `service`: command/flow name of a statistic timer
//! - `status`: terminal outcome of a cold pipeline: "complete", "cancel", "error"
//! - `name`: circuit breaker name
//! - `kind`: breaker call classification (see [`CIRCUIT_BREAKER_CALLS_TOTAL`])

use std::time::Duration;

/// Suffix inserted between the base name and the unit of a statistic timer.
pub const STATISTIC_SUFFIX: &str = "_statistic";

/// Base unit of every statistic timer.
pub const STATISTIC_UNIT: &str = "seconds";

/// Tag carrying the command/flow name.
pub const SERVICE_TAG: &str = "service";

/// Tag carrying the terminal outcome on cold pipelines.
pub const STATUS_TAG: &str = "status";

/// Tag added on read for published percentiles.
pub const QUANTILE_TAG: &str = "quantile";

/// Tag of cumulative histogram buckets.
pub const BUCKET_TAG: &str = "le";

/// Tag keys callers may not supply themselves.
pub const RESERVED_TAGS: &[&str] = &[SERVICE_TAG, STATUS_TAG, QUANTILE_TAG, BUCKET_TAG];

/// Percentiles published by statistic timers unless overridden.
pub const DEFAULT_PERCENTILES: &[f64] = &[0.5, 0.75, 0.95, 0.99];

/// Latency bucket boundaries seeded into every statistic timer unless the
/// hosting application supplies its own.
pub const DEFAULT_TIME_BUCKETS: &[Duration] = &[
    Duration::from_millis(10),
    Duration::from_millis(25),
    Duration::from_millis(50),
    Duration::from_millis(100),
    Duration::from_millis(200),
    Duration::from_millis(300),
    Duration::from_millis(500),
    Duration::from_millis(750),
    Duration::from_secs(1),
    Duration::from_secs(2),
    Duration::from_secs(5),
];

/// Deadline applied to a resilient call when none is configured.
pub const DEFAULT_RESILIENCE_TIMEOUT: Duration = Duration::from_millis(2000);

/// Calls observed by a circuit breaker.
///
/// Labels: `name`, `kind` ("successful" | "slow_successful" | "failed" |
/// "ignored" | "not_permitted").
pub const CIRCUIT_BREAKER_CALLS_TOTAL: &str = "heimdall_circuit_breaker_calls_total";

/// Current breaker state; 1.0 for the active state, 0.0 otherwise.
///
/// Labels: `name`, `state` ("closed" | "open" | "half_open").
pub const CIRCUIT_BREAKER_STATE: &str = "heimdall_circuit_breaker_state";

/// Breaker state transitions.
///
/// Labels: `name`, `from`, `to`.
pub const CIRCUIT_BREAKER_TRANSITIONS_TOTAL: &str = "heimdall_circuit_breaker_transitions_total";

/// Calls currently buffered in a breaker's window. Label: `name`.
pub const CIRCUIT_BREAKER_BUFFERED_CALLS: &str = "heimdall_circuit_breaker_buffered_calls";

/// Buffered calls classified as failures. Label: `name`.
pub const CIRCUIT_BREAKER_FAILED_CALLS: &str = "heimdall_circuit_breaker_failed_calls";

/// Buffered calls slower than the slow-call threshold. Label: `name`.
pub const CIRCUIT_BREAKER_SLOW_CALLS: &str = "heimdall_circuit_breaker_slow_calls";

/// Calls rejected while open. Label: `name`.
pub const CIRCUIT_BREAKER_NOT_PERMITTED_CALLS: &str =
    "heimdall_circuit_breaker_not_permitted_calls";

/// Failure percentage of the window; -1 until enough calls are buffered.
/// Label: `name`.
pub const CIRCUIT_BREAKER_FAILURE_RATE: &str = "heimdall_circuit_breaker_failure_rate";

/// Slow-call percentage of the window; -1 until enough calls are buffered.
/// Label: `name`.
pub const CIRCUIT_BREAKER_SLOW_CALL_RATE: &str = "heimdall_circuit_breaker_slow_call_rate";
