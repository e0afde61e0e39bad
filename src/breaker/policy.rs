//! Circuit breaker policy and call classification.
//!
//! Classification is a pure function from what happened on the wire to a
//! [`Verdict`]. Client-side mistakes (bad request, not found) are ignored;
//! server and infrastructure failures are recorded; a success slower than
//! the slow-call threshold still counts against the breaker.
//!
//! ```rust
//! # use heimdall::breaker::{CircuitBreakerPolicy, FailureKind, Verdict};
//! # use std::time::Duration;
//! let policy = CircuitBreakerPolicy::new()
//!     .slow_call_duration_threshold(Duration::from_millis(1000))
//!     .wait_duration_in_open_state(Duration::from_millis(5000));
//!
//! assert_eq!(
//!     policy.classify(Err(FailureKind::NotFound), Duration::from_millis(5)),
//!     Verdict::Ignored,
//! );
//! assert_eq!(
//!     policy.classify(Ok(()), Duration::from_millis(1500)),
//!     Verdict::SlowSuccess,
//! );
//! ```

use std::fmt;
use std::time::Duration;

use serde::Deserialize;

/// Closed set of attempt failure kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// 400
    BadRequest,
    /// 404
    NotFound,
    /// Any other 4xx.
    OtherClientError,
    /// 500
    InternalServerError,
    /// 504
    GatewayTimeout,
    /// Any other non-2xx status.
    OtherServerError,
    /// The HTTP client's read/write timeout fired.
    ReadTimeout,
    /// Connection could not be established or broke mid-flight.
    Connect,
    /// Response body did not match the expected shape.
    Deserialization,
    /// The call's overall deadline passed.
    CallTimeout,
}

impl FailureKind {
    /// Kind of a non-success HTTP status.
    pub fn from_status(status: u16) -> Self {
        match status {
            400 => FailureKind::BadRequest,
            404 => FailureKind::NotFound,
            401..=499 => FailureKind::OtherClientError,
            500 => FailureKind::InternalServerError,
            504 => FailureKind::GatewayTimeout,
            _ => FailureKind::OtherServerError,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::BadRequest => "bad_request",
            FailureKind::NotFound => "not_found",
            FailureKind::OtherClientError => "other_client_error",
            FailureKind::InternalServerError => "internal_server_error",
            FailureKind::GatewayTimeout => "gateway_timeout",
            FailureKind::OtherServerError => "other_server_error",
            FailureKind::ReadTimeout => "read_timeout",
            FailureKind::Connect => "connect",
            FailureKind::Deserialization => "deserialization",
            FailureKind::CallTimeout => "call_timeout",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How one call outcome affects the breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Success,
    /// Returned data, but slower than the slow-call threshold.
    SlowSuccess,
    /// Does not touch breaker statistics.
    Ignored,
    Failure,
}

/// Breaker configuration for one downstream dependency.
#[derive(Debug, Clone, PartialEq)]
pub struct CircuitBreakerPolicy {
    /// Failure percentage at or above which the breaker opens. Default: 50.
    pub failure_rate_threshold: f32,
    /// Slow-call percentage at or above which the breaker opens. Default: 100.
    pub slow_call_rate_threshold: f32,
    /// Calls slower than this count as slow. Default: 60s.
    pub slow_call_duration_threshold: Duration,
    /// Time spent open before admitting trial calls. Default: 60s.
    pub wait_duration_in_open_state: Duration,
    /// Number of most recent calls the rates are computed over. Default: 100.
    pub sliding_window_size: usize,
    /// Calls required in the window before rates are evaluated. Default: 100.
    pub minimum_number_of_calls: usize,
    /// Trial calls admitted while half-open. Default: 1.
    pub permitted_calls_in_half_open_state: usize,
    /// Failure kinds that never count. Default: bad request, not found.
    pub ignore: Vec<FailureKind>,
    /// Failure kinds recorded as failures. Default: every server and
    /// infrastructure kind.
    pub record: Vec<FailureKind>,
}

impl Default for CircuitBreakerPolicy {
    fn default() -> Self {
        Self {
            failure_rate_threshold: 50.0,
            slow_call_rate_threshold: 100.0,
            slow_call_duration_threshold: Duration::from_secs(60),
            wait_duration_in_open_state: Duration::from_secs(60),
            sliding_window_size: 100,
            minimum_number_of_calls: 100,
            permitted_calls_in_half_open_state: 1,
            ignore: vec![FailureKind::BadRequest, FailureKind::NotFound],
            record: vec![
                FailureKind::InternalServerError,
                FailureKind::GatewayTimeout,
                FailureKind::OtherServerError,
                FailureKind::ReadTimeout,
                FailureKind::Connect,
                FailureKind::Deserialization,
                FailureKind::CallTimeout,
            ],
        }
    }
}

impl CircuitBreakerPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failure_rate_threshold(mut self, percent: f32) -> Self {
        self.failure_rate_threshold = percent;
        self
    }

    pub fn slow_call_rate_threshold(mut self, percent: f32) -> Self {
        self.slow_call_rate_threshold = percent;
        self
    }

    pub fn slow_call_duration_threshold(mut self, threshold: Duration) -> Self {
        self.slow_call_duration_threshold = threshold;
        self
    }

    pub fn wait_duration_in_open_state(mut self, wait: Duration) -> Self {
        self.wait_duration_in_open_state = wait;
        self
    }

    pub fn sliding_window_size(mut self, size: usize) -> Self {
        self.sliding_window_size = size.max(1);
        self
    }

    pub fn minimum_number_of_calls(mut self, calls: usize) -> Self {
        self.minimum_number_of_calls = calls.max(1);
        self
    }

    pub fn permitted_calls_in_half_open_state(mut self, calls: usize) -> Self {
        self.permitted_calls_in_half_open_state = calls.max(1);
        self
    }

    pub fn ignore_failures(mut self, kinds: &[FailureKind]) -> Self {
        self.ignore = kinds.to_vec();
        self
    }

    pub fn record_failures(mut self, kinds: &[FailureKind]) -> Self {
        self.record = kinds.to_vec();
        self
    }

    /// Classify one finished attempt.
    ///
    /// Ignore wins over record. Failures in neither list count as
    /// successes, subject to the slow-call threshold.
    pub fn classify(&self, outcome: Result<(), FailureKind>, elapsed: Duration) -> Verdict {
        match outcome {
            Err(kind) if self.ignore.contains(&kind) => Verdict::Ignored,
            Err(kind) if self.record.contains(&kind) => Verdict::Failure,
            _ if elapsed > self.slow_call_duration_threshold => Verdict::SlowSuccess,
            _ => Verdict::Success,
        }
    }

    /// Number of calls that must be buffered before rates are evaluated.
    pub(crate) fn effective_minimum_calls(&self) -> usize {
        self.minimum_number_of_calls.min(self.sliding_window_size).max(1)
    }
}
