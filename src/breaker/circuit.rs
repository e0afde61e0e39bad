//! Count-based circuit breaker.
//!
//! # States
//!
//! ```text
//! Closed ──[failure or slow-call rate ≥ threshold]──> Open
//!   ▲                                                  │
//!   │                                                  │ [wait duration elapsed]
//!   │                                                  ▼
//!   └──────[trial calls below thresholds]────────── HalfOpen
//!                [trial calls above thresholds] ──────> Open
//! ```
//!
//! Rates are computed over the last `sliding_window_size` recorded calls and
//! only once `minimum_number_of_calls` have been recorded. Ignored calls do
//! not enter the window.
//!
//! A caller first acquires a [`CallPermit`], performs the attempt, then
//! hands the outcome back via [`CallPermit::record`]. A permit dropped
//! without recording counts as a call timeout when its deadline has passed,
//! and is released silently otherwise.

use std::collections::VecDeque;
use std::fmt;
use std::fmt::Write as _;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use moka::sync::Cache;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::policy::{CircuitBreakerPolicy, FailureKind, Verdict};
use crate::telemetry::{
    CIRCUIT_BREAKER_BUFFERED_CALLS, CIRCUIT_BREAKER_CALLS_TOTAL, CIRCUIT_BREAKER_FAILED_CALLS,
    CIRCUIT_BREAKER_FAILURE_RATE, CIRCUIT_BREAKER_NOT_PERMITTED_CALLS,
    CIRCUIT_BREAKER_SLOW_CALL_RATE, CIRCUIT_BREAKER_SLOW_CALLS, CIRCUIT_BREAKER_STATE,
    CIRCUIT_BREAKER_TRANSITIONS_TOTAL,
};
use crate::timer::Sample;
use crate::{HeimdallError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }

    const ALL: [CircuitState; 3] = [
        CircuitState::Closed,
        CircuitState::Open,
        CircuitState::HalfOpen,
    ];
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time view of a breaker's statistics.
#[derive(Debug, Clone, PartialEq)]
pub struct CircuitBreakerMetrics {
    pub state: CircuitState,
    /// Calls currently in the sliding window (or half-open trial buffer).
    pub buffered_calls: usize,
    pub failed_calls: usize,
    pub slow_calls: usize,
    /// `None` until the minimum number of calls has been recorded.
    pub failure_rate: Option<f32>,
    /// `None` until the minimum number of calls has been recorded.
    pub slow_call_rate: Option<f32>,
    /// Calls rejected since the breaker was created or last reset.
    pub not_permitted_calls: u64,
}

/// Circuit breaker guarding one downstream dependency.
pub struct CircuitBreaker {
    name: String,
    policy: CircuitBreakerPolicy,
    inner: Mutex<Inner>,
}

struct Inner {
    state: CircuitState,
    // Bumped on every transition; permits from an earlier epoch are stale.
    epoch: u64,
    window: VecDeque<Verdict>,
    opened_at: Option<Instant>,
    trials_in_flight: usize,
    trial_results: Vec<Verdict>,
    not_permitted: u64,
}

impl Inner {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            epoch: 0,
            window: VecDeque::new(),
            opened_at: None,
            trials_in_flight: 0,
            trial_results: Vec::new(),
            not_permitted: 0,
        }
    }
}

type Transition = (CircuitState, CircuitState);

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("state", &self.state())
            .finish()
    }
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, policy: CircuitBreakerPolicy) -> Self {
        let breaker = Self {
            name: name.into(),
            policy,
            inner: Mutex::new(Inner::new()),
        };
        breaker.publish_state(CircuitState::Closed);
        breaker
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn policy(&self) -> &CircuitBreakerPolicy {
        &self.policy
    }

    /// Current state. An open breaker whose wait has elapsed reports
    /// half-open.
    pub fn state(&self) -> CircuitState {
        let (state, transition) = {
            let mut inner = self.lock();
            let transition = self.maybe_half_open(&mut inner, Instant::now());
            (inner.state, transition)
        };
        self.announce(transition);
        state
    }

    /// Ask to perform one call.
    ///
    /// `deadline` is when the caller gives up; a permit dropped after it
    /// counts as a timed-out call.
    pub fn try_acquire_permission(
        self: &Arc<Self>,
        deadline: Option<Instant>,
    ) -> Result<CallPermit> {
        let now = Instant::now();
        let (permit, transition) = {
            let mut inner = self.lock();
            let transition = self.maybe_half_open(&mut inner, now);
            let permitted = match inner.state {
                CircuitState::Closed => Some(false),
                CircuitState::Open => None,
                CircuitState::HalfOpen => {
                    let used = inner.trials_in_flight + inner.trial_results.len();
                    if used < self.policy.permitted_calls_in_half_open_state {
                        inner.trials_in_flight += 1;
                        Some(true)
                    } else {
                        None
                    }
                }
            };
            if permitted.is_none() {
                inner.not_permitted += 1;
            }
            let permit = permitted.map(|trial| CallPermit {
                breaker: Arc::clone(self),
                acquired_at: now,
                deadline,
                epoch: inner.epoch,
                trial,
                settled: false,
            });
            (permit, transition)
        };
        self.announce(transition);

        match permit {
            Some(permit) => Ok(permit),
            None => {
                self.count_call("not_permitted");
                debug!(breaker = %self.name, "call not permitted");
                Err(HeimdallError::CircuitOpen {
                    name: self.name.clone(),
                })
            }
        }
    }

    /// Statistics snapshot.
    pub fn metrics(&self) -> CircuitBreakerMetrics {
        let inner = self.lock();
        let calls: Vec<Verdict> = match inner.state {
            CircuitState::HalfOpen => inner.trial_results.clone(),
            _ => inner.window.iter().copied().collect(),
        };
        let minimum = match inner.state {
            CircuitState::HalfOpen => self.policy.permitted_calls_in_half_open_state,
            _ => self.policy.effective_minimum_calls(),
        };
        let rates = Rates::of(&calls);
        let evaluated = calls.len() >= minimum;
        CircuitBreakerMetrics {
            state: inner.state,
            buffered_calls: calls.len(),
            failed_calls: rates.failed,
            slow_calls: rates.slow,
            failure_rate: evaluated.then(|| rates.failure_rate()),
            slow_call_rate: evaluated.then(|| rates.slow_call_rate()),
            not_permitted_calls: inner.not_permitted,
        }
    }

    /// Back to closed with empty statistics. Outstanding permits become stale.
    pub fn reset(&self) {
        let transition = {
            let mut inner = self.lock();
            let from = inner.state;
            let epoch = inner.epoch + 1;
            *inner = Inner::new();
            inner.epoch = epoch;
            (from != CircuitState::Closed).then_some((from, CircuitState::Closed))
        };
        self.announce(transition);
    }

    fn on_result(&self, epoch: u64, trial: bool, verdict: Verdict) {
        self.count_call(match verdict {
            Verdict::Success => "successful",
            Verdict::SlowSuccess => "slow_successful",
            Verdict::Ignored => "ignored",
            Verdict::Failure => "failed",
        });

        let transition = {
            let mut inner = self.lock();
            if inner.epoch != epoch {
                return;
            }
            match inner.state {
                CircuitState::Closed => self.record_closed(&mut inner, verdict),
                CircuitState::HalfOpen if trial => self.record_trial(&mut inner, verdict),
                _ => None,
            }
        };
        self.announce(transition);
    }

    fn on_release(&self, epoch: u64, trial: bool) {
        let mut inner = self.lock();
        if trial && inner.epoch == epoch && inner.state == CircuitState::HalfOpen {
            inner.trials_in_flight = inner.trials_in_flight.saturating_sub(1);
        }
    }

    fn record_closed(&self, inner: &mut Inner, verdict: Verdict) -> Option<Transition> {
        if verdict == Verdict::Ignored {
            return None;
        }
        inner.window.push_back(verdict);
        while inner.window.len() > self.policy.sliding_window_size {
            inner.window.pop_front();
        }
        if inner.window.len() < self.policy.effective_minimum_calls() {
            return None;
        }
        let calls: Vec<Verdict> = inner.window.iter().copied().collect();
        self.exceeds_thresholds(&calls)
            .then(|| self.transition(inner, CircuitState::Open))
    }

    fn record_trial(&self, inner: &mut Inner, verdict: Verdict) -> Option<Transition> {
        inner.trials_in_flight = inner.trials_in_flight.saturating_sub(1);
        if verdict == Verdict::Ignored {
            return None;
        }
        inner.trial_results.push(verdict);
        if inner.trial_results.len() < self.policy.permitted_calls_in_half_open_state {
            return None;
        }
        let to = if self.exceeds_thresholds(&inner.trial_results) {
            CircuitState::Open
        } else {
            CircuitState::Closed
        };
        Some(self.transition(inner, to))
    }

    fn exceeds_thresholds(&self, calls: &[Verdict]) -> bool {
        let rates = Rates::of(calls);
        rates.failure_rate() >= self.policy.failure_rate_threshold
            || rates.slow_call_rate() >= self.policy.slow_call_rate_threshold
    }

    fn maybe_half_open(&self, inner: &mut Inner, now: Instant) -> Option<Transition> {
        let opened_at = inner.opened_at?;
        if inner.state == CircuitState::Open
            && now.duration_since(opened_at) >= self.policy.wait_duration_in_open_state
        {
            Some(self.transition(inner, CircuitState::HalfOpen))
        } else {
            None
        }
    }

    fn transition(&self, inner: &mut Inner, to: CircuitState) -> Transition {
        let from = inner.state;
        inner.state = to;
        inner.epoch += 1;
        inner.window.clear();
        inner.trials_in_flight = 0;
        inner.trial_results.clear();
        inner.opened_at = (to == CircuitState::Open).then(Instant::now);
        (from, to)
    }

    fn announce(&self, transition: Option<Transition>) {
        let Some((from, to)) = transition else {
            return;
        };
        match to {
            CircuitState::Open => {
                warn!(breaker = %self.name, %from, "circuit breaker opened");
            }
            _ => {
                debug!(breaker = %self.name, %from, %to, "circuit breaker transition");
            }
        }
        metrics::counter!(
            CIRCUIT_BREAKER_TRANSITIONS_TOTAL,
            "name" => self.name.clone(),
            "from" => from.as_str(),
            "to" => to.as_str()
        )
        .increment(1);
        self.publish_state(to);
    }

    fn publish_state(&self, current: CircuitState) {
        for state in CircuitState::ALL {
            metrics::gauge!(
                CIRCUIT_BREAKER_STATE,
                "name" => self.name.clone(),
                "state" => state.as_str()
            )
            .set(if state == current { 1.0 } else { 0.0 });
        }
    }

    fn count_call(&self, kind: &'static str) {
        metrics::counter!(
            CIRCUIT_BREAKER_CALLS_TOTAL,
            "name" => self.name.clone(),
            "kind" => kind
        )
        .increment(1);
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

struct Rates {
    total: usize,
    failed: usize,
    slow: usize,
}

impl Rates {
    fn of(calls: &[Verdict]) -> Self {
        Self {
            total: calls.len(),
            failed: calls.iter().filter(|v| **v == Verdict::Failure).count(),
            slow: calls.iter().filter(|v| **v == Verdict::SlowSuccess).count(),
        }
    }

    fn failure_rate(&self) -> f32 {
        percentage(self.failed, self.total)
    }

    fn slow_call_rate(&self) -> f32 {
        percentage(self.slow, self.total)
    }
}

fn percentage(part: usize, total: usize) -> f32 {
    if total == 0 {
        0.0
    } else {
        part as f32 * 100.0 / total as f32
    }
}

/// Permission to perform one call through a [`CircuitBreaker`].
#[must_use = "a permit should be recorded with the call outcome"]
pub struct CallPermit {
    breaker: Arc<CircuitBreaker>,
    acquired_at: Instant,
    deadline: Option<Instant>,
    epoch: u64,
    trial: bool,
    settled: bool,
}

impl fmt::Debug for CallPermit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallPermit")
            .field("breaker", &self.breaker.name)
            .field("trial", &self.trial)
            .finish_non_exhaustive()
    }
}

impl CallPermit {
    pub fn elapsed(&self) -> Duration {
        self.acquired_at.elapsed()
    }

    /// Record a finished attempt and return how the breaker classified it.
    ///
    /// Errors that never reached the network are released without touching
    /// the statistics.
    pub fn record<T>(self, result: &Result<T>) -> Verdict {
        match result {
            Ok(_) => self.record_outcome(Ok(())),
            Err(err) => match err.failure_kind() {
                Some(kind) => self.record_outcome(Err(kind)),
                None => {
                    self.release();
                    Verdict::Ignored
                }
            },
        }
    }

    /// Record a classified attempt outcome.
    pub fn record_outcome(mut self, outcome: std::result::Result<(), FailureKind>) -> Verdict {
        self.settled = true;
        let verdict = self.breaker.policy.classify(outcome, self.elapsed());
        self.breaker.on_result(self.epoch, self.trial, verdict);
        verdict
    }

    /// Give the permit back without recording anything.
    pub fn release(mut self) {
        self.settled = true;
        self.breaker.on_release(self.epoch, self.trial);
    }
}

impl Drop for CallPermit {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        self.settled = true;
        let expired = self.deadline.is_some_and(|deadline| Instant::now() >= deadline);
        if expired {
            let verdict = self
                .breaker
                .policy
                .classify(Err(FailureKind::CallTimeout), self.elapsed());
            self.breaker.on_result(self.epoch, self.trial, verdict);
        } else {
            self.breaker.on_release(self.epoch, self.trial);
        }
    }
}

/// Breakers by name. Lookups for the same name share one instance.
#[derive(Clone)]
pub struct CircuitBreakerRegistry {
    breakers: Cache<String, Arc<CircuitBreaker>>,
    default_policy: CircuitBreakerPolicy,
}

impl Default for CircuitBreakerRegistry {
    fn default() -> Self {
        Self::new(CircuitBreakerPolicy::default())
    }
}

impl fmt::Debug for CircuitBreakerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreakerRegistry")
            .field("breakers", &self.breakers.iter().count())
            .finish()
    }
}

impl CircuitBreakerRegistry {
    pub fn new(default_policy: CircuitBreakerPolicy) -> Self {
        Self {
            breakers: Cache::builder().build(),
            default_policy,
        }
    }

    /// Breaker named `name`, created with the default policy if absent.
    pub fn breaker(&self, name: &str) -> Arc<CircuitBreaker> {
        self.breaker_with(name, self.default_policy.clone())
    }

    /// Breaker named `name`, created with `policy` if absent. An existing
    /// breaker keeps the policy it was created with.
    pub fn breaker_with(&self, name: &str, policy: CircuitBreakerPolicy) -> Arc<CircuitBreaker> {
        self.breakers
            .get_with(name.to_owned(), || Arc::new(CircuitBreaker::new(name, policy)))
    }

    pub fn get(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.get(name)
    }

    /// All breakers, ordered by name.
    pub fn breakers(&self) -> Vec<Arc<CircuitBreaker>> {
        let mut breakers: Vec<_> = self.breakers.iter().map(|(_, b)| b).collect();
        breakers.sort_by(|a, b| a.name.cmp(&b.name));
        breakers
    }

    /// State and window statistics of every breaker, grouped by metric name.
    ///
    /// Rates read -1 while fewer than the minimum number of calls are
    /// buffered.
    pub fn samples(&self) -> Vec<Sample> {
        let snapshots: Vec<(String, CircuitBreakerMetrics)> = self
            .breakers()
            .iter()
            .map(|breaker| (breaker.name().to_owned(), breaker.metrics()))
            .collect();
        let gauge = |metric: &str, name: &str, value: f64| Sample {
            name: metric.to_owned(),
            labels: vec![("name".to_owned(), name.to_owned())],
            value,
        };

        let mut samples = Vec::new();
        for (name, metrics) in &snapshots {
            for state in CircuitState::ALL {
                let mut sample = gauge(
                    CIRCUIT_BREAKER_STATE,
                    name,
                    if metrics.state == state { 1.0 } else { 0.0 },
                );
                sample
                    .labels
                    .push(("state".to_owned(), state.as_str().to_owned()));
                samples.push(sample);
            }
        }

        let statistics: [(&str, fn(&CircuitBreakerMetrics) -> f64); 6] = [
            (CIRCUIT_BREAKER_BUFFERED_CALLS, |m| m.buffered_calls as f64),
            (CIRCUIT_BREAKER_FAILED_CALLS, |m| m.failed_calls as f64),
            (CIRCUIT_BREAKER_SLOW_CALLS, |m| m.slow_calls as f64),
            (CIRCUIT_BREAKER_NOT_PERMITTED_CALLS, |m| m.not_permitted_calls as f64),
            (CIRCUIT_BREAKER_FAILURE_RATE, |m| {
                m.failure_rate.map_or(-1.0, f64::from)
            }),
            (CIRCUIT_BREAKER_SLOW_CALL_RATE, |m| {
                m.slow_call_rate.map_or(-1.0, f64::from)
            }),
        ];
        for (metric, read) in statistics {
            for (name, metrics) in &snapshots {
                samples.push(gauge(metric, name, read(metrics)));
            }
        }
        samples
    }

    /// Render [`samples`](Self::samples) in the Prometheus text format.
    pub fn render(&self) -> String {
        let samples = self.samples();
        let mut out = String::new();
        let mut previous: Option<&str> = None;
        for sample in &samples {
            if previous != Some(sample.name.as_str()) {
                let _ = writeln!(out, "# TYPE {} gauge", sample.name);
                previous = Some(&sample.name);
            }
            let _ = writeln!(out, "{sample}");
        }
        out
    }
}
