//! Breaker state machine driven on a paused clock.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{advance, Instant};

use heimdall::breaker::{
    CircuitBreaker, CircuitBreakerPolicy, CircuitBreakerRegistry, CircuitState, FailureKind,
    Verdict,
};
use heimdall::HeimdallError;

fn breaker(policy: CircuitBreakerPolicy) -> Arc<CircuitBreaker> {
    Arc::new(CircuitBreaker::new("XKCD_GET_COMIC_INFO_BY_ID", policy))
}

fn window_of(size: usize) -> CircuitBreakerPolicy {
    CircuitBreakerPolicy::new()
        .sliding_window_size(size)
        .minimum_number_of_calls(size)
        .slow_call_duration_threshold(Duration::from_millis(1000))
        .wait_duration_in_open_state(Duration::from_millis(5000))
}

fn record(breaker: &Arc<CircuitBreaker>, outcome: Result<(), FailureKind>) -> Verdict {
    breaker
        .try_acquire_permission(None)
        .unwrap()
        .record_outcome(outcome)
}

fn trip(breaker: &Arc<CircuitBreaker>, calls: usize) {
    for _ in 0..calls {
        record(breaker, Err(FailureKind::InternalServerError));
    }
    assert_eq!(breaker.state(), CircuitState::Open);
}

#[tokio::test(start_paused = true)]
async fn hundred_bad_requests_keep_breaker_closed() {
    let breaker = breaker(CircuitBreakerPolicy::default());
    for _ in 0..100 {
        assert_eq!(record(&breaker, Err(FailureKind::BadRequest)), Verdict::Ignored);
    }
    assert_eq!(breaker.state(), CircuitState::Closed);
}

#[tokio::test(start_paused = true)]
async fn hundred_server_errors_open_breaker() {
    let breaker = breaker(CircuitBreakerPolicy::default());
    for _ in 0..99 {
        record(&breaker, Err(FailureKind::InternalServerError));
    }
    assert_eq!(breaker.state(), CircuitState::Closed);

    record(&breaker, Err(FailureKind::InternalServerError));
    assert_eq!(breaker.state(), CircuitState::Open);

    let metrics = breaker.metrics();
    assert_eq!(metrics.state, CircuitState::Open);
}

#[tokio::test(start_paused = true)]
async fn half_of_the_window_failing_opens() {
    let breaker = breaker(window_of(10));
    for i in 0..10 {
        let outcome = if i % 2 == 0 {
            Ok(())
        } else {
            Err(FailureKind::GatewayTimeout)
        };
        record(&breaker, outcome);
    }
    assert_eq!(breaker.state(), CircuitState::Open);
}

#[tokio::test(start_paused = true)]
async fn below_failure_threshold_stays_closed() {
    let breaker = breaker(window_of(10));
    for i in 0..10 {
        let outcome = if i < 4 {
            Err(FailureKind::ReadTimeout)
        } else {
            Ok(())
        };
        record(&breaker, outcome);
    }
    let metrics = breaker.metrics();
    assert_eq!(metrics.state, CircuitState::Closed);
    assert_eq!(metrics.failure_rate, Some(40.0));
    assert_eq!(metrics.failed_calls, 4);
}

#[tokio::test(start_paused = true)]
async fn slow_successes_open_breaker() {
    let breaker = breaker(window_of(4));
    for _ in 0..4 {
        let permit = breaker.try_acquire_permission(None).unwrap();
        advance(Duration::from_millis(1500)).await;
        assert_eq!(permit.record_outcome(Ok(())), Verdict::SlowSuccess);
    }
    assert_eq!(breaker.state(), CircuitState::Open);
    assert_eq!(breaker.metrics().failure_rate, None);
}

#[tokio::test(start_paused = true)]
async fn open_breaker_rejects_until_wait_elapses() {
    let breaker = breaker(window_of(4));
    trip(&breaker, 4);

    let err = breaker.try_acquire_permission(None).unwrap_err();
    assert!(matches!(err, HeimdallError::CircuitOpen { .. }));
    assert_eq!(breaker.metrics().not_permitted_calls, 1);

    advance(Duration::from_millis(4999)).await;
    assert_eq!(breaker.state(), CircuitState::Open);

    advance(Duration::from_millis(1)).await;
    assert_eq!(breaker.state(), CircuitState::HalfOpen);
}

#[tokio::test(start_paused = true)]
async fn successful_trial_closes_breaker() {
    let breaker = breaker(window_of(4));
    trip(&breaker, 4);
    advance(Duration::from_secs(5)).await;

    assert_eq!(record(&breaker, Ok(())), Verdict::Success);
    assert_eq!(breaker.state(), CircuitState::Closed);
    assert_eq!(breaker.metrics().buffered_calls, 0);
}

#[tokio::test(start_paused = true)]
async fn failed_trial_reopens_breaker() {
    let breaker = breaker(window_of(4));
    trip(&breaker, 4);
    advance(Duration::from_secs(5)).await;

    record(&breaker, Err(FailureKind::InternalServerError));
    assert_eq!(breaker.state(), CircuitState::Open);

    advance(Duration::from_secs(5)).await;
    assert_eq!(breaker.state(), CircuitState::HalfOpen);
}

#[tokio::test(start_paused = true)]
async fn half_open_admits_only_permitted_trials() {
    let breaker = breaker(window_of(4));
    trip(&breaker, 4);
    advance(Duration::from_secs(5)).await;

    let trial = breaker.try_acquire_permission(None).unwrap();
    assert!(breaker.try_acquire_permission(None).is_err());

    // Releasing the slot lets another trial through.
    trial.release();
    let trial = breaker.try_acquire_permission(None).unwrap();
    trial.record_outcome(Ok(()));
    assert_eq!(breaker.state(), CircuitState::Closed);
}

#[tokio::test(start_paused = true)]
async fn ignored_trial_frees_its_slot() {
    let breaker = breaker(window_of(4));
    trip(&breaker, 4);
    advance(Duration::from_secs(5)).await;

    assert_eq!(record(&breaker, Err(FailureKind::NotFound)), Verdict::Ignored);
    assert_eq!(breaker.state(), CircuitState::HalfOpen);
    assert_eq!(record(&breaker, Ok(())), Verdict::Success);
    assert_eq!(breaker.state(), CircuitState::Closed);
}

#[tokio::test(start_paused = true)]
async fn permit_dropped_after_deadline_counts_as_timeout() {
    let breaker = breaker(window_of(2));

    for _ in 0..2 {
        let deadline = Instant::now() + Duration::from_millis(100);
        let permit = breaker.try_acquire_permission(Some(deadline)).unwrap();
        advance(Duration::from_millis(100)).await;
        drop(permit);
    }

    assert_eq!(breaker.state(), CircuitState::Open);
}

#[tokio::test(start_paused = true)]
async fn permit_dropped_before_deadline_is_released() {
    let breaker = breaker(window_of(2));

    for _ in 0..4 {
        let deadline = Instant::now() + Duration::from_secs(2);
        let permit = breaker.try_acquire_permission(Some(deadline)).unwrap();
        drop(permit);
    }

    let metrics = breaker.metrics();
    assert_eq!(metrics.state, CircuitState::Closed);
    assert_eq!(metrics.buffered_calls, 0);
}

#[tokio::test(start_paused = true)]
async fn result_recording_uses_error_classification() {
    let breaker = breaker(CircuitBreakerPolicy::default());

    let permit = breaker.try_acquire_permission(None).unwrap();
    let not_found: heimdall::Result<()> = Err(HeimdallError::ClientRequest {
        status: 404,
        message: "missing".into(),
    });
    assert_eq!(permit.record(&not_found), Verdict::Ignored);

    let permit = breaker.try_acquire_permission(None).unwrap();
    let malformed: heimdall::Result<()> =
        Err(serde_json::from_str::<u32>("nope").unwrap_err().into());
    assert_eq!(permit.record(&malformed), Verdict::Failure);

    let permit = breaker.try_acquire_permission(None).unwrap();
    assert_eq!(permit.record(&Ok(5)), Verdict::Success);
}

#[test]
fn registry_creates_each_breaker_once() {
    let registry = CircuitBreakerRegistry::new(window_of(4));
    let first = registry.breaker("A");
    let configured = registry.breaker_with("A", CircuitBreakerPolicy::default());

    assert!(Arc::ptr_eq(&first, &configured));
    assert_eq!(configured.policy().sliding_window_size, 4);
    assert!(registry.get("B").is_none());
}
