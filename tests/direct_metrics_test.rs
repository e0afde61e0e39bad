//! Single-timer measurement of directly-awaited operations.

use std::future::pending;
use std::time::Duration;

use heimdall::timer::{measure_call, DirectCallMetrics, LatencyBuckets, Tags, TimerRegistry};
use heimdall::HeimdallError;

fn metrics(registry: &TimerRegistry, name: &str) -> DirectCallMetrics {
    DirectCallMetrics::new(registry, name, &Tags::new(), &LatencyBuckets::default()).unwrap()
}

#[tokio::test]
async fn records_successful_call() {
    let registry = TimerRegistry::new();
    let direct = metrics(&registry, "service.getComicById");

    let value = direct.measure(|| async { Ok::<_, HeimdallError>(7) }).await;

    assert_eq!(value.unwrap(), 7);
    assert_eq!(direct.timer().count(), 1);
    assert_eq!(
        registry.sample_value(
            "service_getComicById_statistic_seconds_count",
            &[("service", "service.getComicById")]
        ),
        Some(1.0)
    );
}

#[tokio::test]
async fn records_failed_call_on_the_same_timer() {
    let registry = TimerRegistry::new();
    let direct = metrics(&registry, "failing");

    let result = direct
        .measure(|| async { Err::<(), _>(HeimdallError::Http("boom".into())) })
        .await;

    assert!(result.is_err());
    assert_eq!(direct.timer().count(), 1);
    assert_eq!(registry.timers().len(), 1);
}

#[tokio::test]
async fn records_absent_result() {
    let registry = TimerRegistry::new();
    let direct = metrics(&registry, "absent");

    let value: Option<u32> = direct.measure(|| async { None }).await;

    assert!(value.is_none());
    assert_eq!(direct.timer().count(), 1);
}

#[tokio::test]
async fn records_when_cancelled_mid_flight() {
    let registry = TimerRegistry::new();
    let direct = metrics(&registry, "cancelled");

    let outcome = tokio::time::timeout(
        Duration::from_millis(20),
        direct.measure(|| pending::<()>()),
    )
    .await;

    assert!(outcome.is_err());
    assert_eq!(direct.timer().count(), 1);
    assert!(direct.timer().total_time() >= Duration::from_millis(20));
}

#[tokio::test]
async fn one_observation_per_invocation() {
    let registry = TimerRegistry::new();
    let direct = metrics(&registry, "repeated");

    for i in 0..5 {
        let _ = direct.measure(|| async move { i * 2 }).await;
    }

    assert_eq!(direct.timer().count(), 5);
}

#[tokio::test]
async fn latency_reaches_high_percentile() {
    let registry = TimerRegistry::new();
    let direct = metrics(&registry, "slow");

    direct
        .measure(|| tokio::time::sleep(Duration::from_millis(210)))
        .await;

    assert!(direct.timer().percentile(0.99).as_secs_f64() >= 0.2);
    assert!(direct.timer().max() >= Duration::from_millis(210));
}

#[tokio::test]
async fn measure_call_registers_and_records() {
    let registry = TimerRegistry::new();

    let value = measure_call(
        &registry,
        "one.shot",
        &Tags::new(),
        &LatencyBuckets::default(),
        || async { Ok::<_, HeimdallError>("done") },
    )
    .await
    .unwrap();

    assert_eq!(value, "done");
    let timer = registry
        .find("one_shot_statistic_seconds", &[("service", "one.shot")])
        .unwrap();
    assert_eq!(timer.count(), 1);
}

#[tokio::test]
async fn measure_call_rejects_bad_configuration_without_running() {
    let registry = TimerRegistry::new();
    let mut tags = Tags::new();
    tags.insert("service".into(), "clash".into());
    let mut ran = false;

    let result = measure_call(&registry, "bad", &tags, &LatencyBuckets::default(), || {
        ran = true;
        async { Ok::<_, HeimdallError>(()) }
    })
    .await;

    assert!(matches!(result, Err(HeimdallError::Configuration(_))));
    assert!(!ran);
    assert!(registry.timers().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_calls_are_all_counted() {
    const CALLS: usize = 1000;
    let registry = TimerRegistry::new();
    let direct = metrics(&registry, "concurrent.direct");

    let handles: Vec<_> = (0..CALLS)
        .map(|_| {
            let direct = direct.clone();
            tokio::spawn(async move {
                direct
                    .measure(|| tokio::time::sleep(Duration::from_millis(200)))
                    .await
            })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap();
    }

    let labels = [("service", "concurrent.direct")];
    assert_eq!(
        registry.sample_value("concurrent_direct_statistic_seconds_count", &labels),
        Some(CALLS as f64)
    );
    let p99 = registry
        .sample_value(
            "concurrent_direct_statistic_seconds",
            &[("service", "concurrent.direct"), ("quantile", "0.99")],
        )
        .unwrap();
    assert!(p99 >= 0.2, "p99 was {p99}");
}
