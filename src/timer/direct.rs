//! Latency for directly-awaited, single-shot operations.
//!
//! One unlabelled timer per operation name. Elapsed time is recorded on
//! every exit path, including the future being dropped part-way, so each
//! invocation yields exactly one observation.

use std::future::Future;
use std::time::Instant;

use super::registry::{TimerHandle, TimerRegistry};
use super::statistic::{LatencyBuckets, StatisticalTimer, Tags};
use crate::{HeimdallError, Result};

/// Wraps single-shot async operations with one statistic timer.
#[derive(Debug, Clone)]
pub struct DirectCallMetrics {
    timer: TimerHandle,
}

impl DirectCallMetrics {
    pub fn new(
        registry: &TimerRegistry,
        function_name: &str,
        tags: &Tags,
        buckets: &LatencyBuckets,
    ) -> Result<Self> {
        let timer = StatisticalTimer::builder(function_name)
            .tags(tags)
            .buckets(buckets.clone())
            .build()?
            .register(registry);
        Ok(Self { timer })
    }

    pub fn timer(&self) -> &TimerHandle {
        &self.timer
    }

    /// Run `op`, recording its latency whatever the outcome.
    pub async fn measure<F, Fut>(&self, op: F) -> Fut::Output
    where
        F: FnOnce() -> Fut,
        Fut: Future,
    {
        let _stopwatch = Stopwatch::start(&self.timer);
        op().await
    }
}

/// One-shot form of [`DirectCallMetrics::measure`].
///
/// A timer configuration error is returned through `op`'s own error type
/// and `op` is not invoked.
pub async fn measure_call<T, E, F, Fut>(
    registry: &TimerRegistry,
    function_name: &str,
    tags: &Tags,
    buckets: &LatencyBuckets,
    op: F,
) -> std::result::Result<T, E>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
    E: From<HeimdallError>,
{
    let metrics = DirectCallMetrics::new(registry, function_name, tags, buckets)?;
    metrics.measure(op).await
}

/// Records elapsed time into its timer when dropped.
struct Stopwatch<'a> {
    timer: &'a TimerHandle,
    started: Instant,
}

impl<'a> Stopwatch<'a> {
    fn start(timer: &'a TimerHandle) -> Self {
        Self {
            timer,
            started: Instant::now(),
        }
    }
}

impl Drop for Stopwatch<'_> {
    fn drop(&mut self) {
        self.timer.record(self.started.elapsed());
    }
}
