//! Outcome-tagged latency for cold, cancellable pipelines.
//!
//! A Rust future is already cold: it does nothing until polled. The first
//! poll is the attachment point. [`Instrumented`] tracks each attachment
//! through `Constructed → Attached → Terminal` and stops its sample against
//! exactly one of three timers sharing a base name:
//!
//! - `Ok(_)` → `status="complete"` (including `Ok(None)`)
//! - `Err(_)` → `status="error"`
//! - dropped while attached → `status="cancel"`
//!
//! A decorated future that is never polled records nothing.
//!
//! [`Deferred`] is the re-subscribable form: a factory producing a fresh
//! attempt per [`subscribe`](Deferred::subscribe), each measured on its own.

use std::future::{Future, IntoFuture};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use futures_util::future::BoxFuture;
use pin_project_lite::pin_project;

use super::registry::{TimerHandle, TimerRegistry};
use super::statistic::{LatencyBuckets, Outcome, StatisticalTimer, Tags};
use crate::{HeimdallError, Result};

/// The complete/cancel/error timer triple of one flow.
#[derive(Debug, Clone)]
pub struct ReactiveCallMetrics {
    complete: TimerHandle,
    cancel: TimerHandle,
    error: TimerHandle,
}

impl ReactiveCallMetrics {
    /// Register the three outcome timers for `flow_name`.
    pub fn new(
        registry: &TimerRegistry,
        flow_name: &str,
        tags: &Tags,
        buckets: &LatencyBuckets,
    ) -> Result<Self> {
        let timer = |outcome| -> Result<TimerHandle> {
            Ok(StatisticalTimer::builder(flow_name)
                .outcome(outcome)
                .tags(tags)
                .buckets(buckets.clone())
                .build()?
                .register(registry))
        };
        Ok(Self {
            complete: timer(Outcome::Complete)?,
            cancel: timer(Outcome::Cancel)?,
            error: timer(Outcome::Error)?,
        })
    }

    pub fn timer(&self, outcome: Outcome) -> &TimerHandle {
        match outcome {
            Outcome::Complete => &self.complete,
            Outcome::Cancel => &self.cancel,
            Outcome::Error => &self.error,
        }
    }

    /// Decorate a future; timing starts when it is first polled.
    pub fn instrument<F>(&self, inner: F) -> Instrumented<F> {
        Instrumented {
            inner,
            metrics: self.clone(),
            state: Attachment::Constructed,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Attachment {
    Constructed,
    Attached(Instant),
    Terminal,
}

pin_project! {
    /// Future adapter recording one outcome per attachment.
    #[must_use = "futures do nothing unless polled"]
    pub struct Instrumented<F> {
        #[pin]
        inner: F,
        metrics: ReactiveCallMetrics,
        state: Attachment,
    }

    impl<F> PinnedDrop for Instrumented<F> {
        fn drop(this: Pin<&mut Self>) {
            let this = this.project();
            if let Attachment::Attached(started) = *this.state {
                this.metrics.cancel.record(started.elapsed());
            }
        }
    }
}

impl<F, T, E> Future for Instrumented<F>
where
    F: Future<Output = std::result::Result<T, E>>,
{
    type Output = F::Output;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        let started = match *this.state {
            Attachment::Constructed => {
                let now = Instant::now();
                *this.state = Attachment::Attached(now);
                now
            }
            Attachment::Attached(started) => started,
            // Polling after completion is the inner future's business.
            Attachment::Terminal => return this.inner.poll(cx),
        };

        let output = match this.inner.poll(cx) {
            Poll::Ready(output) => output,
            Poll::Pending => return Poll::Pending,
        };
        let timer = if output.is_ok() {
            &this.metrics.complete
        } else {
            &this.metrics.error
        };
        timer.record(started.elapsed());
        *this.state = Attachment::Terminal;
        Poll::Ready(output)
    }
}

/// Attach [`ReactiveCallMetrics`] to any fallible future.
pub trait StatisticalMetricsExt: Future + Sized {
    fn with_statistical_metrics(self, metrics: &ReactiveCallMetrics) -> Instrumented<Self> {
        metrics.instrument(self)
    }
}

impl<F: Future> StatisticalMetricsExt for F {}

type Factory<T, E> = dyn Fn() -> BoxFuture<'static, std::result::Result<T, E>> + Send + Sync;

/// A cold pipeline that can be subscribed to any number of times.
///
/// Building one performs no work; every [`subscribe`](Self::subscribe)
/// produces an independent attempt.
pub struct Deferred<T, E = HeimdallError> {
    factory: Arc<Factory<T, E>>,
}

impl<T, E> Clone for Deferred<T, E> {
    fn clone(&self) -> Self {
        Self {
            factory: Arc::clone(&self.factory),
        }
    }
}

impl<T, E> std::fmt::Debug for Deferred<T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Deferred").finish_non_exhaustive()
    }
}

impl<T, E> Deferred<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    pub fn new<F, Fut>(factory: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<T, E>> + Send + 'static,
    {
        let factory: Arc<Factory<T, E>> =
            Arc::new(move || -> BoxFuture<'static, std::result::Result<T, E>> { Box::pin(factory()) });
        Self { factory }
    }

    /// Start a fresh attempt. Nothing runs until the returned future is
    /// polled.
    pub fn subscribe(&self) -> BoxFuture<'static, std::result::Result<T, E>> {
        (self.factory)()
    }

    /// Transform each successful value.
    pub fn map<U, G>(self, f: G) -> Deferred<U, E>
    where
        U: Send + 'static,
        G: Fn(T) -> U + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        Deferred::new(move || {
            let attempt = self.subscribe();
            let f = Arc::clone(&f);
            async move { attempt.await.map(|value| (*f)(value)) }
        })
    }

    /// Transform each successful value, possibly into a failure.
    pub fn try_map<U, G>(self, f: G) -> Deferred<U, E>
    where
        U: Send + 'static,
        G: Fn(T) -> std::result::Result<U, E> + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        Deferred::new(move || {
            let attempt = self.subscribe();
            let f = Arc::clone(&f);
            async move { attempt.await.and_then(|value| (*f)(value)) }
        })
    }

    /// Measure every subscription with `metrics`.
    pub fn with_statistical_metrics(self, metrics: &ReactiveCallMetrics) -> Self {
        let metrics = metrics.clone();
        Deferred::new(move || metrics.instrument(self.subscribe()))
    }
}

impl<T, E> IntoFuture for Deferred<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    type Output = std::result::Result<T, E>;
    type IntoFuture = BoxFuture<'static, std::result::Result<T, E>>;

    fn into_future(self) -> Self::IntoFuture {
        self.subscribe()
    }
}
