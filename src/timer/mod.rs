//! Outcome-tagged statistic timers.
//!
//! - [`StatisticalTimer`]: named, tagged timer description with pre-seeded
//!   latency buckets and on-read percentiles.
//! - [`TimerRegistry`]: the process-scoped set of registered timers, with
//!   Prometheus text export.
//! - [`DirectCallMetrics`]: one unlabelled timer around a directly-awaited
//!   operation, recorded on every exit path.
//! - [`ReactiveCallMetrics`]: complete/cancel/error timers around a cold
//!   pipeline, recorded once per attachment.

pub mod direct;
pub mod reactive;
pub mod registry;
pub mod statistic;

pub use direct::{DirectCallMetrics, measure_call};
pub use reactive::{Deferred, Instrumented, ReactiveCallMetrics, StatisticalMetricsExt};
pub use registry::{Sample, TimerHandle, TimerRegistry};
pub use statistic::{LatencyBuckets, Outcome, StatisticalTimer, StatisticalTimerBuilder, Tags};
