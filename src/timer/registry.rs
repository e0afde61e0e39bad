//! In-process registry of statistic timers.
//!
//! [`TimerRegistry`] is the metrics collaborator every instrumented call is
//! handed explicitly. Timers are keyed by `(name, sorted tags)`; concurrent
//! register-or-get calls for the same coordinates resolve to one instance.
//!
//! Observations are kept locally (count, sum, max, bucket hits and a
//! quantile sketch) so percentiles are computed on read, and are also
//! forwarded to the `metrics` facade for whatever recorder the host has
//! installed.

use std::fmt::Write as _;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use metrics::{Histogram, Key, Label};
use metrics_util::storage::Summary;
use moka::sync::Cache;

use super::statistic::StatisticalTimer;
use crate::telemetry::{BUCKET_TAG, QUANTILE_TAG};

/// Process-scoped set of statistic timers.
///
/// Cloning is cheap; clones share the same timers.
#[derive(Clone)]
pub struct TimerRegistry {
    timers: Cache<Key, TimerHandle>,
}

impl Default for TimerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TimerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerRegistry")
            .field("timers", &self.timers.iter().count())
            .finish()
    }
}

impl TimerRegistry {
    pub fn new() -> Self {
        Self {
            timers: Cache::builder().build(),
        }
    }

    /// Register a timer, or return the one already registered under the
    /// same coordinates. The first registration's buckets and percentiles
    /// win.
    pub fn register(&self, timer: &StatisticalTimer) -> TimerHandle {
        self.timers
            .get_with(timer.key().clone(), || TimerHandle::new(timer))
    }

    /// Look up a registered timer by exported name and complete tag set.
    pub fn find(&self, name: &str, labels: &[(&str, &str)]) -> Option<TimerHandle> {
        let mut labels: Vec<Label> = labels
            .iter()
            .map(|(k, v)| Label::new(k.to_string(), v.to_string()))
            .collect();
        labels.sort_by(|a, b| a.key().cmp(b.key()));
        self.timers.get(&Key::from_parts(name.to_owned(), labels))
    }

    /// All registered timers, ordered by name then tags.
    pub fn timers(&self) -> Vec<TimerHandle> {
        let mut timers: Vec<TimerHandle> = self.timers.iter().map(|(_, timer)| timer).collect();
        timers.sort_by_cached_key(|timer| (timer.name().to_owned(), timer.labels()));
        timers
    }

    /// Every exported sample of every timer.
    pub fn samples(&self) -> Vec<Sample> {
        self.timers()
            .iter()
            .flat_map(TimerHandle::samples)
            .collect()
    }

    /// Value of the sample with exactly this name and label set.
    pub fn sample_value(&self, name: &str, labels: &[(&str, &str)]) -> Option<f64> {
        self.samples()
            .into_iter()
            .find(|sample| sample.name == name && sample.matches(labels))
            .map(|sample| sample.value)
    }

    /// Render all timers in the Prometheus text exposition format.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for timer in self.timers() {
            let _ = writeln!(out, "# TYPE {} histogram", timer.name());
            for sample in timer.samples() {
                let _ = writeln!(out, "{sample}");
            }
        }
        out
    }
}

/// One exported sample: metric name, labels, value.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub name: String,
    pub labels: Vec<(String, String)>,
    pub value: f64,
}

impl Sample {
    fn matches(&self, labels: &[(&str, &str)]) -> bool {
        self.labels.len() == labels.len()
            && labels
                .iter()
                .all(|(k, v)| self.labels.iter().any(|(sk, sv)| sk == k && sv == v))
    }
}

impl std::fmt::Display for Sample {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)?;
        if !self.labels.is_empty() {
            f.write_str("{")?;
            for (i, (k, v)) in self.labels.iter().enumerate() {
                if i > 0 {
                    f.write_str(",")?;
                }
                write!(f, "{k}=\"{}\"", escape_label_value(v))?;
            }
            f.write_str("}")?;
        }
        write!(f, " {}", format_value(self.value))
    }
}

/// Shared handle to a registered timer.
#[derive(Clone)]
pub struct TimerHandle(Arc<Timer>);

struct Timer {
    key: Key,
    boundaries: Vec<Duration>,
    percentiles: Vec<f64>,
    state: Mutex<TimerState>,
    facade: Histogram,
}

struct TimerState {
    count: u64,
    total: Duration,
    max: Duration,
    // Non-cumulative hits per boundary; observations above the last
    // boundary only show up in the +Inf bucket.
    bucket_hits: Vec<u64>,
    summary: Summary,
}

impl std::fmt::Debug for TimerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerHandle")
            .field("name", &self.name())
            .field("labels", &self.labels())
            .field("count", &self.count())
            .finish()
    }
}

impl TimerHandle {
    fn new(timer: &StatisticalTimer) -> Self {
        let key = timer.key().clone();
        let labels: Vec<Label> = key.labels().cloned().collect();
        let facade = metrics::histogram!(key.name().to_owned(), labels);
        let boundaries = timer.buckets().as_slice().to_vec();
        Self(Arc::new(Timer {
            state: Mutex::new(TimerState {
                count: 0,
                total: Duration::ZERO,
                max: Duration::ZERO,
                bucket_hits: vec![0; boundaries.len()],
                summary: Summary::with_defaults(),
            }),
            key,
            boundaries,
            percentiles: timer.percentiles().to_vec(),
            facade,
        }))
    }

    pub fn name(&self) -> &str {
        self.0.key.name()
    }

    /// Tags as `(key, value)` pairs, sorted by key.
    pub fn labels(&self) -> Vec<(String, String)> {
        self.0
            .key
            .labels()
            .map(|label| (label.key().to_owned(), label.value().to_owned()))
            .collect()
    }

    /// Record one observation.
    pub fn record(&self, elapsed: Duration) {
        {
            let mut state = self.lock();
            state.count += 1;
            state.total += elapsed;
            state.max = state.max.max(elapsed);
            if let Some(slot) = self.0.boundaries.iter().position(|b| elapsed <= *b) {
                state.bucket_hits[slot] += 1;
            }
            state.summary.add(elapsed.as_secs_f64());
        }
        self.0.facade.record(elapsed.as_secs_f64());
    }

    pub fn count(&self) -> u64 {
        self.lock().count
    }

    pub fn total_time(&self) -> Duration {
        self.lock().total
    }

    pub fn max(&self) -> Duration {
        self.lock().max
    }

    /// Estimated latency at quantile `q`, computed on read.
    /// Zero while the timer has no observations.
    pub fn percentile(&self, q: f64) -> Duration {
        self.lock()
            .summary
            .quantile(q)
            .map(|secs| Duration::from_secs_f64(secs.max(0.0)))
            .unwrap_or(Duration::ZERO)
    }

    /// Cumulative bucket counts, one entry per boundary.
    pub fn buckets(&self) -> Vec<(Duration, u64)> {
        let state = self.lock();
        let mut cumulative = 0;
        self.0
            .boundaries
            .iter()
            .zip(&state.bucket_hits)
            .map(|(boundary, hits)| {
                cumulative += hits;
                (*boundary, cumulative)
            })
            .collect()
    }

    /// Exported samples: quantiles, buckets, count, sum and max.
    pub fn samples(&self) -> Vec<Sample> {
        let name = self.name();
        let labels = self.labels();
        let with = |extra: (&str, String)| {
            let mut labels = labels.clone();
            labels.push((extra.0.to_owned(), extra.1));
            labels
        };

        let state = self.lock();
        let mut samples = Vec::with_capacity(self.0.percentiles.len() + self.0.boundaries.len() + 4);
        for q in &self.0.percentiles {
            samples.push(Sample {
                name: name.to_owned(),
                labels: with((QUANTILE_TAG, format_value(*q))),
                value: state.summary.quantile(*q).unwrap_or(0.0),
            });
        }
        let mut cumulative = 0;
        for (boundary, hits) in self.0.boundaries.iter().zip(&state.bucket_hits) {
            cumulative += hits;
            samples.push(Sample {
                name: format!("{name}_bucket"),
                labels: with((BUCKET_TAG, format_value(boundary.as_secs_f64()))),
                value: cumulative as f64,
            });
        }
        samples.push(Sample {
            name: format!("{name}_bucket"),
            labels: with((BUCKET_TAG, "+Inf".to_owned())),
            value: state.count as f64,
        });
        samples.push(Sample {
            name: format!("{name}_count"),
            labels: labels.clone(),
            value: state.count as f64,
        });
        samples.push(Sample {
            name: format!("{name}_sum"),
            labels: labels.clone(),
            value: state.total.as_secs_f64(),
        });
        samples.push(Sample {
            name: format!("{name}_max"),
            labels,
            value: state.max.as_secs_f64(),
        });
        samples
    }

    /// Whether two handles point at the same registered timer.
    pub fn same_timer(&self, other: &TimerHandle) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    fn lock(&self) -> MutexGuard<'_, TimerState> {
        self.0.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn format_value(value: f64) -> String {
    if value.is_infinite() {
        if value > 0.0 { "+Inf" } else { "-Inf" }.to_owned()
    } else {
        value.to_string()
    }
}

fn escape_label_value(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_values_like_prometheus() {
        assert_eq!(format_value(0.2), "0.2");
        assert_eq!(format_value(1.0), "1");
        assert_eq!(format_value(f64::INFINITY), "+Inf");
    }

    #[test]
    fn escapes_label_values() {
        assert_eq!(escape_label_value("a\"b\\c"), "a\\\"b\\\\c");
    }

    #[test]
    fn sample_display_includes_labels() {
        let sample = Sample {
            name: "x_statistic_seconds_count".into(),
            labels: vec![("service".into(), "x".into())],
            value: 3.0,
        };
        assert_eq!(sample.to_string(), "x_statistic_seconds_count{service=\"x\"} 3");
    }
}
