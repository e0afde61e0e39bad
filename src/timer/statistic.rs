//! Statistic timer descriptions.
//!
//! A [`StatisticalTimer`] is a registrable description: name, tags, bucket
//! boundaries and published percentiles. Nothing is observable until it is
//! registered against a [`TimerRegistry`].
//!
//! ```rust
//! # use heimdall::timer::{LatencyBuckets, Outcome, StatisticalTimer, TimerRegistry};
//! let registry = TimerRegistry::new();
//! let timer = StatisticalTimer::builder("checkout")
//!     .outcome(Outcome::Complete)
//!     .buckets(LatencyBuckets::default())
//!     .build()?
//!     .register(&registry);
//! assert_eq!(timer.name(), "checkout_statistic_seconds");
//! # Ok::<(), heimdall::HeimdallError>(())
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use metrics::{Key, Label};

use super::registry::{TimerHandle, TimerRegistry};
use crate::telemetry::{
    DEFAULT_PERCENTILES, DEFAULT_TIME_BUCKETS, RESERVED_TAGS, SERVICE_TAG, STATISTIC_SUFFIX,
    STATISTIC_UNIT, STATUS_TAG,
};
use crate::{HeimdallError, Result};

/// Extra key/value tags attached to a timer.
pub type Tags = BTreeMap<String, String>;

/// Terminal outcome of a cold pipeline attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    Complete,
    Cancel,
    Error,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Complete => "complete",
            Outcome::Cancel => "cancel",
            Outcome::Error => "error",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered, non-empty latency bucket boundaries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LatencyBuckets(Vec<Duration>);

impl LatencyBuckets {
    /// Validate and normalise bucket boundaries (sorted, de-duplicated).
    pub fn new(mut boundaries: Vec<Duration>) -> Result<Self> {
        if boundaries.is_empty() {
            return Err(HeimdallError::Configuration(
                "time buckets are mandatory to create a latency distribution histogram".into(),
            ));
        }
        boundaries.sort_unstable();
        boundaries.dedup();
        Ok(Self(boundaries))
    }

    /// Build from millisecond values, as found in configuration files.
    pub fn from_millis(millis: &[u64]) -> Result<Self> {
        Self::new(millis.iter().copied().map(Duration::from_millis).collect())
    }

    pub fn as_slice(&self) -> &[Duration] {
        &self.0
    }
}

impl Default for LatencyBuckets {
    fn default() -> Self {
        Self(DEFAULT_TIME_BUCKETS.to_vec())
    }
}

impl TryFrom<Vec<Duration>> for LatencyBuckets {
    type Error = HeimdallError;

    fn try_from(boundaries: Vec<Duration>) -> Result<Self> {
        Self::new(boundaries)
    }
}

/// A named statistic timer ready to be registered.
#[derive(Debug, Clone)]
pub struct StatisticalTimer {
    key: Key,
    buckets: LatencyBuckets,
    percentiles: Vec<f64>,
}

impl StatisticalTimer {
    pub fn builder(base: impl Into<String>) -> StatisticalTimerBuilder {
        StatisticalTimerBuilder {
            base: base.into(),
            outcome: None,
            tags: Tags::new(),
            buckets: LatencyBuckets::default(),
            percentiles: DEFAULT_PERCENTILES.to_vec(),
        }
    }

    /// Exported metric name, `<base>_statistic_seconds`.
    pub fn name(&self) -> &str {
        self.key.name()
    }

    /// Registry coordinates: name plus sorted tags.
    pub fn key(&self) -> &Key {
        &self.key
    }

    pub fn buckets(&self) -> &LatencyBuckets {
        &self.buckets
    }

    pub fn percentiles(&self) -> &[f64] {
        &self.percentiles
    }

    /// Register against a live registry, or fetch the timer already
    /// registered under the same coordinates.
    pub fn register(&self, registry: &TimerRegistry) -> TimerHandle {
        registry.register(self)
    }
}

/// Builder for [`StatisticalTimer`].
#[derive(Debug, Clone)]
pub struct StatisticalTimerBuilder {
    base: String,
    outcome: Option<Outcome>,
    tags: Tags,
    buckets: LatencyBuckets,
    percentiles: Vec<f64>,
}

impl StatisticalTimerBuilder {
    /// Label the timer with a terminal outcome (`status` tag).
    pub fn outcome(mut self, outcome: Outcome) -> Self {
        self.outcome = Some(outcome);
        self
    }

    /// Merge caller-supplied tags.
    pub fn tags(mut self, tags: &Tags) -> Self {
        self.tags
            .extend(tags.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    pub fn buckets(mut self, buckets: LatencyBuckets) -> Self {
        self.buckets = buckets;
        self
    }

    /// Percentiles published on read, each in `[0, 1]`.
    pub fn percentiles(mut self, percentiles: &[f64]) -> Self {
        self.percentiles = percentiles.to_vec();
        self
    }

    pub fn build(self) -> Result<StatisticalTimer> {
        if self.base.is_empty() {
            return Err(HeimdallError::Configuration(
                "statistic timer needs a non-empty name".into(),
            ));
        }
        if let Some(reserved) = self
            .tags
            .keys()
            .find(|key| RESERVED_TAGS.contains(&key.as_str()))
        {
            return Err(HeimdallError::Configuration(format!(
                "tag {reserved:?} is reserved for statistic timers"
            )));
        }
        if let Some(bad) = self
            .percentiles
            .iter()
            .find(|q| !(0.0..=1.0).contains(*q))
        {
            return Err(HeimdallError::Configuration(format!(
                "percentile {bad} is outside [0, 1]"
            )));
        }

        let name = format!(
            "{}{STATISTIC_SUFFIX}_{STATISTIC_UNIT}",
            sanitize_metric_name(&self.base)
        );
        let mut labels = vec![Label::new(SERVICE_TAG, self.base)];
        if let Some(outcome) = self.outcome {
            labels.push(Label::new(STATUS_TAG, outcome.as_str()));
        }
        labels.extend(self.tags.into_iter().map(|(k, v)| Label::new(k, v)));
        labels.sort_by(|a, b| a.key().cmp(b.key()));

        Ok(StatisticalTimer {
            key: Key::from_parts(name, labels),
            buckets: self.buckets,
            percentiles: self.percentiles,
        })
    }
}

/// Map a free-form command name onto the Prometheus metric charset.
fn sanitize_metric_name(base: &str) -> String {
    base.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == ':' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
