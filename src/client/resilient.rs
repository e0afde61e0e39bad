//! Resilient GET: circuit breaker, default fallback, statistic timers and a
//! hard deadline around one [`WebClient`] call.
//!
//! Stage order per subscription, innermost first:
//!
//! 1. breaker permission (rejected while open)
//! 2. GET and decode
//! 3. breaker classification of the attempt
//! 4. default substitution on any failure, including rejection
//! 5. outcome timers named by the command
//! 6. deadline; a late call yields the default or [`HeimdallError::Timeout`]
//!
//! A call that outlives its deadline is dropped, which records a `cancel`
//! observation and a timed-out call against the breaker.

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use tokio::time::Instant;
use tracing::{debug, error, warn};

use super::request::{CallOutcome, CallRequest};
use super::web::WebClient;
use crate::breaker::CircuitBreaker;
use crate::telemetry::DEFAULT_RESILIENCE_TIMEOUT;
use crate::timer::{Deferred, LatencyBuckets, ReactiveCallMetrics, Tags, TimerRegistry};
use crate::{HeimdallError, Result};

/// A [`WebClient`] guarded by a circuit breaker and measured per command.
#[derive(Debug, Clone)]
pub struct ResilientClient {
    web: WebClient,
    breaker: Arc<CircuitBreaker>,
    registry: TimerRegistry,
    buckets: LatencyBuckets,
    timeout: Duration,
}

impl ResilientClient {
    pub fn new(web: WebClient, breaker: Arc<CircuitBreaker>, registry: TimerRegistry) -> Self {
        Self {
            web,
            breaker,
            registry,
            buckets: LatencyBuckets::default(),
            timeout: DEFAULT_RESILIENCE_TIMEOUT,
        }
    }

    /// Overall deadline of each call. Default: 2000 ms.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_buckets(mut self, buckets: LatencyBuckets) -> Self {
        self.buckets = buckets;
        self
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    pub fn registry(&self) -> &TimerRegistry {
        &self.registry
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Build the cold pipeline for `request`. Nothing is sent until the
    /// result is subscribed to; each subscription is an independent call.
    ///
    /// Fails only when the command's timers cannot be registered.
    pub fn get_or_default_deferred<T>(
        &self,
        request: CallRequest,
        default: Option<T>,
    ) -> Result<Deferred<CallOutcome<T>>>
    where
        T: DeserializeOwned + Clone + Send + Sync + 'static,
    {
        let metrics =
            ReactiveCallMetrics::new(&self.registry, request.command(), &Tags::new(), &self.buckets)?;
        let client = self.clone();
        let request = Arc::new(request);
        let default = Arc::new(default);

        Ok(Deferred::new(move || {
            let client = client.clone();
            let request = Arc::clone(&request);
            let default = Arc::clone(&default);
            let metrics = metrics.clone();
            async move {
                let deadline = Instant::now().checked_add(client.timeout);
                let attempt =
                    metrics.instrument(client.attempt(&request, default.as_ref().clone(), deadline));
                // A timeout past the clock's range leaves the call unbounded.
                let Some(deadline) = deadline else {
                    return attempt.await;
                };
                match tokio::time::timeout_at(deadline, attempt).await {
                    Ok(result) => result,
                    Err(_) => {
                        warn!(
                            command = request.command(),
                            timeout_ms = client.timeout.as_millis() as u64,
                            "call timed out"
                        );
                        match default.as_ref() {
                            Some(value) => Ok(CallOutcome::Default(value.clone())),
                            None => Err(HeimdallError::Timeout {
                                command: request.command().to_string(),
                                timeout: client.timeout,
                            }),
                        }
                    }
                }
            }
        }))
    }

    /// Suspending form of [`get_or_default_deferred`](Self::get_or_default_deferred):
    /// performs exactly one call.
    pub async fn get_or_default<T>(
        &self,
        request: CallRequest,
        default: Option<T>,
    ) -> Result<CallOutcome<T>>
    where
        T: DeserializeOwned + Clone + Send + Sync + 'static,
    {
        self.get_or_default_deferred(request, default)?.await
    }

    async fn attempt<T>(
        &self,
        request: &CallRequest,
        default: Option<T>,
        deadline: Option<Instant>,
    ) -> Result<CallOutcome<T>>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let command = request.command();
        let result = match self.breaker.try_acquire_permission(deadline) {
            Ok(permit) => {
                let result = self.web.get_json::<T>(request).await;
                let elapsed_ms = permit.elapsed().as_millis() as u64;
                let verdict = permit.record(&result);
                debug!(command, breaker = self.breaker.name(), ?verdict, elapsed_ms, "call finished");
                result
            }
            Err(err) => Err(err),
        };

        match result {
            Ok(value) => {
                debug!(command, "call succeeded");
                Ok(CallOutcome::Success(value))
            }
            Err(err) => {
                error!(command, error = %err, "call failed");
                match default {
                    Some(value) => Ok(CallOutcome::Default(value)),
                    None => Err(err),
                }
            }
        }
    }
}
