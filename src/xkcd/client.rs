//! Resilient adapter for the xkcd JSON API.

use std::time::Duration;

use tracing::debug;

use super::model::XkcdResponse;
use crate::breaker::{CircuitBreakerPolicy, CircuitBreakerRegistry};
use crate::client::{CallRequest, ResilientClient, WebClient};
use crate::config::Config;
use crate::timer::{Deferred, TimerRegistry};
use crate::Result;

/// Command and breaker name of the comic lookup.
pub const XKCD_COMMAND: &str = "XKCD_GET_COMIC_INFO_BY_ID";

/// `[http_client.<name>]` section holding the xkcd connection settings.
pub const XKCD_HTTP_CLIENT: &str = "xkcd";

#[derive(Debug, Clone)]
pub struct XkcdClient {
    client: ResilientClient,
}

impl XkcdClient {
    pub fn new(client: ResilientClient) -> Self {
        Self { client }
    }

    /// Breaker policy the `[circuit_breaker.XKCD_GET_COMIC_INFO_BY_ID]`
    /// section is applied over.
    pub fn default_policy() -> CircuitBreakerPolicy {
        CircuitBreakerPolicy::new()
            .slow_call_duration_threshold(Duration::from_millis(1000))
            .wait_duration_in_open_state(Duration::from_millis(5000))
    }

    /// Wire the client from `[http_client.xkcd]` and the optional breaker
    /// section.
    pub fn from_config(
        config: &Config,
        registry: &TimerRegistry,
        breakers: &CircuitBreakerRegistry,
    ) -> Result<Self> {
        let web = WebClient::new(&config.http_client(XKCD_HTTP_CLIENT)?)?;
        let policy = config.circuit_breaker_policy(XKCD_COMMAND, Self::default_policy());
        let breaker = breakers.breaker_with(XKCD_COMMAND, policy);
        let client = ResilientClient::new(web, breaker, registry.clone())
            .with_timeout(config.resilience_timeout())
            .with_buckets(config.time_buckets()?);
        Ok(Self::new(client))
    }

    /// Fetch comic `id`. The upstream rejecting the id (4xx) reads as absent.
    pub async fn comic_by_id(&self, id: &str) -> Result<Option<XkcdResponse>> {
        debug!(comic_id = id, "fetching comic");
        let outcome = self
            .client
            .get_or_default::<Option<XkcdResponse>>(comic_request(id)?, None)
            .await;
        absent_on_client_error(outcome.map(|outcome| outcome.into_inner()))
    }

    /// Cold form of [`comic_by_id`](Self::comic_by_id).
    pub fn comic_by_id_deferred(&self, id: &str) -> Result<Deferred<Option<XkcdResponse>>> {
        let call = self
            .client
            .get_or_default_deferred::<Option<XkcdResponse>>(comic_request(id)?, None)?;
        let comic_id = id.to_string();
        Ok(Deferred::new(move || {
            let attempt = call.subscribe();
            let comic_id = comic_id.clone();
            async move {
                debug!(comic_id = %comic_id, "fetching comic");
                absent_on_client_error(attempt.await.map(|outcome| outcome.into_inner()))
            }
        }))
    }
}

fn comic_request(id: &str) -> Result<CallRequest> {
    CallRequest::new(format!("/{id}/info.0.json"), XKCD_COMMAND)
}

fn absent_on_client_error(
    result: Result<Option<XkcdResponse>>,
) -> Result<Option<XkcdResponse>> {
    match result {
        Err(err) if err.is_client_error() => Ok(None),
        other => other,
    }
}
