//! HTTP routing layer for the comic service.
//!
//! - `GET /v1/comic/{id}`: suspending lookup, timer `GET_COMIC_BY_ID_CONTROLLER`
//! - `GET /v1/comic-mono/{id}`: cold lookup, complete/cancel/error timers
//!   `GET_COMIC_BY_ID_MONO_CONTROLLER`
//! - `GET /metrics`: every statistic timer and circuit breaker in Prometheus
//!   text format

mod error;
mod handlers;

use axum::Router;
use axum::routing::get;
use tokio::net::TcpListener;

pub use error::{ApiError, ErrorMessage};

use crate::Result;
use crate::breaker::CircuitBreakerRegistry;
use crate::config::Config;
use crate::timer::{DirectCallMetrics, LatencyBuckets, ReactiveCallMetrics, Tags, TimerRegistry};
use crate::xkcd::{XkcdClient, XkcdService};

/// Timer of the suspending comic route.
pub const COMIC_CONTROLLER_TIMER: &str = "GET_COMIC_BY_ID_CONTROLLER";

/// Timer triple of the cold comic route.
pub const COMIC_MONO_CONTROLLER_TIMER: &str = "GET_COMIC_BY_ID_MONO_CONTROLLER";

/// Shared handler state.
#[derive(Debug, Clone)]
pub struct AppState {
    service: XkcdService,
    registry: TimerRegistry,
    breakers: CircuitBreakerRegistry,
    comic_timer: DirectCallMetrics,
    comic_mono_timers: ReactiveCallMetrics,
}

impl AppState {
    pub fn new(
        service: XkcdService,
        registry: TimerRegistry,
        breakers: CircuitBreakerRegistry,
        buckets: &LatencyBuckets,
    ) -> Result<Self> {
        let tags = Tags::new();
        Ok(Self {
            comic_timer: DirectCallMetrics::new(&registry, COMIC_CONTROLLER_TIMER, &tags, buckets)?,
            comic_mono_timers: ReactiveCallMetrics::new(
                &registry,
                COMIC_MONO_CONTROLLER_TIMER,
                &tags,
                buckets,
            )?,
            service,
            registry,
            breakers,
        })
    }

    pub fn registry(&self) -> &TimerRegistry {
        &self.registry
    }

    pub fn breakers(&self) -> &CircuitBreakerRegistry {
        &self.breakers
    }
}

/// Wire the registries, the xkcd client and the service from configuration.
pub fn build_state(config: &Config) -> Result<AppState> {
    let registry = TimerRegistry::new();
    let breakers = CircuitBreakerRegistry::default();
    let buckets = config.time_buckets()?;
    let client = XkcdClient::from_config(config, &registry, &breakers)?;
    let service = XkcdService::new(client, &registry, &buckets)?;
    AppState::new(service, registry, breakers, &buckets)
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/v1/comic/{id}", get(handlers::comic_by_id))
        .route("/v1/comic-mono/{id}", get(handlers::comic_by_id_mono))
        .route("/metrics", get(handlers::metrics))
        .with_state(state)
}

/// Serve until the listener fails.
pub async fn serve(listener: TcpListener, state: AppState) -> std::io::Result<()> {
    axum::serve(listener, router(state)).await
}
