//! Heimdall - outcome-tagged latency and circuit breaking for outbound calls
//!
//! This crate instruments asynchronous work with statistic timers (latency
//! buckets plus on-read percentiles, tagged by terminal outcome) and wraps
//! outbound HTTP dependencies in a circuit breaker with default fallback and
//! a hard deadline.
//!
//! # Resilient call example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use heimdall::breaker::{CircuitBreaker, CircuitBreakerPolicy};
//! use heimdall::client::{CallRequest, HttpClientConfig, ResilientClient, WebClient};
//! use heimdall::timer::TimerRegistry;
//!
//! #[derive(Clone, serde::Deserialize)]
//! struct Comic {
//!     num: i32,
//! }
//!
//! #[tokio::main]
//! async fn main() -> heimdall::Result<()> {
//!     let registry = TimerRegistry::new();
//!     let web = WebClient::new(&HttpClientConfig::new("https://xkcd.com").pool_name("xkcd"))?;
//!     let breaker = Arc::new(CircuitBreaker::new(
//!         "XKCD_GET_COMIC_INFO_BY_ID",
//!         CircuitBreakerPolicy::default(),
//!     ));
//!     let client = ResilientClient::new(web, breaker, registry.clone());
//!
//!     let request = CallRequest::new("/614/info.0.json", "XKCD_GET_COMIC_INFO_BY_ID")?;
//!     let comic = client
//!         .get_or_default(request, Some(Comic { num: -1 }))
//!         .await?
//!         .into_inner();
//!
//!     println!("comic {}", comic.num);
//!     print!("{}", registry.render());
//!     Ok(())
//! }
//! ```
//!
//! # Timing a cold pipeline
//!
//! ```rust
//! use heimdall::timer::{Deferred, LatencyBuckets, ReactiveCallMetrics, Tags, TimerRegistry};
//!
//! # async fn example() -> heimdall::Result<()> {
//! let registry = TimerRegistry::new();
//! let metrics = ReactiveCallMetrics::new(
//!     &registry,
//!     "inventory.lookup",
//!     &Tags::new(),
//!     &LatencyBuckets::default(),
//! )?;
//!
//! let lookup = Deferred::new(|| async { Ok::<_, heimdall::HeimdallError>(42) })
//!     .with_statistical_metrics(&metrics);
//!
//! // Building recorded nothing; each subscription records once.
//! assert_eq!(lookup.clone().await?, 42);
//! # Ok(())
//! # }
//! ```

pub mod breaker;
pub mod client;
pub mod config;
pub mod error;
#[cfg(feature = "server")]
pub mod server;
pub mod telemetry;
pub mod timer;
pub mod xkcd;

// Re-export main types at crate root
pub use error::{HeimdallError, Result};

pub use breaker::{CircuitBreaker, CircuitBreakerPolicy, CircuitBreakerRegistry, CircuitState};
pub use client::{CallOutcome, CallRequest, ResilientClient, WebClient};
pub use timer::{
    Deferred, DirectCallMetrics, LatencyBuckets, Outcome, ReactiveCallMetrics, StatisticalTimer,
    Tags, TimerRegistry,
};
