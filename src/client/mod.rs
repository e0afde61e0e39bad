//! Outbound HTTP to downstream dependencies.
//!
//! - [`WebClient`]: pooled JSON client with status → error mapping.
//! - [`ResilientClient`]: breaker, default fallback, outcome timers and a
//!   deadline around a [`WebClient`].

mod config;
mod request;
mod resilient;
mod web;

pub use config::HttpClientConfig;
pub use request::{CallOutcome, CallRequest};
pub use resilient::ResilientClient;
pub use web::WebClient;
