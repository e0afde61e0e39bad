//! Configuration loading.
//!
//! Configuration is loaded from TOML files with the following resolution order:
//! 1. `--config <path>` (CLI flag)
//! 2. `~/.heimdall/config.toml` (user)
//! 3. `/etc/heimdall/config.toml` (system)
//!
//! ```toml
//! [server]
//! address = "127.0.0.1:8080"
//!
//! [metrics]
//! time_buckets_ms = [10, 50, 100, 200, 500, 1000]
//!
//! [resilience]
//! timeout_ms = 2000
//!
//! [http_client.xkcd]
//! base_url = "https://xkcd.com"
//! connection_timeout_ms = 1000
//! request_timeout_ms = 1000
//! max_connections = 50
//! thread_pool_size = 10
//!
//! [circuit_breaker.XKCD_GET_COMIC_INFO_BY_ID]
//! slow_call_duration_threshold_ms = 1000
//! wait_duration_in_open_state_ms = 5000
//! ```

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::breaker::{CircuitBreakerPolicy, FailureKind};
use crate::client::HttpClientConfig;
use crate::telemetry::DEFAULT_RESILIENCE_TIMEOUT;
use crate::timer::LatencyBuckets;
use crate::{HeimdallError, Result};

/// Application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub resilience: ResilienceConfig,
    /// Downstream dependencies by name.
    #[serde(default)]
    pub http_client: HashMap<String, HttpClientConfig>,
    /// Breaker overrides by breaker name.
    #[serde(default)]
    pub circuit_breaker: HashMap<String, CircuitBreakerConfig>,
}

/// Server network configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Address to bind to (default: 127.0.0.1:8080).
    #[serde(default = "default_address")]
    pub address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
        }
    }
}

fn default_address() -> String {
    "127.0.0.1:8080".to_string()
}

/// Statistic timer configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MetricsConfig {
    /// Latency bucket boundaries in milliseconds. Built-in set when absent.
    #[serde(default)]
    pub time_buckets_ms: Option<Vec<u64>>,
}

/// Resilient call configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ResilienceConfig {
    /// Overall deadline of one resilient call (default: 2000).
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
        }
    }
}

/// Upper bound accepted for `resilience.timeout_ms` (one day).
const MAX_TIMEOUT_MS: u64 = 24 * 60 * 60 * 1000;

fn default_timeout_ms() -> u64 {
    DEFAULT_RESILIENCE_TIMEOUT.as_millis() as u64
}

/// Breaker settings; unset fields keep the value of the policy they are
/// applied to.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CircuitBreakerConfig {
    #[serde(default)]
    pub failure_rate_threshold: Option<f32>,
    #[serde(default)]
    pub slow_call_rate_threshold: Option<f32>,
    #[serde(default)]
    pub slow_call_duration_threshold_ms: Option<u64>,
    #[serde(default)]
    pub wait_duration_in_open_state_ms: Option<u64>,
    #[serde(default)]
    pub sliding_window_size: Option<usize>,
    #[serde(default)]
    pub minimum_number_of_calls: Option<usize>,
    #[serde(default)]
    pub permitted_calls_in_half_open_state: Option<usize>,
    #[serde(default)]
    pub ignore_failures: Option<Vec<FailureKind>>,
    #[serde(default)]
    pub record_failures: Option<Vec<FailureKind>>,
}

impl CircuitBreakerConfig {
    pub fn apply_to(&self, mut policy: CircuitBreakerPolicy) -> CircuitBreakerPolicy {
        if let Some(rate) = self.failure_rate_threshold {
            policy = policy.failure_rate_threshold(rate);
        }
        if let Some(rate) = self.slow_call_rate_threshold {
            policy = policy.slow_call_rate_threshold(rate);
        }
        if let Some(ms) = self.slow_call_duration_threshold_ms {
            policy = policy.slow_call_duration_threshold(Duration::from_millis(ms));
        }
        if let Some(ms) = self.wait_duration_in_open_state_ms {
            policy = policy.wait_duration_in_open_state(Duration::from_millis(ms));
        }
        if let Some(size) = self.sliding_window_size {
            policy = policy.sliding_window_size(size);
        }
        if let Some(calls) = self.minimum_number_of_calls {
            policy = policy.minimum_number_of_calls(calls);
        }
        if let Some(calls) = self.permitted_calls_in_half_open_state {
            policy = policy.permitted_calls_in_half_open_state(calls);
        }
        if let Some(kinds) = &self.ignore_failures {
            policy = policy.ignore_failures(kinds);
        }
        if let Some(kinds) = &self.record_failures {
            policy = policy.record_failures(kinds);
        }
        policy
    }
}

impl Config {
    /// Load configuration from the standard locations.
    ///
    /// Resolution order:
    /// 1. Explicit path (if provided)
    /// 2. `~/.heimdall/config.toml`
    /// 3. `/etc/heimdall/config.toml`
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let path = Self::resolve_config_path(explicit_path)?;
        Self::load_from_file(&path)
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            HeimdallError::Configuration(format!("Failed to read config file {path:?}: {e}"))
        })?;
        let config: Config = toml::from_str(&content).map_err(|e| {
            HeimdallError::Configuration(format!("Failed to parse config file {path:?}: {e}"))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Resolve the config file path.
    fn resolve_config_path(explicit: Option<&Path>) -> Result<PathBuf> {
        if let Some(path) = explicit {
            if path.exists() {
                return Ok(path.to_path_buf());
            }
            return Err(HeimdallError::Configuration(format!(
                "Config file not found: {path:?}"
            )));
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".heimdall").join("config.toml");
            if user_config.exists() {
                return Ok(user_config);
            }
        }

        let system_config = PathBuf::from("/etc/heimdall/config.toml");
        if system_config.exists() {
            return Ok(system_config);
        }

        Err(HeimdallError::Configuration(
            "No config file found. Create ~/.heimdall/config.toml or /etc/heimdall/config.toml"
                .to_string(),
        ))
    }

    /// Check cross-field constraints serde cannot express.
    pub fn validate(&self) -> Result<()> {
        for name in self.http_client.keys() {
            self.http_client(name)?.validate()?;
        }
        self.time_buckets()?;
        if self.resilience.timeout_ms == 0 || self.resilience.timeout_ms > MAX_TIMEOUT_MS {
            return Err(HeimdallError::Configuration(format!(
                "resilience.timeout_ms must be between 1 and {MAX_TIMEOUT_MS}"
            )));
        }
        Ok(())
    }

    /// Settings of the dependency named `name`, with its pool name filled in.
    pub fn http_client(&self, name: &str) -> Result<HttpClientConfig> {
        let mut config = self.http_client.get(name).cloned().ok_or_else(|| {
            HeimdallError::Configuration(format!("no [http_client.{name}] section configured"))
        })?;
        if config.pool_name.is_empty() {
            config.pool_name = name.to_string();
        }
        Ok(config)
    }

    /// Breaker policy for `name`: the `[circuit_breaker.<name>]` section
    /// applied over `fallback`, or `fallback` itself when there is none.
    pub fn circuit_breaker_policy(
        &self,
        name: &str,
        fallback: CircuitBreakerPolicy,
    ) -> CircuitBreakerPolicy {
        match self.circuit_breaker.get(name) {
            Some(section) => section.apply_to(fallback),
            None => fallback,
        }
    }

    pub fn time_buckets(&self) -> Result<LatencyBuckets> {
        match &self.metrics.time_buckets_ms {
            Some(ms) => LatencyBuckets::from_millis(ms),
            None => Ok(LatencyBuckets::default()),
        }
    }

    pub fn resilience_timeout(&self) -> Duration {
        Duration::from_millis(self.resilience.timeout_ms)
    }
}
