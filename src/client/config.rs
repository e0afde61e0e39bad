//! Per-dependency HTTP client settings.

use std::time::Duration;

use serde::Deserialize;

use crate::{HeimdallError, Result};

/// Settings for one downstream HTTP dependency.
///
/// ```toml
/// [http_client.xkcd]
/// base_url = "https://xkcd.com"
/// connection_timeout_ms = 1000
/// request_timeout_ms = 1000
/// max_connections = 50
/// thread_pool_size = 10
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HttpClientConfig {
    pub base_url: String,
    /// Defaults to the dependency's key in the configuration file.
    #[serde(default)]
    pub pool_name: String,
    pub connection_timeout_ms: u64,
    pub request_timeout_ms: u64,
    /// Requests allowed on the wire at once; later calls wait in FIFO order.
    pub max_connections: usize,
    /// Blocking workers decoding response bodies for this dependency.
    pub thread_pool_size: usize,
}

impl HttpClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            pool_name: String::new(),
            connection_timeout_ms: 1000,
            request_timeout_ms: 1000,
            max_connections: 50,
            thread_pool_size: 10,
        }
    }

    pub fn pool_name(mut self, name: impl Into<String>) -> Self {
        self.pool_name = name.into();
        self
    }

    pub fn connection_timeout(&self) -> Duration {
        Duration::from_millis(self.connection_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.base_url.trim().is_empty() {
            return Err(HeimdallError::Configuration(format!(
                "http client '{}': base_url must not be empty",
                self.pool_name
            )));
        }
        if self.max_connections == 0 {
            return Err(HeimdallError::Configuration(format!(
                "http client '{}': max_connections must be at least 1",
                self.pool_name
            )));
        }
        if self.thread_pool_size == 0 {
            return Err(HeimdallError::Configuration(format!(
                "http client '{}': thread_pool_size must be at least 1",
                self.pool_name
            )));
        }
        if self.connection_timeout_ms == 0 || self.request_timeout_ms == 0 {
            return Err(HeimdallError::Configuration(format!(
                "http client '{}': timeouts must be positive",
                self.pool_name
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_without_pool_name() {
        let config: HttpClientConfig = toml::from_str(
            r#"
            base_url = "https://xkcd.com"
            connection_timeout_ms = 500
            request_timeout_ms = 800
            max_connections = 20
            thread_pool_size = 4
            "#,
        )
        .unwrap();
        assert_eq!(config.pool_name, "");
        assert_eq!(config.request_timeout(), Duration::from_millis(800));
    }

    #[test]
    fn rejects_empty_worker_pool() {
        let mut config = HttpClientConfig::new("http://localhost");
        config.thread_pool_size = 0;
        assert!(matches!(
            config.validate(),
            Err(HeimdallError::Configuration(_))
        ));
    }

    #[test]
    fn rejects_empty_connection_pool() {
        let mut config = HttpClientConfig::new("http://localhost");
        config.max_connections = 0;
        assert!(matches!(
            config.validate(),
            Err(HeimdallError::Configuration(_))
        ));
    }
}
