//! Heimdall error types

use std::time::Duration;

use crate::breaker::FailureKind;

/// Heimdall error types
#[derive(Debug, thiserror::Error)]
pub enum HeimdallError {
    // Configuration errors
    #[error("configuration error: {0}")]
    Configuration(String),

    // Remote declared the request invalid (4xx)
    #[error("client request error ({status}): {message}")]
    ClientRequest { status: u16, message: String },

    // Remote or infrastructure malfunction (5xx and friends)
    #[error("server fault ({status}): {message}")]
    ServerFault { status: u16, message: String },

    /// The HTTP client's own read/write timeout fired.
    #[error("transport timeout: {0}")]
    TransportTimeout(String),

    #[error("HTTP error: {0}")]
    Http(String),

    /// The whole call exceeded its resilience deadline.
    #[error("call {command} timed out after {timeout:?}")]
    Timeout { command: String, timeout: Duration },

    /// Synthetic failure raised while the breaker rejects calls.
    /// No network attempt was made.
    #[error("circuit breaker {name} is open, call not permitted")]
    CircuitOpen { name: String },

    // Data errors
    #[error("deserialization error: {0}")]
    Deserialization(#[from] serde_json::Error),
}

impl HeimdallError {
    /// Classify an attempt failure for breaker bookkeeping.
    ///
    /// Returns `None` for errors that never reach the network
    /// (configuration problems, calls rejected by an open breaker).
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            HeimdallError::ClientRequest { status, .. } => Some(FailureKind::from_status(*status)),
            HeimdallError::ServerFault { status, .. } => Some(FailureKind::from_status(*status)),
            HeimdallError::TransportTimeout(_) => Some(FailureKind::ReadTimeout),
            HeimdallError::Http(_) => Some(FailureKind::Connect),
            HeimdallError::Timeout { .. } => Some(FailureKind::CallTimeout),
            HeimdallError::Deserialization(_) => Some(FailureKind::Deserialization),
            HeimdallError::Configuration(_) | HeimdallError::CircuitOpen { .. } => None,
        }
    }

    /// Whether the remote rejected the request itself (4xx-class).
    pub fn is_client_error(&self) -> bool {
        matches!(self, HeimdallError::ClientRequest { .. })
    }

    /// HTTP status carried by the error, if the remote answered.
    pub fn status(&self) -> Option<u16> {
        match self {
            HeimdallError::ClientRequest { status, .. }
            | HeimdallError::ServerFault { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Result type alias for Heimdall operations
pub type Result<T> = std::result::Result<T, HeimdallError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_errors_map_to_failure_kinds() {
        let not_found = HeimdallError::ClientRequest {
            status: 404,
            message: "missing".into(),
        };
        assert_eq!(not_found.failure_kind(), Some(FailureKind::NotFound));
        assert!(not_found.is_client_error());

        let gateway = HeimdallError::ServerFault {
            status: 504,
            message: "upstream".into(),
        };
        assert_eq!(gateway.failure_kind(), Some(FailureKind::GatewayTimeout));
        assert_eq!(gateway.status(), Some(504));
    }

    #[test]
    fn rejected_calls_have_no_failure_kind() {
        let open = HeimdallError::CircuitOpen {
            name: "dep".into(),
        };
        assert_eq!(open.failure_kind(), None);
        assert_eq!(
            HeimdallError::Configuration("x".into()).failure_kind(),
            None
        );
    }

    #[test]
    fn timeouts_are_distinguished() {
        let read = HeimdallError::TransportTimeout("read".into());
        assert_eq!(read.failure_kind(), Some(FailureKind::ReadTimeout));
        let call = HeimdallError::Timeout {
            command: "cmd".into(),
            timeout: Duration::from_millis(10),
        };
        assert_eq!(call.failure_kind(), Some(FailureKind::CallTimeout));
        assert!(call.to_string().contains("cmd"));
    }
}
