//! Request descriptor and call outcome.

use crate::{HeimdallError, Result};

/// One outbound GET: path relative to the dependency's base URL, the
/// command name used for metrics and logs, and optional extras.
#[derive(Debug, Clone, PartialEq)]
pub struct CallRequest {
    path: String,
    command: String,
    headers: Vec<(String, String)>,
    body: Option<serde_json::Value>,
}

impl CallRequest {
    /// `command` names the call in statistic timers and must not be empty.
    pub fn new(path: impl Into<String>, command: impl Into<String>) -> Result<Self> {
        let command = command.into();
        if command.trim().is_empty() {
            return Err(HeimdallError::Configuration(
                "call request command must not be empty".to_string(),
            ));
        }
        let path = path.into();
        let path = if path.starts_with('/') {
            path
        } else {
            format!("/{path}")
        };
        Ok(Self {
            path,
            command,
            headers: Vec::new(),
            body: None,
        })
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn request_body(&self) -> Option<&serde_json::Value> {
        self.body.as_ref()
    }
}

/// Value produced by a resilient call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallOutcome<T> {
    /// The dependency answered.
    Success(T),
    /// The caller-supplied default stood in for a failed or late call.
    Default(T),
}

impl<T> CallOutcome<T> {
    pub fn into_inner(self) -> T {
        match self {
            CallOutcome::Success(value) | CallOutcome::Default(value) => value,
        }
    }

    pub fn is_default(&self) -> bool {
        matches!(self, CallOutcome::Default(_))
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> CallOutcome<U> {
        match self {
            CallOutcome::Success(value) => CallOutcome::Success(f(value)),
            CallOutcome::Default(value) => CallOutcome::Default(f(value)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_command_is_rejected() {
        let err = CallRequest::new("/1/info.0.json", "  ").unwrap_err();
        assert!(matches!(err, HeimdallError::Configuration(_)));
    }

    #[test]
    fn path_gets_leading_slash() {
        let request = CallRequest::new("1/info.0.json", "CMD")
            .unwrap()
            .header("x-trace", "abc");
        assert_eq!(request.path(), "/1/info.0.json");
        assert_eq!(request.headers().len(), 1);
    }

    #[test]
    fn outcome_unwraps_either_variant() {
        assert_eq!(CallOutcome::Success(1).into_inner(), 1);
        let fallback = CallOutcome::Default(2).map(|v| v * 10);
        assert!(fallback.is_default());
        assert_eq!(fallback.into_inner(), 20);
    }
}
