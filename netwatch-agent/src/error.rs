//! Error taxonomy shared by probes, configuration and report sinks

use std::time::Duration;
use thiserror::Error;

use crate::model::ProbeStatus;

/// Failure of a single probe or of the collaborator call behind it
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ProbeError {
    /// A required external capability is missing (binary, interface, file)
    #[error("tool unavailable: {0}")]
    ToolUnavailable(String),

    /// The external call exceeded its bound
    #[error("timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    /// The external call ran but reported an error outcome
    #[error("{0}")]
    Execution(String),
}

impl ProbeError {
    pub fn execution(msg: impl Into<String>) -> Self {
        ProbeError::Execution(msg.into())
    }

    pub fn unavailable(what: impl Into<String>) -> Self {
        ProbeError::ToolUnavailable(what.into())
    }

    /// Status a probe reports when it ends with this error
    pub fn status(&self) -> ProbeStatus {
        match self {
            ProbeError::ToolUnavailable(_) => ProbeStatus::Skipped,
            ProbeError::Timeout(_) | ProbeError::Execution(_) => ProbeStatus::Failed,
        }
    }
}

impl From<std::io::Error> for ProbeError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => ProbeError::ToolUnavailable(err.to_string()),
            _ => ProbeError::Execution(err.to_string()),
        }
    }
}

/// Configuration file could not be used at all
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid TOML in {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("no configuration directory on this platform")]
    NoConfigDir,
}

/// A report sink could not persist an event
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("write to {path} failed: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("write to {path} exceeded {}ms", .timeout.as_millis())]
    Timeout { path: String, timeout: Duration },

    #[error("could not encode event: {0}")]
    Encode(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_mapping() {
        assert_eq!(ProbeError::unavailable("iw").status(), ProbeStatus::Skipped);
        assert_eq!(ProbeError::Timeout(Duration::from_secs(5)).status(), ProbeStatus::Failed);
        assert_eq!(ProbeError::execution("unreachable").status(), ProbeStatus::Failed);
    }

    #[test]
    fn test_missing_binary_is_unavailable() {
        let err: ProbeError = std::io::Error::new(std::io::ErrorKind::NotFound, "ping").into();
        assert!(matches!(err, ProbeError::ToolUnavailable(_)));
    }

    #[test]
    fn test_timeout_message() {
        let err = ProbeError::Timeout(Duration::from_secs(5));
        assert_eq!(err.to_string(), "timed out after 5s");
    }
}
