//! Core error types for chronoception-core.
//!
//! Every failure the core can produce is a rejected operation returned to the
//! caller. None of them are process-fatal.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for chronoception-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Round controller rejections
    #[error("Round error: {0}")]
    Round(#[from] RoundError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Client/probe transport errors
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Rejections produced by the round controller.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RoundError {
    /// Start arguments violate `interval > 0`, `window > 0`, `window < interval`.
    #[error("Invalid parameters: {reason}")]
    InvalidParameters { reason: String },

    /// No open round to resolve.
    #[error("Game not running")]
    RoundNotActive,

    /// The caller targeted a round that has since been re-armed or resolved.
    #[error("Stale round: expected round {expected}, current round is {current}")]
    StaleRound { expected: u64, current: u64 },
}

impl RoundError {
    pub fn invalid(reason: impl Into<String>) -> Self {
        RoundError::InvalidParameters {
            reason: reason.into(),
        }
    }

    /// Stable machine-readable name used on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            RoundError::InvalidParameters { .. } => "invalid_parameters",
            RoundError::RoundNotActive => "round_not_active",
            RoundError::StaleRound { .. } => "stale_round",
        }
    }
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Unknown configuration key
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),

    /// No usable configuration directory
    #[error("Could not determine configuration directory")]
    NoConfigDir,
}

/// Errors talking to a remote round controller.
#[derive(Error, Debug)]
pub enum TransportError {
    /// Request could not be sent or the connection failed
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Server answered with a non-success status
    #[error("Server rejected request (HTTP {status}): {message}")]
    Rejected {
        status: u16,
        kind: Option<String>,
        message: String,
    },

    /// Base URL could not be joined with a route
    #[error("Invalid server URL: {0}")]
    Url(#[from] url::ParseError),

    /// Probe exceeded its time budget
    #[error("Request timed out after {timeout_ms} ms")]
    Timeout { timeout_ms: u64 },
}

impl TransportError {
    /// The controller rejection carried by a 4xx answer, if any.
    pub fn round_error_kind(&self) -> Option<&str> {
        match self {
            TransportError::Rejected { kind, .. } => kind.as_deref(),
            _ => None,
        }
    }

    /// Worth retrying as-is: the request may not have reached the server,
    /// or the server failed on its side.
    pub fn is_transient(&self) -> bool {
        match self {
            TransportError::Request(_) | TransportError::Timeout { .. } => true,
            TransportError::Rejected { status, .. } => *status >= 500,
            TransportError::Url(_) => false,
        }
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_errors_have_stable_kinds() {
        assert_eq!(RoundError::invalid("x").kind(), "invalid_parameters");
        assert_eq!(RoundError::RoundNotActive.kind(), "round_not_active");
        assert_eq!(
            RoundError::StaleRound {
                expected: 1,
                current: 2
            }
            .kind(),
            "stale_round"
        );
    }

    #[test]
    fn round_error_converts_into_core_error() {
        let err: CoreError = RoundError::RoundNotActive.into();
        assert!(matches!(err, CoreError::Round(RoundError::RoundNotActive)));
        assert_eq!(err.to_string(), "Round error: Game not running");
    }

    #[test]
    fn rejected_transport_error_exposes_kind() {
        let err = TransportError::Rejected {
            status: 400,
            kind: Some("round_not_active".into()),
            message: "Game not running".into(),
        };
        assert_eq!(err.round_error_kind(), Some("round_not_active"));
        assert!(!err.is_transient());
    }

    #[test]
    fn server_failures_and_timeouts_are_transient() {
        let err = TransportError::Rejected {
            status: 503,
            kind: None,
            message: "unavailable".into(),
        };
        assert!(err.is_transient());
        assert!(TransportError::Timeout { timeout_ms: 100 }.is_transient());
    }
}
