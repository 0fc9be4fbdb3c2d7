//! Error types for the Liftoff round engine
//!
//! Every inbound command resolves to either a success payload or one of the
//! [`EngineError`] kinds. Commands are validated before any state is touched,
//! so an error never leaves a round half-applied.

use crate::game::types::PlayerId;

/// Result alias used by engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Rejection reasons returned synchronously to the caller of a command
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    /// Malformed input: bad username, non-positive bet, invalid threshold
    #[error("Validation error: {0}")]
    Validation(String),

    /// Action not allowed in the current phase or player state
    #[error("State error: {0}")]
    State(String),

    /// The referenced player is not registered (or already disconnected)
    #[error("Player {0} not found")]
    NotFound(PlayerId),

    /// The engine task has stopped and can no longer take commands
    #[error("Round engine is not running")]
    Unavailable,
}

impl EngineError {
    pub fn validation(message: impl Into<String>) -> Self {
        EngineError::Validation(message.into())
    }

    pub fn state(message: impl Into<String>) -> Self {
        EngineError::State(message.into())
    }

    /// Stable machine-readable code sent to clients
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::Validation(_) => "VALIDATION_ERROR",
            EngineError::State(_) => "STATE_ERROR",
            EngineError::NotFound(_) => "NOT_FOUND",
            EngineError::Unavailable => "ENGINE_UNAVAILABLE",
        }
    }
}

/// Configuration loading and validation errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read configuration file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(EngineError::validation("x").code(), "VALIDATION_ERROR");
        assert_eq!(EngineError::state("x").code(), "STATE_ERROR");
        assert_eq!(EngineError::NotFound(PlayerId(7)).code(), "NOT_FOUND");
        assert_eq!(EngineError::Unavailable.code(), "ENGINE_UNAVAILABLE");
    }

    #[test]
    fn test_error_messages_are_human_readable() {
        let err = EngineError::NotFound(PlayerId(3));
        assert_eq!(err.to_string(), "Player 3 not found");

        let err = EngineError::state("Round already started");
        assert_eq!(err.to_string(), "State error: Round already started");
    }
}
