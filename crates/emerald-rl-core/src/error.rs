//! Error types for Emerald-RL

use std::path::PathBuf;
use thiserror::Error;

/// Result type for Emerald-RL operations
pub type Result<T> = std::result::Result<T, AgentError>;

/// Emerald-RL error types
///
/// Only `Connection`, `Environment` and `Persistence` ever reach the episode
/// controller. `Timeout` and `Parse` are folded into an error
/// [`Observation`](crate::Observation) at the protocol client boundary.
#[derive(Debug, Error)]
pub enum AgentError {
    /// Socket unreachable, closed, or not yet connected
    #[error("Connection error: {0}")]
    Connection(String),

    /// No response within the read bound
    #[error("Protocol timeout: {0}")]
    Timeout(String),

    /// Malformed or short response
    #[error("Protocol parse error: {0}")]
    Parse(String),

    /// Command outside the accepted vocabulary
    #[error("Invalid action: {0}")]
    InvalidAction(String),

    /// Value table save/load/export failure
    #[error("Persistence error at {}: {message}", path.display())]
    Persistence { path: PathBuf, message: String },

    /// Invalid configuration
    #[error("Config error: {0}")]
    Config(String),

    /// Environment refused an operation
    #[error("Environment error: {0}")]
    Environment(String),
}

impl AgentError {
    /// Build a persistence error for `path`
    pub fn persistence(path: impl Into<PathBuf>, message: impl std::fmt::Display) -> Self {
        AgentError::Persistence {
            path: path.into(),
            message: message.to_string(),
        }
    }

    /// Whether the run cannot continue after this error
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            AgentError::Connection(_) | AgentError::Environment(_) | AgentError::Config(_)
        )
    }
}
