//! Error handling module for labprov
//!
//! Provides centralized error handling with proper error types using thiserror.
//! Plan construction, configuration loading and plan execution all report
//! through [`ProvisionError`].

use std::time::Duration;
use thiserror::Error;

/// Main error type for labprov
#[derive(Error, Debug)]
pub enum ProvisionError {
    /// IO errors (file operations, spawning processes)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration errors (loading, parsing)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Validation errors (config values out of range or malformed)
    #[error("Validation error: {0}")]
    Validation(String),

    /// A required setting had no override, environment value or default
    #[error("Required setting '{name}' is not set (override key or environment variable '{env_var}')")]
    MissingSetting { name: String, env_var: String },

    /// Only one half of a credential pair was supplied
    #[error("Server '{server}': '{present}' is set but '{missing}' is not; both or neither must be given")]
    PartialCredentials {
        server: String,
        present: String,
        missing: String,
    },

    /// A script step exited unsuccessfully; the rest of the plan was skipped
    #[error("Step {index} ({script}) failed with exit code {}: {stderr}", exit_code.map_or_else(|| "none".to_string(), |c| c.to_string()))]
    StepFailed {
        index: usize,
        script: String,
        exit_code: Option<i32>,
        stderr: String,
    },

    /// Host did not come back after a reboot step
    #[error("Host '{host}' did not respond within {}s after reboot (step {index})", timeout.as_secs())]
    RebootTimeout {
        host: String,
        index: usize,
        timeout: Duration,
    },

    /// Transport could not deliver a step (spawn failure, upload failure)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Run state machine rejected a transition
    #[error("Run state error: {0}")]
    Transition(String),
}

/// Result type alias for labprov operations
pub type Result<T> = std::result::Result<T, ProvisionError>;

// Convenient error constructors
impl ProvisionError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a transport error
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Create a run state error
    pub fn transition(msg: impl Into<String>) -> Self {
        Self::Transition(msg.into())
    }

    /// Whether this error was raised before any step ran
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Self::Config(_)
                | Self::Validation(_)
                | Self::MissingSetting { .. }
                | Self::PartialCredentials { .. }
                | Self::Json(_)
        )
    }
}
