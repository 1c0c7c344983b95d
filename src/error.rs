//! Error types for the test engine
//!
//! Engine-level errors surface to the caller of [`crate::executor::TestEngine`].
//! Attempt-level errors are recovered inside the runner and only ever appear
//! as the `error` text of a failed [`crate::models::TestResult`].

use thiserror::Error;

/// Errors returned by the test engine
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Production connectivity failed: {}", failed_services.join(", "))]
    Connectivity { failed_services: Vec<String> },

    #[error("Health check failed: {}", issues.join(", "))]
    HealthCheck { issues: Vec<String> },

    #[error("Engine is not initialized, call initialize() first")]
    NotInitialized,

    #[error("Emergency stop is active, refusing to execute")]
    EmergencyStopActive,

    #[error("Another suite is already executing on this engine")]
    RunInProgress,

    #[error("Invalid test suite: {0}")]
    InvalidSuite(String),

    #[error("Unexpected suite error: {0}")]
    Unexpected(String),

    #[error("Emergency stop request failed: {0}")]
    EmergencyStop(String),
}

/// Failure of a single test attempt
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AttemptError {
    #[error("{0}")]
    Execution(String),

    #[error("timeout after {0}ms")]
    Timeout(u64),

    #[error("test body panicked: {0}")]
    Panicked(String),
}
