//! Safety collaborators of the test engine
//!
//! The engine never connects to the production target or stops tests on its
//! own. It consumes a [`ConnectionProvider`] for connectivity and health, and
//! an [`EmergencyStopAuthority`] that owns the global stop signal.

mod connection;
mod emergency;
#[cfg(test)]
pub mod testing;

pub use connection::HttpConnectionProvider;
pub use emergency::EmergencyStopManager;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

use crate::models::ActiveTestRecord;

/// Connectivity state of one production service
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConnectionStatus {
    pub service: String,
    pub connected: bool,
    pub last_checked: DateTime<Utc>,
    pub response_time_ms: u64,
    pub error: Option<String>,
}

/// Outcome of a connectivity test across all services
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ConnectionReport {
    pub success: bool,
    pub connected_services: Vec<String>,
    pub failed_services: Vec<String>,
    pub total_response_time_ms: u64,
    pub details: Vec<ConnectionStatus>,
}

/// Outcome of a pre-run health check
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct HealthReport {
    pub healthy: bool,
    pub issues: Vec<String>,
    pub recommendations: Vec<String>,
}

impl HealthReport {
    pub fn healthy() -> Self {
        Self {
            healthy: true,
            ..Self::default()
        }
    }
}

/// Checks that the production target is reachable and healthy
#[async_trait]
pub trait ConnectionProvider: Send + Sync {
    async fn test_connection(&self) -> ConnectionReport;

    async fn health_check(&self) -> HealthReport;
}

/// Why an emergency stop was initiated
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StopReason {
    DataIntegrityViolation,
    ResourceOverload,
    SecurityBreach,
    UnexpectedError,
    ManualRequest,
    TimeoutExceeded,
    ResourceUnavailable,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StopReason::DataIntegrityViolation => "DataIntegrityViolation",
            StopReason::ResourceOverload => "ResourceOverload",
            StopReason::SecurityBreach => "SecurityBreach",
            StopReason::UnexpectedError => "UnexpectedError",
            StopReason::ManualRequest => "ManualRequest",
            StopReason::TimeoutExceeded => "TimeoutExceeded",
            StopReason::ResourceUnavailable => "ResourceUnavailable",
        };
        f.write_str(name)
    }
}

/// State recorded when an emergency stop is initiated
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StopState {
    pub active: bool,
    pub reason: StopReason,
    pub details: String,
    pub timestamp: DateTime<Utc>,
    pub initiated_by: String,
    pub affected_tests: Vec<String>,
    pub recovery_actions: Vec<String>,
}

/// Notifications published by an emergency-stop authority
#[derive(Clone, Debug)]
pub enum StopEvent {
    Completed(StopState),
    Failed(String),
    Reset,
}

/// Owner of the global emergency-stop signal
#[async_trait]
pub trait EmergencyStopAuthority: Send + Sync {
    fn is_active(&self) -> bool;

    async fn initiate(
        &self,
        reason: StopReason,
        details: &str,
        initiated_by: &str,
    ) -> anyhow::Result<()>;

    fn register_active(&self, record: ActiveTestRecord);

    fn unregister_active(&self, test_id: &str);

    /// Stream of stop notifications, if the authority publishes any
    fn subscribe(&self) -> Option<broadcast::Receiver<StopEvent>> {
        None
    }
}
