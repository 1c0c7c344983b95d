//! In-memory collaborators for unit tests

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use super::{
    ConnectionProvider, ConnectionReport, EmergencyStopAuthority, HealthReport, StopReason,
};
use crate::models::ActiveTestRecord;

/// Connection provider with scripted answers
#[derive(Default)]
pub struct FakeConnection {
    failed_services: Vec<String>,
    health_issues: Vec<String>,
    pub connection_calls: AtomicUsize,
    pub health_calls: AtomicUsize,
}

impl FakeConnection {
    pub fn healthy() -> Self {
        Self::default()
    }

    pub fn unreachable(services: &[&str]) -> Self {
        Self {
            failed_services: services.iter().map(|s| s.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn unhealthy(issues: &[&str]) -> Self {
        Self {
            health_issues: issues.iter().map(|s| s.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn connection_calls(&self) -> usize {
        self.connection_calls.load(Ordering::SeqCst)
    }

    pub fn health_calls(&self) -> usize {
        self.health_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConnectionProvider for FakeConnection {
    async fn test_connection(&self) -> ConnectionReport {
        self.connection_calls.fetch_add(1, Ordering::SeqCst);
        ConnectionReport {
            success: self.failed_services.is_empty(),
            failed_services: self.failed_services.clone(),
            ..ConnectionReport::default()
        }
    }

    async fn health_check(&self) -> HealthReport {
        self.health_calls.fetch_add(1, Ordering::SeqCst);
        HealthReport {
            healthy: self.health_issues.is_empty(),
            issues: self.health_issues.clone(),
            recommendations: Vec::new(),
        }
    }
}

/// Authority that records calls and can be told to misbehave
#[derive(Default)]
pub struct RecordingAuthority {
    active: AtomicBool,
    pub panic_on_register: bool,
    pub initiated: Mutex<Vec<(StopReason, String, String)>>,
}

impl RecordingAuthority {
    pub fn panicking() -> Self {
        Self {
            panic_on_register: true,
            ..Self::default()
        }
    }

    pub fn initiated(&self) -> Vec<(StopReason, String, String)> {
        self.initiated.lock().clone()
    }
}

#[async_trait]
impl EmergencyStopAuthority for RecordingAuthority {
    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    async fn initiate(
        &self,
        reason: StopReason,
        details: &str,
        initiated_by: &str,
    ) -> anyhow::Result<()> {
        self.active.store(true, Ordering::SeqCst);
        self.initiated
            .lock()
            .push((reason, details.to_string(), initiated_by.to_string()));
        Ok(())
    }

    fn register_active(&self, record: ActiveTestRecord) {
        if self.panic_on_register {
            panic!("registry rejected {}", record.test_id);
        }
    }

    fn unregister_active(&self, _test_id: &str) {}
}
