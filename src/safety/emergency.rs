//! In-process emergency stop authority
//!
//! Holds the global stop flag, the set of active tests and the recovery
//! hooks that run when a stop is initiated.

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::Utc;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use super::{EmergencyStopAuthority, StopEvent, StopReason, StopState};
use crate::models::{ActiveTestRecord, ActiveTestStatus};

type RecoveryHook = Arc<dyn Fn() -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Emergency stop manager
pub struct EmergencyStopManager {
    enabled: bool,
    state: Mutex<Option<StopState>>,
    active_tests: Mutex<HashMap<String, ActiveTestRecord>>,
    stop_in_progress: AtomicBool,
    recovery_hooks: Mutex<Vec<(String, RecoveryHook)>>,
    events: broadcast::Sender<StopEvent>,
}

impl EmergencyStopManager {
    pub fn new(enabled: bool) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            enabled,
            state: Mutex::new(None),
            active_tests: Mutex::new(HashMap::new()),
            stop_in_progress: AtomicBool::new(false),
            recovery_hooks: Mutex::new(Vec::new()),
            events,
        }
    }

    /// Register an async action to run during every emergency stop
    pub fn register_recovery_hook<F>(&self, name: impl Into<String>, hook: F)
    where
        F: Fn() -> BoxFuture<'static, Result<()>> + Send + Sync + 'static,
    {
        self.recovery_hooks.lock().push((name.into(), Arc::new(hook)));
    }

    /// Current stop state, if a stop has been initiated since the last reset
    pub fn state(&self) -> Option<StopState> {
        self.state.lock().clone()
    }

    pub fn active_tests(&self) -> Vec<ActiveTestRecord> {
        self.active_tests.lock().values().cloned().collect()
    }

    /// Clear the stop state so execution can resume
    pub fn reset(&self) {
        let had_state = self.state.lock().take().is_some();
        if had_state {
            info!("Resetting emergency stop state");
            self.active_tests.lock().clear();
            self.stop_in_progress.store(false, Ordering::SeqCst);
            let _ = self.events.send(StopEvent::Reset);
        }
    }

    pub fn cleanup(&self) {
        self.active_tests.lock().clear();
        self.recovery_hooks.lock().clear();
        debug!("Emergency stop manager cleaned up");
    }

    fn stop_active_tests(&self) {
        let mut active = self.active_tests.lock();
        info!("Stopping {} active test(s)", active.len());

        for record in active.values_mut() {
            record.status = ActiveTestStatus::Stopping;
            debug!(
                "Stopping {} ({}) [{}]",
                record.test_name, record.test_id, record.category
            );
            record.status = ActiveTestStatus::Stopped;
        }
    }

    async fn run_recovery_hooks(&self) -> Vec<String> {
        let hooks: Vec<_> = self.recovery_hooks.lock().clone();
        let mut actions = Vec::new();

        for (name, hook) in hooks {
            if let Err(e) = hook().await {
                error!("Recovery hook '{}' failed: {:#}", name, e);
                actions.push(format!("manual check required: recovery hook '{name}' failed"));
            }
        }

        actions
    }

    fn notify_administrators(&self, state: &StopState) {
        let notification = serde_json::json!({
            "title": "Production test emergency stop",
            "reason": state.reason.to_string(),
            "details": state.details,
            "initiated_by": state.initiated_by,
            "timestamp": state.timestamp.to_rfc3339(),
            "affected_tests": state.affected_tests,
            "recovery_actions": state.recovery_actions,
        });
        warn!("Emergency stop notification: {}", notification);
    }
}

impl Default for EmergencyStopManager {
    fn default() -> Self {
        Self::new(true)
    }
}

#[async_trait]
impl EmergencyStopAuthority for EmergencyStopManager {
    fn is_active(&self) -> bool {
        self.state.lock().as_ref().is_some_and(|s| s.active)
    }

    async fn initiate(&self, reason: StopReason, details: &str, initiated_by: &str) -> Result<()> {
        if !self.enabled {
            let message = format!("emergency stop is disabled, cannot handle {reason}");
            error!("{}", message);
            let _ = self.events.send(StopEvent::Failed(message.clone()));
            bail!(message);
        }

        if self.stop_in_progress.swap(true, Ordering::SeqCst) {
            warn!("Emergency stop already in progress, ignoring {}", reason);
            return Ok(());
        }

        error!(
            "Emergency stop initiated: {} - {} (by {})",
            reason, details, initiated_by
        );

        let affected_tests: Vec<String> = self.active_tests.lock().keys().cloned().collect();
        *self.state.lock() = Some(StopState {
            active: true,
            reason,
            details: details.to_string(),
            timestamp: Utc::now(),
            initiated_by: initiated_by.to_string(),
            affected_tests,
            recovery_actions: Vec::new(),
        });

        self.stop_active_tests();
        let recovery_actions = self.run_recovery_hooks().await;

        let snapshot = {
            let mut state = self.state.lock();
            if let Some(state) = state.as_mut() {
                state.recovery_actions.extend(recovery_actions);
            }
            state.clone()
        };

        if let Some(state) = snapshot {
            self.notify_administrators(&state);
            info!("Emergency stop completed");
            let _ = self.events.send(StopEvent::Completed(state));
        }

        self.stop_in_progress.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn register_active(&self, record: ActiveTestRecord) {
        debug!("Active test registered: {} ({})", record.test_name, record.test_id);
        self.active_tests.lock().insert(record.test_id.clone(), record);
    }

    fn unregister_active(&self, test_id: &str) {
        if self.active_tests.lock().remove(test_id).is_some() {
            debug!("Active test unregistered: {}", test_id);
        }
    }

    fn subscribe(&self) -> Option<broadcast::Receiver<StopEvent>> {
        Some(self.events.subscribe())
    }
}
