//! Active test registry
//!
//! Tracks the tests currently inside the runner and mirrors every change to
//! the emergency-stop authority. A registration lives exactly as long as the
//! [`ActiveTestGuard`] it returns.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::models::ActiveTestRecord;
use crate::safety::EmergencyStopAuthority;

pub struct ActiveTestRegistry {
    records: Mutex<HashMap<String, ActiveTestRecord>>,
    authority: Arc<dyn EmergencyStopAuthority>,
}

impl ActiveTestRegistry {
    pub fn new(authority: Arc<dyn EmergencyStopAuthority>) -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            authority,
        }
    }

    /// Register a running test; it is unregistered when the guard drops.
    ///
    /// The authority is told first, so a rejected registration leaves no
    /// local record behind.
    pub fn register(&self, record: ActiveTestRecord) -> ActiveTestGuard<'_> {
        debug!("Registering active test {}", record.test_id);
        let test_id = record.test_id.clone();
        self.authority.register_active(record.clone());
        self.records.lock().insert(test_id.clone(), record);
        ActiveTestGuard {
            registry: self,
            test_id,
        }
    }

    fn unregister(&self, test_id: &str) {
        self.records.lock().remove(test_id);
        self.authority.unregister_active(test_id);
    }

    pub fn snapshot(&self) -> Vec<ActiveTestRecord> {
        self.records.lock().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every local record, unregistering each from the authority
    pub fn clear(&self) {
        let drained: Vec<String> = self.records.lock().drain().map(|(id, _)| id).collect();
        for id in drained {
            self.authority.unregister_active(&id);
        }
    }
}

/// Keeps one test registered; unregisters it on drop, unwinding included
pub struct ActiveTestGuard<'a> {
    registry: &'a ActiveTestRegistry,
    test_id: String,
}

impl Drop for ActiveTestGuard<'_> {
    fn drop(&mut self) {
        debug!("Unregistering active test {}", self.test_id);
        self.registry.unregister(&self.test_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{TestDefinition, TestOutcome};
    use crate::safety::testing::RecordingAuthority;
    use crate::safety::EmergencyStopManager;
    use chrono::Utc;
    use std::panic::{catch_unwind, AssertUnwindSafe};

    fn record(id: &str) -> ActiveTestRecord {
        let def = TestDefinition::from_fn(id, id, "unit", |_ctx| async { Ok(TestOutcome::pass()) });
        ActiveTestRecord::running(&def, Utc::now())
    }

    #[test]
    fn test_registry_mirrors_authority() {
        let manager = Arc::new(EmergencyStopManager::default());
        let registry = ActiveTestRegistry::new(manager.clone());

        let a = registry.register(record("a"));
        let _b = registry.register(record("b"));
        assert_eq!(registry.len(), 2);
        assert_eq!(manager.active_tests().len(), 2);

        drop(a);
        assert_eq!(registry.len(), 1);
        assert_eq!(manager.active_tests().len(), 1);

        registry.clear();
        assert!(registry.is_empty());
        assert!(manager.active_tests().is_empty());
    }

    #[test]
    fn test_guard_unregisters_on_unwind() {
        let manager = Arc::new(EmergencyStopManager::default());
        let registry = ActiveTestRegistry::new(manager.clone());

        let unwound = catch_unwind(AssertUnwindSafe(|| {
            let _active = registry.register(record("a"));
            panic!("body exploded");
        }));

        assert!(unwound.is_err());
        assert!(registry.is_empty());
        assert!(manager.active_tests().is_empty());
    }

    #[test]
    fn test_rejected_registration_leaves_no_record() {
        let registry = ActiveTestRegistry::new(Arc::new(RecordingAuthority::panicking()));

        let unwound = catch_unwind(AssertUnwindSafe(|| {
            let _active = registry.register(record("a"));
        }));

        assert!(unwound.is_err());
        assert!(registry.snapshot().is_empty());
    }
}
