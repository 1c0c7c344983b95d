//! Run-scoped execution state
//!
//! One [`ExecutionContext`] exists per `execute_suite` call and is dropped
//! when the call returns.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;

use crate::models::{ExecutionStatistics, TestResult, TestSuite};

pub struct ExecutionContext {
    pub suite_id: String,
    pub start_time: DateTime<Utc>,
    total_tests: usize,
    results: Mutex<HashMap<String, TestResult>>,
}

impl ExecutionContext {
    pub fn new(suite: &TestSuite) -> Self {
        Self {
            suite_id: suite.id.clone(),
            start_time: Utc::now(),
            total_tests: suite.tests.len(),
            results: Mutex::new(HashMap::with_capacity(suite.tests.len())),
        }
    }

    /// Store the final result of a test, replacing any earlier entry
    pub fn record(&self, result: TestResult) {
        self.results.lock().insert(result.test_id.clone(), result);
    }

    pub fn get(&self, test_id: &str) -> Option<TestResult> {
        self.results.lock().get(test_id).cloned()
    }

    pub fn completed(&self) -> usize {
        self.results.lock().len()
    }

    /// Statistics recomputed from the stored results
    pub fn statistics(&self) -> ExecutionStatistics {
        let results = self.results.lock();
        ExecutionStatistics::from_results(self.total_tests, results.values())
    }

    pub fn results(&self) -> HashMap<String, TestResult> {
        self.results.lock().clone()
    }
}
