//! Test result models
//!
//! Defines execution status, per-test results and run statistics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::TestDefinition;

/// Test execution status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TestStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Stopped,
    Skipped,
}

impl TestStatus {
    pub fn symbol(&self) -> &'static str {
        match self {
            TestStatus::Pending => "…",
            TestStatus::Running => "▶",
            TestStatus::Completed => "✓",
            TestStatus::Failed => "✗",
            TestStatus::Stopped => "■",
            TestStatus::Skipped => "○",
        }
    }

    /// Whether no further transition is possible from this status
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TestStatus::Pending | TestStatus::Running)
    }
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestStatus::Pending => write!(f, "PENDING"),
            TestStatus::Running => write!(f, "RUNNING"),
            TestStatus::Completed => write!(f, "COMPLETED"),
            TestStatus::Failed => write!(f, "FAILED"),
            TestStatus::Stopped => write!(f, "STOPPED"),
            TestStatus::Skipped => write!(f, "SKIPPED"),
        }
    }
}

/// Result of a single test execution
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TestResult {
    pub test_id: String,
    pub test_name: String,
    pub category: String,
    pub status: TestStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_ms: u64,
    pub success: bool,
    pub error: Option<String>,
    /// Number of times the test body was invoked
    pub attempts: u32,
    pub metrics: Option<serde_json::Value>,
}

impl TestResult {
    fn base(def: &TestDefinition, status: TestStatus, start_time: DateTime<Utc>) -> Self {
        Self {
            test_id: def.id.clone(),
            test_name: def.name.clone(),
            category: def.category.clone(),
            status,
            start_time,
            end_time: None,
            duration_ms: 0,
            success: false,
            error: None,
            attempts: 0,
            metrics: None,
        }
    }

    pub fn completed(def: &TestDefinition, start_time: DateTime<Utc>) -> Self {
        Self {
            success: true,
            ..Self::base(def, TestStatus::Completed, start_time)
        }
    }

    pub fn failed(
        def: &TestDefinition,
        start_time: DateTime<Utc>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::base(def, TestStatus::Failed, start_time)
        }
    }

    pub fn stopped(
        def: &TestDefinition,
        start_time: DateTime<Utc>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            error: Some(reason.into()),
            ..Self::base(def, TestStatus::Stopped, start_time)
        }
    }

    pub fn skipped(
        def: &TestDefinition,
        start_time: DateTime<Utc>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            error: Some(reason.into()),
            ..Self::base(def, TestStatus::Skipped, start_time)
        }
    }

    pub fn with_metrics(mut self, metrics: Option<serde_json::Value>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Stamp end time, total duration and attempt count
    pub fn finish(mut self, end_time: DateTime<Utc>, duration_ms: u64, attempts: u32) -> Self {
        self.end_time = Some(end_time);
        self.duration_ms = duration_ms;
        self.attempts = attempts;
        self
    }
}

impl fmt::Display for TestResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} ({}) [{}ms]",
            self.status.symbol(),
            self.test_name,
            self.test_id,
            self.duration_ms
        )?;
        if let Some(err) = &self.error {
            write!(f, " - {err}")?;
        }
        Ok(())
    }
}

/// Statistics for one suite run, derived from its results
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionStatistics {
    pub total_tests: usize,
    pub completed_tests: usize,
    pub passed_tests: usize,
    pub failed_tests: usize,
    pub skipped_tests: usize,
    pub total_duration_ms: u64,
    pub average_duration_ms: f64,
    pub success_rate: f64,
}

impl ExecutionStatistics {
    pub fn from_results<'a>(
        total_tests: usize,
        results: impl IntoIterator<Item = &'a TestResult>,
    ) -> Self {
        let mut stats = Self {
            total_tests,
            ..Self::default()
        };

        for result in results {
            stats.completed_tests += 1;
            stats.total_duration_ms += result.duration_ms;
            if result.success {
                stats.passed_tests += 1;
            } else if result.status == TestStatus::Skipped {
                stats.skipped_tests += 1;
            } else {
                stats.failed_tests += 1;
            }
        }

        if stats.completed_tests > 0 {
            stats.average_duration_ms =
                stats.total_duration_ms as f64 / stats.completed_tests as f64;
            stats.success_rate = stats.passed_tests as f64 / stats.completed_tests as f64;
        }

        stats
    }

    pub fn is_all_passed(&self) -> bool {
        self.total_tests == self.passed_tests
    }
}

impl fmt::Display for ExecutionStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Total: {} | Completed: {} | Pass: {} | Fail: {} | Skip: {} | Success: {:.1}% | Duration: {}ms",
            self.total_tests,
            self.completed_tests,
            self.passed_tests,
            self.failed_tests,
            self.skipped_tests,
            self.success_rate * 100.0,
            self.total_duration_ms
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TestOutcome;

    fn def(id: &str) -> TestDefinition {
        TestDefinition::from_fn(id, id, "unit", |_ctx| async { Ok(TestOutcome::pass()) })
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!TestStatus::Pending.is_terminal());
        assert!(!TestStatus::Running.is_terminal());
        assert!(TestStatus::Stopped.is_terminal());
        assert!(TestStatus::Skipped.is_terminal());
    }

    #[test]
    fn test_result_constructors() {
        let now = Utc::now();
        let ok = TestResult::completed(&def("a"), now);
        assert!(ok.success);
        assert_eq!(ok.status, TestStatus::Completed);

        let failed = TestResult::failed(&def("b"), now, "boom");
        assert!(!failed.success);
        assert_eq!(failed.status, TestStatus::Failed);
        assert_eq!(failed.error.as_deref(), Some("boom"));

        let skipped = TestResult::skipped(&def("c"), now, "dependency");
        assert!(!skipped.success);
        assert_eq!(skipped.status, TestStatus::Skipped);
    }

    #[test]
    fn test_statistics_invariant() {
        let now = Utc::now();
        let results = vec![
            TestResult::completed(&def("a"), now).finish(now, 100, 1),
            TestResult::failed(&def("b"), now, "x").finish(now, 50, 3),
            TestResult::stopped(&def("c"), now, "stop"),
            TestResult::skipped(&def("d"), now, "dep"),
        ];

        let stats = ExecutionStatistics::from_results(6, &results);
        assert_eq!(stats.completed_tests, 4);
        assert_eq!(stats.passed_tests, 1);
        assert_eq!(stats.failed_tests, 2);
        assert_eq!(stats.skipped_tests, 1);
        assert_eq!(
            stats.passed_tests + stats.failed_tests + stats.skipped_tests,
            stats.completed_tests
        );
        assert!(stats.completed_tests <= stats.total_tests);
        assert_eq!(stats.total_duration_ms, 150);
        assert_eq!(stats.success_rate, 0.25);
    }

    #[test]
    fn test_statistics_empty() {
        let stats = ExecutionStatistics::from_results(3, std::iter::empty());
        assert_eq!(stats.completed_tests, 0);
        assert_eq!(stats.success_rate, 0.0);
        assert_eq!(stats.average_duration_ms, 0.0);
    }
}
