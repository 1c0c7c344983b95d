//! Test definitions and suites
//!
//! A suite is an ordered list of [`TestDefinition`]s plus the execution
//! settings that decide how the engine dispatches them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::TestResult;
use crate::error::EngineError;

/// Default per-attempt timeout
pub const DEFAULT_TEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Per-attempt context handed to a test body
#[derive(Clone, Debug)]
pub struct TestContext {
    pub test_id: String,
    /// 1-based attempt number
    pub attempt: u32,
    /// Cancelled when an emergency stop is requested through the engine.
    /// Bodies that run long should watch it.
    pub cancellation: CancellationToken,
}

impl TestContext {
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}

/// What a test body reports back; the runner adds identity and timing
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TestOutcome {
    pub success: bool,
    pub skipped: bool,
    pub error: Option<String>,
    pub metrics: Option<serde_json::Value>,
}

impl TestOutcome {
    pub fn pass() -> Self {
        Self {
            success: true,
            ..Self::default()
        }
    }

    pub fn fail(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::default()
        }
    }

    pub fn skip(reason: impl Into<String>) -> Self {
        Self {
            skipped: true,
            error: Some(reason.into()),
            ..Self::default()
        }
    }

    pub fn with_metrics(mut self, metrics: serde_json::Value) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub(crate) fn into_result(self, def: &TestDefinition, start: DateTime<Utc>) -> TestResult {
        let result = if self.skipped {
            TestResult::skipped(def, start, self.error.unwrap_or_default())
        } else if self.success {
            TestResult::completed(def, start)
        } else {
            let error = self
                .error
                .unwrap_or_else(|| "test reported failure".to_string());
            TestResult::failed(def, start, error)
        };
        result.with_metrics(self.metrics)
    }
}

/// Body of a verification test
#[async_trait]
pub trait TestBody: Send + Sync {
    async fn execute(&self, ctx: TestContext) -> anyhow::Result<TestOutcome>;
}

/// Adapter turning an async closure into a [`TestBody`]
struct FnBody<F>(F);

#[async_trait]
impl<F, Fut> TestBody for FnBody<F>
where
    F: Fn(TestContext) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<TestOutcome>> + Send + 'static,
{
    async fn execute(&self, ctx: TestContext) -> anyhow::Result<TestOutcome> {
        (self.0)(ctx).await
    }
}

/// Immutable definition of one test
#[derive(Clone)]
pub struct TestDefinition {
    pub id: String,
    pub name: String,
    pub category: String,
    pub description: String,
    pub timeout: Duration,
    /// Retries after the first attempt; the body runs at most `retry_count + 1` times
    pub retry_count: u32,
    pub dependencies: Vec<String>,
    pub body: Arc<dyn TestBody>,
}

impl TestDefinition {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        category: impl Into<String>,
        body: impl TestBody + 'static,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            category: category.into(),
            description: String::new(),
            timeout: DEFAULT_TEST_TIMEOUT,
            retry_count: 0,
            dependencies: Vec::new(),
            body: Arc::new(body),
        }
    }

    pub fn from_fn<F, Fut>(
        id: impl Into<String>,
        name: impl Into<String>,
        category: impl Into<String>,
        f: F,
    ) -> Self
    where
        F: Fn(TestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<TestOutcome>> + Send + 'static,
    {
        Self::new(id, name, category, FnBody(f))
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn retries(mut self, retry_count: u32) -> Self {
        self.retry_count = retry_count;
        self
    }

    pub fn depends_on(mut self, test_id: impl Into<String>) -> Self {
        self.dependencies.push(test_id.into());
        self
    }
}

impl fmt::Debug for TestDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestDefinition")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("category", &self.category)
            .field("timeout", &self.timeout)
            .field("retry_count", &self.retry_count)
            .field("dependencies", &self.dependencies)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for TestDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.id)
    }
}

/// Suite execution settings
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestSuiteConfig {
    pub parallel: bool,
    pub max_concurrency: usize,
    pub fail_fast: bool,
    /// Carried for callers; the engine never aborts a suite on a test failure
    /// unless `fail_fast` is set.
    pub continue_on_error: bool,
}

impl Default for TestSuiteConfig {
    fn default() -> Self {
        Self {
            parallel: false,
            max_concurrency: 1,
            fail_fast: false,
            continue_on_error: true,
        }
    }
}

impl TestSuiteConfig {
    pub fn sequential() -> Self {
        Self::default()
    }

    pub fn parallel(max_concurrency: usize) -> Self {
        Self {
            parallel: true,
            max_concurrency,
            ..Self::default()
        }
    }

    pub fn with_fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }
}

/// Ordered collection of tests plus execution settings
#[derive(Clone, Debug)]
pub struct TestSuite {
    pub id: String,
    pub name: String,
    pub description: String,
    pub tests: Vec<TestDefinition>,
    pub config: TestSuiteConfig,
}

impl TestSuite {
    pub fn new(id: impl Into<String>, name: impl Into<String>, config: TestSuiteConfig) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            tests: Vec::new(),
            config,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn add_test(mut self, test: TestDefinition) -> Self {
        self.tests.push(test);
        self
    }

    pub fn with_tests(mut self, tests: impl IntoIterator<Item = TestDefinition>) -> Self {
        self.tests.extend(tests);
        self
    }

    /// Check ids, dependencies and concurrency settings before dispatch
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.config.parallel && self.config.max_concurrency == 0 {
            return Err(EngineError::InvalidSuite(
                "max_concurrency must be at least 1".to_string(),
            ));
        }

        let mut ids = HashSet::new();
        for test in &self.tests {
            if test.id.is_empty() {
                return Err(EngineError::InvalidSuite(format!(
                    "test '{}' has an empty id",
                    test.name
                )));
            }
            if !ids.insert(test.id.as_str()) {
                return Err(EngineError::InvalidSuite(format!(
                    "duplicate test id '{}'",
                    test.id
                )));
            }
            if test.timeout.is_zero() {
                return Err(EngineError::InvalidSuite(format!(
                    "test '{}' has a zero timeout",
                    test.id
                )));
            }
        }

        for test in &self.tests {
            for dep in &test.dependencies {
                if dep == &test.id {
                    return Err(EngineError::InvalidSuite(format!(
                        "test '{}' depends on itself",
                        test.id
                    )));
                }
                if !ids.contains(dep.as_str()) {
                    return Err(EngineError::InvalidSuite(format!(
                        "test '{}' depends on unknown test '{dep}'",
                        test.id
                    )));
                }
            }
        }

        Ok(())
    }
}
