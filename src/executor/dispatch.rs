//! Sequential test dispatch
//!
//! Walks a suite in declaration order. The emergency-stop flag is checked
//! before every test; once it is set, the current and all later tests are
//! recorded as stopped.

use chrono::Utc;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::runner::STOPPED_MESSAGE;
use super::{ExecutionContext, RetryTimeoutRunner};
use crate::events::EngineEvent;
use crate::models::{TestDefinition, TestResult, TestStatus};

/// Runs tests and records their results into one execution context
#[derive(Clone)]
pub struct Dispatcher {
    pub(super) runner: Arc<RetryTimeoutRunner>,
    pub(super) ctx: Arc<ExecutionContext>,
    pub(super) events: broadcast::Sender<EngineEvent>,
    pub(super) token: CancellationToken,
}

impl Dispatcher {
    pub fn new(
        runner: Arc<RetryTimeoutRunner>,
        ctx: Arc<ExecutionContext>,
        events: broadcast::Sender<EngineEvent>,
        token: CancellationToken,
    ) -> Self {
        Self {
            runner,
            ctx,
            events,
            token,
        }
    }

    /// Run one test through the runner and publish its result
    pub async fn run_one(&self, def: &TestDefinition) -> TestResult {
        let result = self.runner.run(def, &self.token).await;
        self.publish(result.clone());
        result
    }

    fn publish(&self, result: TestResult) {
        info!("  {}", result);
        self.ctx.record(result.clone());
        let _ = self.events.send(EngineEvent::TestCompleted(result));
    }

    /// Record a result for a test that never reached the runner
    fn record_unrun(&self, result: TestResult) {
        let now = Utc::now();
        self.publish(result.finish(now, 0, 0));
    }

    /// First dependency of `def` that has not passed in this run
    fn unmet_dependency<'a>(&self, def: &'a TestDefinition) -> Option<&'a str> {
        def.dependencies
            .iter()
            .find(|dep| !self.ctx.get(dep).is_some_and(|r| r.success))
            .map(String::as_str)
    }

    /// Run `tests` one after another.
    ///
    /// With `fail_fast`, the first test that does not pass (skipped included,
    /// stopped excluded) ends the run and later tests are left without a result.
    pub async fn run_sequential(&self, tests: &[TestDefinition], fail_fast: bool) {
        for (index, def) in tests.iter().enumerate() {
            if self.runner.stop_requested(&self.token) {
                let remaining = &tests[index..];
                warn!(
                    "Emergency stop active, marking {} remaining test(s) stopped",
                    remaining.len()
                );
                for def in remaining {
                    self.record_unrun(TestResult::stopped(def, Utc::now(), STOPPED_MESSAGE));
                }
                break;
            }

            if let Some(dep) = self.unmet_dependency(def) {
                let reason = format!("dependency '{dep}' did not pass");
                info!("Skipping {}: {}", def, reason);
                self.record_unrun(TestResult::skipped(def, Utc::now(), reason));
                continue;
            }

            let result = self.run_one(def).await;

            if fail_fast && !result.success && result.status != TestStatus::Stopped {
                warn!(
                    "Fail fast: {} failed, {} test(s) not attempted",
                    def,
                    tests.len() - index - 1
                );
                break;
            }
        }
    }
}
