//! Retry and timeout runner
//!
//! Runs one test definition to a terminal result: every attempt races the
//! body against its timeout, failures are retried with linear backoff, and
//! the emergency-stop flag is checked before each attempt.

use chrono::Utc;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::ActiveTestRegistry;
use crate::error::AttemptError;
use crate::models::{
    ActiveTestRecord, TestContext, TestDefinition, TestOutcome, TestResult, TestStatus,
};
use crate::safety::EmergencyStopAuthority;

/// Error text of a test halted by an emergency stop
pub const STOPPED_MESSAGE: &str = "Emergency stop activated";

/// Default delay unit for linear retry backoff
pub const DEFAULT_RETRY_BASE_DELAY: Duration = Duration::from_millis(1000);

pub struct RetryTimeoutRunner {
    authority: Arc<dyn EmergencyStopAuthority>,
    registry: Arc<ActiveTestRegistry>,
    base_delay: Duration,
}

impl RetryTimeoutRunner {
    pub fn new(
        authority: Arc<dyn EmergencyStopAuthority>,
        registry: Arc<ActiveTestRegistry>,
    ) -> Self {
        Self {
            authority,
            registry,
            base_delay: DEFAULT_RETRY_BASE_DELAY,
        }
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// Whether the authority holds an active stop or the run was cancelled
    pub(crate) fn stop_requested(&self, token: &CancellationToken) -> bool {
        self.authority.is_active() || token.is_cancelled()
    }

    /// Run a test until it passes, is skipped, is stopped or runs out of attempts.
    ///
    /// Never fails: body errors, panics and timeouts become a failed result.
    pub async fn run(&self, def: &TestDefinition, token: &CancellationToken) -> TestResult {
        let start_time = Utc::now();
        let started = Instant::now();
        let active = self.registry.register(ActiveTestRecord::running(def, start_time));

        let max_attempts = def.retry_count.saturating_add(1);
        let mut attempts = 0;
        let mut last: Option<TestResult> = None;

        for attempt in 1..=max_attempts {
            if self.stop_requested(token) {
                info!("Emergency stop active, stopping {}", def);
                last = Some(TestResult::stopped(def, start_time, STOPPED_MESSAGE));
                break;
            }

            attempts = attempt;
            debug!("Running {} (attempt {}/{})", def, attempt, max_attempts);

            let ctx = TestContext {
                test_id: def.id.clone(),
                attempt,
                cancellation: token.child_token(),
            };
            let result = match self.attempt(def, ctx).await {
                Ok(outcome) => outcome.into_result(def, start_time),
                Err(err) => TestResult::failed(def, start_time, err.to_string()),
            };

            let terminal = result.success || result.status == TestStatus::Skipped;
            if !terminal && attempt < max_attempts {
                let delay = self.base_delay * attempt;
                warn!(
                    "{} failed on attempt {}: {}, retrying in {}ms",
                    def,
                    attempt,
                    result.error.as_deref().unwrap_or("unknown error"),
                    delay.as_millis()
                );
                last = Some(result);
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = token.cancelled() => debug!("Backoff for {} interrupted", def.id),
                }
                continue;
            }

            last = Some(result);
            break;
        }

        drop(active);

        let result =
            last.unwrap_or_else(|| TestResult::stopped(def, start_time, STOPPED_MESSAGE));
        result.finish(Utc::now(), started.elapsed().as_millis() as u64, attempts)
    }

    async fn attempt(
        &self,
        def: &TestDefinition,
        ctx: TestContext,
    ) -> Result<TestOutcome, AttemptError> {
        let body = def.body.clone();
        let execution = AssertUnwindSafe(async move { body.execute(ctx).await }).catch_unwind();

        match tokio::time::timeout(def.timeout, execution).await {
            Err(_) => Err(AttemptError::Timeout(def.timeout.as_millis() as u64)),
            Ok(Err(panic)) => Err(AttemptError::Panicked(panic_message(panic.as_ref()))),
            Ok(Ok(Err(err))) => Err(AttemptError::Execution(format!("{err:#}"))),
            Ok(Ok(Ok(outcome))) => Ok(outcome),
        }
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
