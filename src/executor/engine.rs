//! Production test engine
//!
//! Validates the safety configuration, checks the production target, and
//! drives suites through the sequential or parallel dispatcher. Errors that
//! escape dispatch are escalated to the emergency-stop authority.

use futures::FutureExt;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::runner::panic_message;
use super::{
    ActiveTestRegistry, ConcurrencyGate, Dispatcher, ExecutionContext, RetryTimeoutRunner,
};
use crate::config::{EngineConfig, ALLOWED_REGION, MAX_CONCURRENT_TESTS_LIMIT};
use crate::error::EngineError;
use crate::events::{EngineEvent, EVENT_CHANNEL_CAPACITY};
use crate::models::{ActiveTestRecord, ExecutionStatistics, TestResult, TestSuite};
use crate::safety::{ConnectionProvider, EmergencyStopAuthority, StopEvent, StopReason};
use crate::utils::timer::Timer;

/// Initiator recorded when the engine escalates an unexpected failure
const ENGINE_INITIATOR: &str = "TestEngine";

/// Initiator recorded for operator-requested stops
const MANUAL_INITIATOR: &str = "manual";

pub struct TestEngine {
    connection: Arc<dyn ConnectionProvider>,
    authority: Arc<dyn EmergencyStopAuthority>,
    registry: Arc<ActiveTestRegistry>,
    config: Mutex<Option<EngineConfig>>,
    initialized: AtomicBool,
    statistics: Mutex<Option<ExecutionStatistics>>,
    run_lock: tokio::sync::Mutex<()>,
    run_token: Mutex<CancellationToken>,
    events: broadcast::Sender<EngineEvent>,
    forwarder: Mutex<Option<JoinHandle<()>>>,
}

impl TestEngine {
    pub fn new(
        connection: Arc<dyn ConnectionProvider>,
        authority: Arc<dyn EmergencyStopAuthority>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            connection,
            registry: Arc::new(ActiveTestRegistry::new(authority.clone())),
            authority,
            config: Mutex::new(None),
            initialized: AtomicBool::new(false),
            statistics: Mutex::new(None),
            run_lock: tokio::sync::Mutex::new(()),
            run_token: Mutex::new(CancellationToken::new()),
            events,
            forwarder: Mutex::new(None),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    /// Statistics of the last completed run
    pub fn current_statistics(&self) -> Option<ExecutionStatistics> {
        self.statistics.lock().clone()
    }

    pub fn active_tests(&self) -> Vec<ActiveTestRecord> {
        self.registry.snapshot()
    }

    /// Validate safety settings and check connectivity.
    ///
    /// A second call on an initialized engine is a no-op.
    pub async fn initialize(&self, config: EngineConfig) -> Result<(), EngineError> {
        if self.is_initialized() {
            info!("Test engine already initialized");
            return Ok(());
        }

        info!(
            "Initializing production test engine ({}, {})",
            config.environment, config.region
        );
        check_safety_constraints(&config)?;

        let report = self.connection.test_connection().await;
        if !report.success {
            error!(
                "Production connectivity failed: {}",
                report.failed_services.join(", ")
            );
            return Err(EngineError::Connectivity {
                failed_services: report.failed_services,
            });
        }
        info!(
            "Connected to {} service(s) in {}ms",
            report.connected_services.len(),
            report.total_response_time_ms
        );

        *self.config.lock() = Some(config);
        self.start_stop_forwarder();
        self.initialized.store(true, Ordering::SeqCst);
        let _ = self.events.send(EngineEvent::Initialized);

        info!("Production test engine initialized");
        Ok(())
    }

    /// Relay the authority's stop notifications as engine events
    fn start_stop_forwarder(&self) {
        let Some(mut stops) = self.authority.subscribe() else {
            debug!("Emergency stop authority publishes no events");
            return;
        };
        let events = self.events.clone();

        let handle = tokio::spawn(async move {
            loop {
                match stops.recv().await {
                    Ok(StopEvent::Completed(state)) => {
                        let _ = events.send(EngineEvent::EmergencyStopCompleted(state));
                    }
                    Ok(StopEvent::Failed(message)) => {
                        let _ = events.send(EngineEvent::EmergencyStopFailed(message));
                    }
                    Ok(StopEvent::Reset) => debug!("Emergency stop reset"),
                    Err(RecvError::Lagged(missed)) => {
                        warn!("Missed {} emergency stop event(s)", missed);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });

        if let Some(previous) = self.forwarder.lock().replace(handle) {
            previous.abort();
        }
    }

    /// Run a suite and return its results keyed by test id.
    ///
    /// Failing tests are reported in the results, not as an error.
    pub async fn execute_suite(
        &self,
        suite: &TestSuite,
    ) -> Result<HashMap<String, TestResult>, EngineError> {
        let _run = self
            .run_lock
            .try_lock()
            .map_err(|_| EngineError::RunInProgress)?;

        if !self.is_initialized() {
            return Err(EngineError::NotInitialized);
        }
        if self.authority.is_active() {
            return Err(EngineError::EmergencyStopActive);
        }
        suite.validate()?;

        let execution = self
            .config
            .lock()
            .as_ref()
            .map(|c| c.execution.clone())
            .ok_or(EngineError::NotInitialized)?;

        let timer = Timer::start(format!("suite {}", suite.id));
        info!(
            "Executing suite {} ({} tests, {})",
            suite.name,
            suite.tests.len(),
            if suite.config.parallel { "parallel" } else { "sequential" }
        );

        let health = self.connection.health_check().await;
        if !health.healthy {
            if suite.config.fail_fast {
                error!("Health check failed: {}", health.issues.join(", "));
                return Err(EngineError::HealthCheck {
                    issues: health.issues,
                });
            }
            warn!(
                "Health check reported issues, continuing: {}",
                health.issues.join(", ")
            );
            for recommendation in &health.recommendations {
                warn!("  recommendation: {}", recommendation);
            }
            let _ = self.events.send(EngineEvent::HealthWarning {
                issues: health.issues,
            });
        }

        let token = CancellationToken::new();
        *self.run_token.lock() = token.clone();

        let ctx = Arc::new(ExecutionContext::new(suite));
        let runner = Arc::new(
            RetryTimeoutRunner::new(self.authority.clone(), self.registry.clone())
                .with_base_delay(execution.retry_base_delay()),
        );
        let dispatcher = Dispatcher::new(runner, ctx.clone(), self.events.clone(), token);

        let dispatched = if suite.config.parallel {
            let limit = suite
                .config
                .max_concurrency
                .min(execution.max_concurrent_tests);
            let gate = ConcurrencyGate::new(limit);
            dispatcher.run_parallel(&suite.tests, &gate).await
        } else {
            AssertUnwindSafe(dispatcher.run_sequential(&suite.tests, suite.config.fail_fast))
                .catch_unwind()
                .await
                .map_err(|panic| {
                    EngineError::Unexpected(format!(
                        "sequential dispatch failed: {}",
                        panic_message(panic.as_ref())
                    ))
                })
        };

        if let Err(err) = dispatched {
            error!("Suite {} aborted: {}", suite.id, err);
            if let Err(stop_err) = self
                .authority
                .initiate(StopReason::UnexpectedError, &err.to_string(), ENGINE_INITIATOR)
                .await
            {
                error!("Emergency stop escalation failed: {:#}", stop_err);
            }
            return Err(err);
        }

        let statistics = ctx.statistics();
        let results = ctx.results();
        *self.statistics.lock() = Some(statistics.clone());

        info!(
            "Suite {} completed ({}/{} recorded): {}",
            suite.id,
            ctx.completed(),
            suite.tests.len(),
            statistics
        );
        timer.stop();

        let _ = self.events.send(EngineEvent::SuiteCompleted {
            suite_id: ctx.suite_id.clone(),
            results: results.clone(),
            statistics,
        });

        Ok(results)
    }

    /// Ask the authority for an emergency stop; the current run is cancelled
    /// only once the authority has accepted it.
    pub async fn request_emergency_stop(&self, reason: &str) -> Result<(), EngineError> {
        warn!("Manual emergency stop requested: {}", reason);

        self.authority
            .initiate(StopReason::ManualRequest, reason, MANUAL_INITIATOR)
            .await
            .map_err(|e| EngineError::EmergencyStop(format!("{e:#}")))?;

        self.run_token.lock().cancel();
        Ok(())
    }

    /// Release run state and event subscriptions
    pub fn cleanup(&self) -> Result<(), EngineError> {
        info!("Cleaning up test engine");

        self.run_token.lock().cancel();
        if let Some(forwarder) = self.forwarder.lock().take() {
            forwarder.abort();
        }
        self.registry.clear();
        *self.statistics.lock() = None;
        *self.config.lock() = None;
        self.initialized.store(false, Ordering::SeqCst);

        Ok(())
    }
}

impl Drop for TestEngine {
    fn drop(&mut self) {
        if let Some(forwarder) = self.forwarder.get_mut().take() {
            forwarder.abort();
        }
    }
}

/// Settings that must hold before the engine touches production
fn check_safety_constraints(config: &EngineConfig) -> Result<(), EngineError> {
    let mut violations = config.safety_violations();

    if config.region != ALLOWED_REGION {
        violations.push(format!(
            "region must be {ALLOWED_REGION}, got {}",
            config.region
        ));
    }
    if config.execution.max_concurrent_tests > MAX_CONCURRENT_TESTS_LIMIT {
        violations.push(format!(
            "max_concurrent_tests {} exceeds limit {MAX_CONCURRENT_TESTS_LIMIT}",
            config.execution.max_concurrent_tests
        ));
    }

    if violations.is_empty() {
        Ok(())
    } else {
        Err(EngineError::Configuration(violations.join("; ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{TestDefinition, TestOutcome, TestStatus, TestSuiteConfig};
    use crate::safety::testing::{FakeConnection, RecordingAuthority};
    use crate::safety::EmergencyStopManager;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio_test::{assert_err, assert_ok};

    fn test_config() -> EngineConfig {
        let mut config = EngineConfig::default();
        config.execution.retry_base_delay_ms = 1;
        config
    }

    fn engine_with(
        connection: Arc<FakeConnection>,
        authority: Arc<dyn EmergencyStopAuthority>,
    ) -> TestEngine {
        TestEngine::new(connection, authority)
    }

    async fn ready_engine() -> (TestEngine, Arc<FakeConnection>, Arc<EmergencyStopManager>) {
        let connection = Arc::new(FakeConnection::healthy());
        let manager = Arc::new(EmergencyStopManager::default());
        let engine = engine_with(connection.clone(), manager.clone());
        assert_ok!(engine.initialize(test_config()).await);
        (engine, connection, manager)
    }

    fn passing(id: &str) -> TestDefinition {
        TestDefinition::from_fn(id, id, "unit", |_ctx| async { Ok(TestOutcome::pass()) })
    }

    fn failing(id: &str, calls: Arc<AtomicUsize>) -> TestDefinition {
        TestDefinition::from_fn(id, id, "unit", move |_ctx| {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(TestOutcome::fail("unexpected status 503"))
            }
        })
    }

    async fn wait_for<F>(rx: &mut broadcast::Receiver<EngineEvent>, matches: F) -> EngineEvent
    where
        F: Fn(&EngineEvent) -> bool,
    {
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                match rx.recv().await {
                    Ok(event) if matches(&event) => return event,
                    Ok(_) | Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => panic!("event channel closed"),
                }
            }
        })
        .await
        .expect("event not received")
    }

    #[tokio::test]
    async fn test_sequential_suite_all_pass() {
        let (engine, _, _) = ready_engine().await;
        let suite = TestSuite::new("seq", "sequential", TestSuiteConfig::sequential())
            .with_tests(["a", "b", "c"].map(passing));

        let results = assert_ok!(engine.execute_suite(&suite).await);

        assert_eq!(results.len(), 3);
        assert!(results.values().all(|r| r.status == TestStatus::Completed));
        let stats = engine.current_statistics().unwrap();
        assert_eq!(stats.success_rate, 1.0);
        assert_eq!(stats.passed_tests, 3);
        assert!(stats.is_all_passed());
    }

    #[tokio::test]
    async fn test_fail_fast_leaves_rest_unrecorded() {
        let (engine, _, _) = ready_engine().await;
        let calls = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        let suite = TestSuite::new(
            "ff",
            "fail fast",
            TestSuiteConfig::sequential().with_fail_fast(true),
        )
        .add_test(failing("first", calls.clone()))
        .add_test(failing("second", second.clone()));

        let results = assert_ok!(engine.execute_suite(&suite).await);

        assert_eq!(results.len(), 1);
        assert_eq!(results["first"].status, TestStatus::Failed);
        assert_eq!(second.load(Ordering::SeqCst), 0);

        let stats = engine.current_statistics().unwrap();
        assert_eq!(stats.total_tests, 2);
        assert_eq!(stats.completed_tests, 1);
        assert_eq!(stats.failed_tests, 1);
    }

    #[tokio::test]
    async fn test_fail_fast_halts_on_skipped_outcome() {
        let (engine, _, _) = ready_engine().await;
        let later = Arc::new(AtomicUsize::new(0));
        let skip = TestDefinition::from_fn("feature", "feature", "unit", |_ctx| async {
            Ok(TestOutcome::skip("feature flag disabled"))
        });
        let suite = TestSuite::new(
            "ff-skip",
            "fail fast on skip",
            TestSuiteConfig::sequential().with_fail_fast(true),
        )
        .add_test(skip)
        .add_test(failing("later", later.clone()));

        let results = assert_ok!(engine.execute_suite(&suite).await);

        assert_eq!(results.len(), 1);
        assert_eq!(results["feature"].status, TestStatus::Skipped);
        assert_eq!(later.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_parallel_respects_max_concurrency() {
        let connection = Arc::new(FakeConnection::healthy());
        let engine = Arc::new(engine_with(
            connection,
            Arc::new(EmergencyStopManager::default()),
        ));
        assert_ok!(engine.initialize(test_config()).await);

        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let peak_registered = Arc::new(AtomicUsize::new(0));

        let tests = (0..5).map(|i| {
            let running = running.clone();
            let peak = peak.clone();
            let peak_registered = peak_registered.clone();
            let engine = Arc::downgrade(&engine);
            TestDefinition::from_fn(format!("p{i}"), format!("parallel {i}"), "unit", move |_ctx| {
                let running = running.clone();
                let peak = peak.clone();
                let peak_registered = peak_registered.clone();
                let engine = engine.clone();
                async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    if let Some(engine) = engine.upgrade() {
                        peak_registered.fetch_max(engine.active_tests().len(), Ordering::SeqCst);
                    }
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                    Ok(TestOutcome::pass())
                }
            })
        });
        let suite =
            TestSuite::new("par", "parallel", TestSuiteConfig::parallel(2)).with_tests(tests);

        let results = assert_ok!(engine.execute_suite(&suite).await);

        assert_eq!(results.len(), 5);
        assert!(results.values().all(|r| r.status.is_terminal()));
        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert!(peak_registered.load(Ordering::SeqCst) <= 2);
        assert!(engine.active_tests().is_empty());
    }

    #[tokio::test]
    async fn test_retry_until_third_attempt_passes() {
        let (engine, _, _) = ready_engine().await;
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let flaky = TestDefinition::from_fn("flaky", "flaky", "unit", move |ctx| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                if ctx.attempt < 3 {
                    anyhow::bail!("connection reset on attempt {}", ctx.attempt);
                }
                Ok(TestOutcome::pass())
            }
        })
        .retries(2);
        let suite =
            TestSuite::new("retry", "retry", TestSuiteConfig::sequential()).add_test(flaky);

        let results = assert_ok!(engine.execute_suite(&suite).await);

        assert!(results["flaky"].success);
        assert_eq!(results["flaky"].attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_stop_between_tests_marks_rest_stopped() {
        let (engine, _, manager) = ready_engine().await;
        let mut events = engine.subscribe();

        let trigger = manager.clone();
        let first = TestDefinition::from_fn("first", "first", "unit", move |_ctx| {
            let trigger = trigger.clone();
            async move {
                trigger
                    .initiate(StopReason::DataIntegrityViolation, "checksum mismatch", "monitor")
                    .await
                    .map(|_| TestOutcome::pass())
            }
        });
        let later_calls = Arc::new(AtomicUsize::new(0));
        let suite = TestSuite::new("stop", "stop", TestSuiteConfig::sequential())
            .add_test(first)
            .add_test(failing("second", later_calls.clone()))
            .add_test(failing("third", later_calls.clone()));

        let results = assert_ok!(engine.execute_suite(&suite).await);

        assert_eq!(results["first"].status, TestStatus::Completed);
        assert!(results["first"].success);
        assert_eq!(results["second"].status, TestStatus::Stopped);
        assert_eq!(results["third"].status, TestStatus::Stopped);
        assert_eq!(later_calls.load(Ordering::SeqCst), 0);

        let event = wait_for(&mut events, |e| {
            matches!(e, EngineEvent::EmergencyStopCompleted(_))
        })
        .await;
        if let EngineEvent::EmergencyStopCompleted(state) = event {
            assert_eq!(state.reason, StopReason::DataIntegrityViolation);
        }

        assert_eq!(
            engine.execute_suite(&suite).await,
            Err(EngineError::EmergencyStopActive)
        );
    }

    #[tokio::test]
    async fn test_initialize_rejects_unsafe_config_without_io() {
        let connection = Arc::new(FakeConnection::healthy());
        let engine = engine_with(connection.clone(), Arc::new(EmergencyStopManager::default()));

        let mut config = test_config();
        config.read_only_mode = false;
        let err = assert_err!(engine.initialize(config).await);

        assert!(matches!(err, EngineError::Configuration(_)));
        assert_eq!(connection.connection_calls(), 0);
        assert!(!engine.is_initialized());

        let mut config = test_config();
        config.region = "us-east-1".to_string();
        assert!(matches!(
            engine.initialize(config).await,
            Err(EngineError::Configuration(_))
        ));

        let mut config = test_config();
        config.execution.max_concurrent_tests = 11;
        assert!(matches!(
            engine.initialize(config).await,
            Err(EngineError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn test_initialize_is_idempotent() {
        let (engine, connection, _) = ready_engine().await;
        assert_ok!(engine.initialize(test_config()).await);
        assert_eq!(connection.connection_calls(), 1);
    }

    #[tokio::test]
    async fn test_initialize_connectivity_failure() {
        let connection = Arc::new(FakeConnection::unreachable(&["api", "auth"]));
        let engine = engine_with(connection, Arc::new(EmergencyStopManager::default()));

        let err = assert_err!(engine.initialize(test_config()).await);
        assert_eq!(
            err,
            EngineError::Connectivity {
                failed_services: vec!["api".to_string(), "auth".to_string()]
            }
        );
    }

    #[tokio::test]
    async fn test_execute_requires_initialize() {
        let engine = engine_with(
            Arc::new(FakeConnection::healthy()),
            Arc::new(EmergencyStopManager::default()),
        );
        let suite = TestSuite::new("s", "s", TestSuiteConfig::sequential()).add_test(passing("a"));
        assert_eq!(
            engine.execute_suite(&suite).await,
            Err(EngineError::NotInitialized)
        );
        assert!(engine.current_statistics().is_none());
    }

    #[tokio::test]
    async fn test_invalid_suite_rejected() {
        let (engine, connection, _) = ready_engine().await;
        let suite = TestSuite::new("s", "s", TestSuiteConfig::sequential())
            .add_test(passing("a"))
            .add_test(passing("a"));
        assert!(matches!(
            engine.execute_suite(&suite).await,
            Err(EngineError::InvalidSuite(_))
        ));
        assert_eq!(connection.health_calls(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_run_rejected() {
        let connection = Arc::new(FakeConnection::healthy());
        let engine = Arc::new(engine_with(
            connection,
            Arc::new(EmergencyStopManager::default()),
        ));
        assert_ok!(engine.initialize(test_config()).await);

        let slow = TestDefinition::from_fn("slow", "slow", "unit", |_ctx| async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(TestOutcome::pass())
        });
        let suite = TestSuite::new("slow", "slow", TestSuiteConfig::sequential()).add_test(slow);

        let background = {
            let engine = engine.clone();
            let suite = suite.clone();
            tokio::spawn(async move { engine.execute_suite(&suite).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(
            engine.execute_suite(&suite).await,
            Err(EngineError::RunInProgress)
        );
        let first = background.await.unwrap();
        assert_ok!(first);
    }

    #[tokio::test]
    async fn test_unhealthy_target_with_fail_fast() {
        let connection = Arc::new(FakeConnection::unhealthy(&["api: slow response (12000ms)"]));
        let authority = Arc::new(RecordingAuthority::default());
        let engine = engine_with(connection, authority.clone());
        assert_ok!(engine.initialize(test_config()).await);

        let calls = Arc::new(AtomicUsize::new(0));
        let suite = TestSuite::new("h", "h", TestSuiteConfig::sequential().with_fail_fast(true))
            .add_test(failing("a", calls.clone()));

        let err = assert_err!(engine.execute_suite(&suite).await);
        assert!(matches!(err, EngineError::HealthCheck { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(authority.initiated().is_empty());
    }

    #[tokio::test]
    async fn test_unhealthy_target_warns_and_continues() {
        let connection = Arc::new(FakeConnection::unhealthy(&["stale status"]));
        let engine = engine_with(connection, Arc::new(EmergencyStopManager::default()));
        assert_ok!(engine.initialize(test_config()).await);
        let mut events = engine.subscribe();

        let suite = TestSuite::new("h", "h", TestSuiteConfig::sequential()).add_test(passing("a"));
        let results = assert_ok!(engine.execute_suite(&suite).await);
        assert_eq!(results.len(), 1);

        let event = wait_for(&mut events, |e| matches!(e, EngineEvent::HealthWarning { .. })).await;
        if let EngineEvent::HealthWarning { issues } = event {
            assert_eq!(issues, vec!["stale status".to_string()]);
        }
        wait_for(&mut events, |e| matches!(e, EngineEvent::SuiteCompleted { .. })).await;
    }

    #[tokio::test]
    async fn test_unmet_dependency_is_skipped() {
        let (engine, _, _) = ready_engine().await;
        let calls = Arc::new(AtomicUsize::new(0));
        let suite = TestSuite::new("deps", "deps", TestSuiteConfig::sequential())
            .add_test(failing("login", calls.clone()))
            .add_test(passing("profile").depends_on("login"));

        let results = assert_ok!(engine.execute_suite(&suite).await);

        assert_eq!(results["profile"].status, TestStatus::Skipped);
        assert_eq!(
            results["profile"].error.as_deref(),
            Some("dependency 'login' did not pass")
        );
        let stats = engine.current_statistics().unwrap();
        assert_eq!(stats.skipped_tests, 1);
        assert_eq!(stats.failed_tests, 1);
    }

    #[tokio::test]
    async fn test_dispatch_error_escalates() {
        let authority = Arc::new(RecordingAuthority::panicking());
        let engine = engine_with(Arc::new(FakeConnection::healthy()), authority.clone());
        assert_ok!(engine.initialize(test_config()).await);

        let suite = TestSuite::new("boom", "boom", TestSuiteConfig::parallel(2))
            .add_test(passing("a"));

        let err = assert_err!(engine.execute_suite(&suite).await);
        assert!(matches!(err, EngineError::Unexpected(_)));

        let initiated = authority.initiated();
        assert_eq!(initiated.len(), 1);
        assert_eq!(initiated[0].0, StopReason::UnexpectedError);
        assert_eq!(initiated[0].1, err.to_string());
        assert_eq!(initiated[0].2, "TestEngine");
        assert!(engine.current_statistics().is_none());
        assert!(engine.active_tests().is_empty());
    }

    #[tokio::test]
    async fn test_sequential_dispatch_error_escalates() {
        let authority = Arc::new(RecordingAuthority::panicking());
        let engine = engine_with(Arc::new(FakeConnection::healthy()), authority.clone());
        assert_ok!(engine.initialize(test_config()).await);

        let suite = TestSuite::new("boom", "boom", TestSuiteConfig::sequential())
            .add_test(passing("a"))
            .add_test(passing("b"));

        let err = assert_err!(engine.execute_suite(&suite).await);
        assert_eq!(
            err,
            EngineError::Unexpected("sequential dispatch failed: registry rejected a".to_string())
        );

        let initiated = authority.initiated();
        assert_eq!(initiated.len(), 1);
        assert_eq!(initiated[0].0, StopReason::UnexpectedError);
        assert_eq!(initiated[0].1, err.to_string());
        assert_eq!(initiated[0].2, "TestEngine");
        assert!(engine.current_statistics().is_none());
        assert!(engine.active_tests().is_empty());
    }

    #[tokio::test]
    async fn test_manual_stop_forwarded() {
        let (engine, _, manager) = ready_engine().await;
        assert_ok!(engine.request_emergency_stop("operator abort").await);

        let state = manager.state().unwrap();
        assert_eq!(state.reason, StopReason::ManualRequest);
        assert_eq!(state.initiated_by, "manual");
        assert_eq!(state.details, "operator abort");
    }

    #[tokio::test]
    async fn test_refused_manual_stop_reports_failure() {
        let engine = engine_with(
            Arc::new(FakeConnection::healthy()),
            Arc::new(EmergencyStopManager::new(false)),
        );
        assert_ok!(engine.initialize(test_config()).await);
        let mut events = engine.subscribe();

        let err = assert_err!(engine.request_emergency_stop("operator abort").await);
        assert!(matches!(err, EngineError::EmergencyStop(_)));
        wait_for(&mut events, |e| matches!(e, EngineEvent::EmergencyStopFailed(_))).await;
    }

    #[tokio::test]
    async fn test_refused_manual_stop_leaves_run_untouched() {
        let engine = Arc::new(engine_with(
            Arc::new(FakeConnection::healthy()),
            Arc::new(EmergencyStopManager::new(false)),
        ));
        assert_ok!(engine.initialize(test_config()).await);

        let slow = TestDefinition::from_fn("slow", "slow", "unit", |_ctx| async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok(TestOutcome::pass())
        });
        let suite = TestSuite::new("refused", "refused", TestSuiteConfig::sequential())
            .add_test(slow)
            .add_test(passing("after"));

        let background = {
            let engine = engine.clone();
            let suite = suite.clone();
            tokio::spawn(async move { engine.execute_suite(&suite).await })
        };
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_err!(engine.request_emergency_stop("operator abort").await);

        let results = assert_ok!(background.await.unwrap());
        assert_eq!(results.len(), 2);
        assert!(results.values().all(|r| r.status == TestStatus::Completed));
    }

    #[tokio::test]
    async fn test_cleanup_resets_engine() {
        let uninitialized = engine_with(
            Arc::new(FakeConnection::healthy()),
            Arc::new(EmergencyStopManager::default()),
        );
        assert_ok!(uninitialized.cleanup());

        let (engine, connection, _) = ready_engine().await;
        let suite = TestSuite::new("s", "s", TestSuiteConfig::sequential()).add_test(passing("a"));
        assert_ok!(engine.execute_suite(&suite).await);
        assert!(engine.current_statistics().is_some());

        assert_ok!(engine.cleanup());
        assert!(!engine.is_initialized());
        assert!(engine.current_statistics().is_none());

        assert_ok!(engine.initialize(test_config()).await);
        assert_eq!(connection.connection_calls(), 2);
    }
}
