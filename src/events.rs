//! Engine lifecycle events
//!
//! Published on a `tokio::sync::broadcast` channel; slow subscribers lag
//! rather than block the engine.

use std::collections::HashMap;

use crate::models::{ExecutionStatistics, TestResult};
use crate::safety::StopState;

/// Capacity of the engine event channel
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Clone, Debug)]
pub enum EngineEvent {
    Initialized,
    TestCompleted(TestResult),
    SuiteCompleted {
        suite_id: String,
        results: HashMap<String, TestResult>,
        statistics: ExecutionStatistics,
    },
    /// Pre-run health check reported problems but the suite continued
    HealthWarning { issues: Vec<String> },
    EmergencyStopCompleted(StopState),
    EmergencyStopFailed(String),
}
