//! Data models for production test execution
//!
//! This module contains the definitions, results and records shared by the
//! engine, its collaborators and the output layer.

mod active;
mod suite;
mod test_result;

pub use active::{ActiveTestRecord, ActiveTestStatus};
pub use suite::{
    TestBody, TestContext, TestDefinition, TestOutcome, TestSuite, TestSuiteConfig,
    DEFAULT_TEST_TIMEOUT,
};
pub use test_result::{ExecutionStatistics, TestResult, TestStatus};
