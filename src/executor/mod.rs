//! Test execution engine
//!
//! Provides the engine, its sequential and parallel dispatchers, and the
//! per-test retry/timeout runner.

mod context;
mod dispatch;
mod engine;
mod gate;
mod parallel;
mod registry;
mod runner;

pub use context::ExecutionContext;
pub use dispatch::Dispatcher;
pub use engine::TestEngine;
pub use gate::ConcurrencyGate;
pub use registry::ActiveTestRegistry;
pub use runner::{RetryTimeoutRunner, DEFAULT_RETRY_BASE_DELAY, STOPPED_MESSAGE};
