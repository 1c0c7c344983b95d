//! Parallel test dispatch
//!
//! Every test is spawned up front; the concurrency gate decides how many of
//! them run at once. Dispatch returns after all spawned tasks have settled.

use futures::future::join_all;
use tracing::{debug, error, info};

use super::{ConcurrencyGate, Dispatcher};
use crate::error::EngineError;
use crate::models::TestDefinition;

impl Dispatcher {
    /// Run `tests` concurrently, at most `gate.capacity()` at a time.
    ///
    /// Test failures are recorded as results. An error is returned only when
    /// a task itself could not complete, after every other task has settled.
    pub async fn run_parallel(
        &self,
        tests: &[TestDefinition],
        gate: &ConcurrencyGate,
    ) -> Result<(), EngineError> {
        info!(
            "Running {} tests in parallel (max {} concurrent)",
            tests.len(),
            gate.capacity()
        );

        let handles: Vec<_> = tests
            .iter()
            .cloned()
            .map(|def| {
                let dispatcher = self.clone();
                let gate = gate.clone();

                tokio::spawn(async move {
                    let _permit = gate.acquire().await?;
                    debug!("Starting parallel execution of {}", def);
                    dispatcher.run_one(&def).await;
                    Ok::<(), EngineError>(())
                })
            })
            .collect();

        let mut first_error = None;
        for joined in join_all(handles).await {
            let outcome = joined
                .map_err(|e| EngineError::Unexpected(format!("test task failed: {e}")))
                .and_then(|r| r);

            if let Err(err) = outcome {
                error!("Parallel dispatch error: {}", err);
                first_error.get_or_insert(err);
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
