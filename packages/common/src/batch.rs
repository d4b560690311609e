//! Best-effort batch execution.
//!
//! Lifecycle transitions touch many assets at once. Each item is processed
//! independently: a failure is recorded and the remaining items still run.

use std::fmt;
use std::future::Future;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::warn;

/// An item that could not be processed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, utoipa::ToSchema)]
pub struct BatchFailure {
    /// Identifier of the failed item (usually an asset id).
    pub item: String,
    pub error: String,
}

/// Structured result of a best-effort batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchOutcome<T> {
    pub succeeded: Vec<T>,
    pub failed: Vec<BatchFailure>,
}

impl<T> Default for BatchOutcome<T> {
    fn default() -> Self {
        Self {
            succeeded: Vec::new(),
            failed: Vec::new(),
        }
    }
}

impl<T> BatchOutcome<T> {
    /// Whether every item succeeded.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn record_failure(&mut self, item: impl Into<String>, error: impl fmt::Display) {
        self.failed.push(BatchFailure {
            item: item.into(),
            error: error.to_string(),
        });
    }
}

/// Run `op` over every item with at most `concurrency` in flight.
///
/// Results keep the input order. Failures are logged and collected under the
/// item's `label`; they never stop the remaining items.
pub async fn best_effort<T, O, E, L, F, Fut>(
    items: impl IntoIterator<Item = T>,
    concurrency: usize,
    label: L,
    op: F,
) -> BatchOutcome<O>
where
    L: Fn(&T) -> String,
    F: Fn(T) -> Fut,
    Fut: Future<Output = Result<O, E>>,
    E: fmt::Display,
{
    let results: Vec<(String, Result<O, E>)> = stream::iter(items)
        .map(|item| {
            let name = label(&item);
            let fut = op(item);
            async move { (name, fut.await) }
        })
        .buffered(concurrency.max(1))
        .collect()
        .await;

    let mut outcome = BatchOutcome::default();
    for (name, result) in results {
        match result {
            Ok(value) => outcome.succeeded.push(value),
            Err(e) => {
                warn!(item = %name, error = %e, "Best-effort item failed");
                outcome.record_failure(name, e);
            }
        }
    }
    outcome
}
