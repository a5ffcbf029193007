//! Concurrent fan-out of portal lookups over a batch of identifiers.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::{debug, info};

use crate::tracuunnt::types::{LookupResult, QueryKind};
use crate::tracuunnt::TracuunntScraper;

/// Runs every lookup of a batch concurrently while a semaphore caps how
/// many browser sessions are live at once.
pub struct BatchDispatcher {
    engine: Arc<TracuunntScraper>,
    max_concurrent: usize,
}

impl BatchDispatcher {
    pub fn new(engine: Arc<TracuunntScraper>, max_concurrent: usize) -> Self {
        Self {
            engine,
            max_concurrent,
        }
    }

    /// Looks up every value and returns one outcome per input, in input
    /// order. A lookup that fails, or a task that dies, still yields an
    /// error outcome at its position.
    pub async fn dispatch(&self, kind: QueryKind, values: &[String]) -> Vec<LookupResult> {
        info!(
            "Dispatching {} {:?} lookups with limit {}",
            values.len(),
            kind,
            self.max_concurrent
        );
        let limiter = Arc::new(Semaphore::new(self.max_concurrent.max(1)));

        let mut handles = Vec::with_capacity(values.len());
        for value in values {
            let engine = self.engine.clone();
            let limiter = limiter.clone();
            let value = value.clone();
            handles.push(tokio::spawn(async move {
                engine.lookup(limiter, kind, &value).await
            }));
        }

        let mut results = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.await {
                Ok(result) => results.push(result),
                Err(e) => results.push(LookupResult::error(format!("Lookup task failed: {}", e))),
            }
        }
        debug!("Batch finished with {} results", results.len());
        results
    }
}
