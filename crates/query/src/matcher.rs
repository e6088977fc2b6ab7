//! DOM matcher — resolves a query against the live document, polling a
//! bounded number of times because the target may not be rendered yet.

use std::time::Duration;

use tracing::debug;

use compass_web_sdk::{Document, ElementId};

use crate::query::{select, Query};

/// Retry budget for [`find`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchPolicy {
    pub attempts: u32,
    pub interval: Duration,
}

impl Default for MatchPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            interval: Duration::from_millis(50),
        }
    }
}

impl MatchPolicy {
    pub fn new(attempts: u32, interval: Duration) -> Self {
        Self { attempts, interval }
    }

    /// A single attempt with no waiting.
    pub fn immediate() -> Self {
        Self::new(1, Duration::ZERO)
    }
}

/// Elements matched by `query`, in document order. Resolves to an empty
/// vector once the budget is spent; never mutates the document.
pub async fn find(document: &Document, query: &Query, policy: MatchPolicy) -> Vec<ElementId> {
    let attempts = policy.attempts.max(1);
    for attempt in 1..=attempts {
        let found = document.read(|tree| select(tree, query));
        if !found.is_empty() {
            debug!(attempt, matched = found.len(), "Query resolved");
            return found;
        }
        if attempt < attempts {
            tokio::time::sleep(policy.interval).await;
        }
    }
    debug!(attempts, "Query matched nothing within budget");
    Vec::new()
}
