//! Cross-file minimum offset aggregation
//!
//! Every file scan reports at most one candidate offset. The aggregator keeps the
//! running minimum and every filename that attains it. Reports are serialized
//! through a mutex; an atomic mirror of the best offset lets scanners make
//! pruning decisions without taking the lock.
//!
//! The mirror is only ever written inside the critical section and only holds
//! offsets that were actually committed, so a stale read can only make a scan
//! keep going longer than necessary.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};

use metrics::counter;
use tokio::sync::Mutex;
use tracing::debug;

const NO_OFFSET: u64 = u64::MAX;

/// Best offset seen so far and the files that reached it
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GlobalIndex {
    best_offset: Option<u64>,
    winners: BTreeSet<String>,
}

impl GlobalIndex {
    /// Smallest offset reported so far
    pub fn best_offset(&self) -> Option<u64> {
        self.best_offset
    }

    /// Filenames attaining [`GlobalIndex::best_offset`], sorted
    pub fn winners(&self) -> Vec<String> {
        self.winners.iter().cloned().collect()
    }

    /// `(offset, winners)` if any file matched
    pub fn into_result(self) -> Option<(u64, Vec<String>)> {
        let offset = self.best_offset?;
        Some((offset, self.winners.into_iter().collect()))
    }
}

/// Shared running minimum over concurrently reported candidates
#[derive(Debug)]
pub struct IndexAggregator {
    state: Mutex<GlobalIndex>,
    hint: AtomicU64,
}

impl IndexAggregator {
    /// Empty aggregator
    pub fn new() -> Self {
        Self {
            state: Mutex::new(GlobalIndex::default()),
            hint: AtomicU64::new(NO_OFFSET),
        }
    }

    /// Report `filename`'s first-occurrence offset. Returns whether it was
    /// accepted into the winner set.
    pub async fn report_candidate(&self, filename: &str, offset: u64) -> bool {
        let mut state = self.state.lock().await;
        let accepted = match state.best_offset {
            Some(best) if offset > best => false,
            Some(best) if offset == best => {
                state.winners.insert(filename.to_string());
                true
            }
            _ => {
                state.best_offset = Some(offset);
                state.winners.clear();
                state.winners.insert(filename.to_string());
                self.hint.store(offset, Ordering::Release);
                true
            }
        };
        drop(state);

        counter!(
            "candidates_reported_total",
            "accepted" => accepted.to_string(),
        )
        .increment(1);
        debug!(file = %filename, offset, accepted, "Candidate reported");
        accepted
    }

    /// Lock-free read of the best committed offset, for pruning only
    pub fn best_hint(&self) -> Option<u64> {
        match self.hint.load(Ordering::Acquire) {
            NO_OFFSET => None,
            offset => Some(offset),
        }
    }

    /// Consistent copy of the current index
    pub async fn snapshot(&self) -> GlobalIndex {
        self.state.lock().await.clone()
    }
}

impl Default for IndexAggregator {
    fn default() -> Self {
        Self::new()
    }
}
