//! Shared run state observed by every pipeline task.
//!
//! The producer, writer, throttle controller, and progress reporter all hold
//! an `Arc<RunState>`. The writer is the only task that marks the run
//! finished on the success path; the orchestrator marks it on failure so the
//! periodic loops wind down.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Counters and flags shared across the pipeline tasks.
#[derive(Debug, Default)]
pub struct RunState {
    rows_affected: AtomicU64,
    last_txn_millis: AtomicU64,
    finished: AtomicBool,
}

impl RunState {
    /// Creates a fresh state with zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds committed rows to the running total.
    pub fn add_rows(&self, rows: u64) {
        self.rows_affected.fetch_add(rows, Ordering::Relaxed);
    }

    /// Total rows affected by committed transactions so far.
    pub fn rows_affected(&self) -> u64 {
        self.rows_affected.load(Ordering::Relaxed)
    }

    /// Records the wall time of the most recent transaction.
    pub fn set_last_txn_millis(&self, millis: u64) {
        self.last_txn_millis.store(millis, Ordering::Relaxed);
    }

    /// Wall time of the most recent transaction in milliseconds.
    pub fn last_txn_millis(&self) -> u64 {
        self.last_txn_millis.load(Ordering::Relaxed)
    }

    /// Marks the run finished. Returns `true` for the first caller only.
    pub fn mark_finished(&self) -> bool {
        !self.finished.swap(true, Ordering::SeqCst)
    }

    /// Whether the run has been marked finished.
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rows_accumulate() {
        let state = RunState::new();
        state.add_rows(1000);
        state.add_rows(500);
        assert_eq!(state.rows_affected(), 1500);
    }

    #[test]
    fn test_mark_finished_is_exactly_once() {
        let state = RunState::new();
        assert!(!state.is_finished());
        assert!(state.mark_finished());
        assert!(!state.mark_finished());
        assert!(state.is_finished());
    }

    #[test]
    fn test_last_txn_millis_overwrites() {
        let state = RunState::new();
        state.set_last_txn_millis(120);
        state.set_last_txn_millis(80);
        assert_eq!(state.last_txn_millis(), 80);
    }
}
