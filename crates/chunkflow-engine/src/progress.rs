//! Periodic progress logging.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::info;

use crate::state::RunState;

/// Default interval between progress lines.
pub const REPORT_INTERVAL: Duration = Duration::from_secs(3);

/// Logs throughput lines until the run finishes.
pub struct ProgressReporter {
    state: Arc<RunState>,
    interval: Duration,
}

impl ProgressReporter {
    /// Creates a reporter over the shared run state.
    pub fn new(state: Arc<RunState>, interval: Duration) -> Self {
        Self { state, interval }
    }

    /// Logs a line per interval, then a final summary.
    pub async fn run(self) {
        let started = Instant::now();
        while !self.state.is_finished() {
            tokio::time::sleep(self.interval).await;
            if self.state.is_finished() {
                break;
            }
            let rows = self.state.rows_affected();
            let elapsed = started.elapsed().as_secs_f64();
            let rate = if elapsed > 0.0 { rows as f64 / elapsed } else { 0.0 };
            info!(
                "progress: {} rows affected, {:.1} rows/s, last txn {}ms",
                rows,
                rate,
                self.state.last_txn_millis()
            );
        }
        let rows = self.state.rows_affected();
        let elapsed = started.elapsed().as_secs_f64();
        let rate = if elapsed > 0.0 { rows as f64 / elapsed } else { 0.0 };
        info!(
            "total: {} rows affected in {:.1}s, {:.1} rows/s",
            rows, elapsed, rate
        );
    }
}
