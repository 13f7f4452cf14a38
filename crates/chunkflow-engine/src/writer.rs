//! Chunk execution.
//!
//! The writer consumes boundaries from the producer, binds each one into the
//! base DML statement, and batches statements into transactions of at least
//! `txn_size` rows. Before opening each transaction it drains the throttle
//! queue, honoring only the freshest token: a sleep delays the transaction,
//! a pause backs off and re-checks.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chunkflow_core::{sequence, sequence_pair, ExecSlots, ScalarValue};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::boundary::Boundary;
use crate::db::{DmlSink, DmlTxn};
use crate::error::EngineError;
use crate::state::RunState;
use crate::throttle::ThrottleToken;

/// Fresh-transaction retries after a failed chunk statement.
const MAX_WRITE_RETRIES: u32 = 3;

/// Per-attempt timeout for a retried chunk statement.
const RETRY_TIMEOUT: Duration = Duration::from_secs(10);

/// Back-off between pause re-checks.
const PAUSE_BACKOFF: Duration = Duration::from_secs(1);

/// Executes chunk statements and commits them in row-bounded transactions.
pub struct ChunkWriter {
    base_sql: String,
    exec_slots: ExecSlots,
    txn_size: u64,
    sink: Box<dyn DmlSink>,
    state: Arc<RunState>,
}

impl ChunkWriter {
    /// Creates a writer for one run.
    pub fn new(
        base_sql: String,
        exec_slots: ExecSlots,
        txn_size: u64,
        sink: Box<dyn DmlSink>,
        state: Arc<RunState>,
    ) -> Self {
        Self {
            base_sql,
            exec_slots,
            txn_size,
            sink,
            state,
        }
    }

    /// Consumes boundaries until the terminal marker, then marks the run
    /// finished. Returns the first unrecoverable statement error.
    pub async fn run(
        mut self,
        mut boundaries: mpsc::Receiver<Boundary>,
        mut tokens: mpsc::Receiver<ThrottleToken>,
    ) -> Result<(), EngineError> {
        loop {
            self.pace(&mut tokens).await;

            let started = Instant::now();
            let mut txn = self.sink.begin().await?;
            let mut rows: u64 = 0;
            let mut finished = false;

            loop {
                let Some(boundary) = boundaries.recv().await else {
                    return Err(EngineError::Read {
                        msg: "boundary stream closed before the terminal boundary".to_string(),
                    });
                };
                if boundary.terminal {
                    finished = true;
                    break;
                }

                let sql = format!("{}{}", self.base_sql, boundary.predicate);
                let args = exec_args(&self.exec_slots, &boundary)?;
                let (next_txn, affected) = self.execute_with_retry(txn, &sql, &args).await?;
                txn = next_txn;
                rows += affected;
                if rows >= self.txn_size {
                    break;
                }
            }

            txn.commit().await?;
            self.state.add_rows(rows);
            self.state
                .set_last_txn_millis(started.elapsed().as_millis() as u64);
            debug!(rows, "transaction committed");

            if finished {
                self.state.mark_finished();
                info!("terminal boundary reached, writer done");
                return Ok(());
            }
        }
    }

    /// Applies the freshest throttle token, discarding stale ones.
    async fn pace(&self, tokens: &mut mpsc::Receiver<ThrottleToken>) {
        loop {
            let mut latest = None;
            while let Ok(token) = tokens.try_recv() {
                latest = Some(token);
            }
            match latest {
                Some(ThrottleToken::Pause) => {
                    debug!("paused on replica lag");
                    tokio::time::sleep(PAUSE_BACKOFF).await;
                }
                Some(ThrottleToken::Sleep(ms)) if ms > 0 => {
                    debug!(ms, "throttled");
                    tokio::time::sleep(Duration::from_millis(ms)).await;
                    return;
                }
                _ => return,
            }
        }
    }

    /// Executes one statement, retrying in fresh transactions on failure.
    ///
    /// Each retry gets its own transaction and a hard timeout. When every
    /// retry fails the original error is surfaced. Statements batched into
    /// the abandoned transaction are rolled back and re-covered by a later
    /// run over the same predicate window.
    async fn execute_with_retry(
        &mut self,
        mut txn: Box<dyn DmlTxn>,
        sql: &str,
        args: &[ScalarValue],
    ) -> Result<(Box<dyn DmlTxn>, u64), EngineError> {
        let original = match txn.execute(sql, args).await {
            Ok(affected) => return Ok((txn, affected)),
            Err(e) => e,
        };
        drop(txn);

        for attempt in 1..=MAX_WRITE_RETRIES {
            warn!(attempt, "chunk statement failed, retrying in a fresh transaction");
            let mut fresh = self.sink.begin().await?;
            match tokio::time::timeout(RETRY_TIMEOUT, fresh.execute(sql, args)).await {
                Ok(Ok(affected)) => {
                    debug!(attempt, "retry succeeded");
                    return Ok((fresh, affected));
                }
                Ok(Err(e)) => {
                    debug!(attempt, "retry failed: {}", e);
                }
                Err(_) => {
                    warn!(attempt, "retry timed out");
                }
            }
        }
        Err(original)
    }
}

/// Binds a boundary's tuples into the statement's placeholder order.
fn exec_args(slots: &ExecSlots, boundary: &Boundary) -> Result<Vec<ScalarValue>, EngineError> {
    match slots {
        ExecSlots::Equality(slots) => {
            let tuple = boundary.tuples.first().ok_or_else(|| EngineError::Read {
                msg: "equality boundary without a key tuple".to_string(),
            })?;
            Ok(sequence(slots, tuple))
        }
        ExecSlots::Range { lower, upper } => {
            if boundary.tuples.len() != 2 {
                return Err(EngineError::Read {
                    msg: format!(
                        "range boundary carries {} tuple(s), expected a pair",
                        boundary.tuples.len()
                    ),
                });
            }
            Ok(sequence_pair(
                lower,
                upper,
                &boundary.tuples[0],
                &boundary.tuples[1],
            ))
        }
    }
}
