//! Run orchestration.
//!
//! [`Pipeline`] wires the producer, writer, throttle controller, and optional
//! progress reporter together over bounded queues and supervises them until
//! the terminal boundary or the first error. [`run`] is the binary's entry
//! point: it performs the pre-flight work (statement introspection, key
//! selection, plan construction, replica discovery) against a real server
//! and then drives a pipeline.

use std::sync::Arc;
use std::time::Instant;

use chunkflow_core::{select_key, ChunkPlan, UniqueKeySpec};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::boundary::{BoundaryProducer, BOUNDARY_QUEUE_CAPACITY};
use crate::config::RunConfig;
use crate::db::{DmlSink, KeysetSource};
use crate::error::EngineError;
use crate::introspect;
use crate::lag::{ReplicaFilter, ReplicaMonitor};
use crate::mysql::{self, MySqlDmlSink, MySqlKeysetSource, MySqlTopology};
use crate::progress::{ProgressReporter, REPORT_INTERVAL};
use crate::state::RunState;
use crate::throttle::{ThrottleConfig, ThrottleController, TOKEN_QUEUE_CAPACITY};
use crate::writer::ChunkWriter;

/// What a finished run accomplished.
#[derive(Debug, Clone, Copy)]
pub struct RunSummary {
    /// Total rows affected across committed transactions.
    pub rows_affected: u64,
    /// Wall time of the run in seconds.
    pub elapsed_secs: f64,
}

/// A fully wired chunked-DML pipeline, ready to run.
pub struct Pipeline {
    spec: UniqueKeySpec,
    plan: ChunkPlan,
    base_sql: String,
    chunk_size: u64,
    txn_size: u64,
    throttle: ThrottleConfig,
    print_progress: bool,
    source: Box<dyn KeysetSource>,
    sink: Box<dyn DmlSink>,
    monitor: Option<ReplicaMonitor>,
    state: Arc<RunState>,
}

impl Pipeline {
    /// Assembles a pipeline over the given collaborators.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        spec: UniqueKeySpec,
        plan: ChunkPlan,
        base_sql: String,
        chunk_size: u64,
        txn_size: u64,
        throttle: ThrottleConfig,
        print_progress: bool,
        source: Box<dyn KeysetSource>,
        sink: Box<dyn DmlSink>,
        monitor: Option<ReplicaMonitor>,
    ) -> Self {
        Self {
            spec,
            plan,
            base_sql,
            chunk_size,
            txn_size,
            throttle,
            print_progress,
            source,
            sink,
            monitor,
            state: Arc::new(RunState::new()),
        }
    }

    /// The shared run state, for observation during and after the run.
    pub fn state(&self) -> Arc<RunState> {
        Arc::clone(&self.state)
    }

    /// Runs the pipeline to the terminal boundary or the first task error.
    pub async fn run(self) -> Result<(), EngineError> {
        let (boundary_tx, boundary_rx) = mpsc::channel(BOUNDARY_QUEUE_CAPACITY);
        let (token_tx, token_rx) = mpsc::channel(TOKEN_QUEUE_CAPACITY);

        let exec_slots = self.plan.exec_slots.clone();
        let producer = BoundaryProducer::new(
            self.spec,
            self.plan,
            self.chunk_size,
            self.source,
            boundary_tx,
        );
        let writer = ChunkWriter::new(
            self.base_sql,
            exec_slots,
            self.txn_size,
            self.sink,
            Arc::clone(&self.state),
        );
        let controller =
            ThrottleController::new(self.throttle, Arc::clone(&self.state), token_tx);

        let mut producer_task = tokio::spawn(producer.run());
        let mut writer_task = tokio::spawn(writer.run(boundary_rx, token_rx));
        let throttle_task = tokio::spawn(controller.run(self.monitor));
        let progress_task = self.print_progress.then(|| {
            tokio::spawn(ProgressReporter::new(Arc::clone(&self.state), REPORT_INTERVAL).run())
        });

        let mut producer_done = false;
        let mut writer_done = false;
        let mut result: Result<(), EngineError> = Ok(());

        while !(producer_done && writer_done) {
            tokio::select! {
                joined = &mut producer_task, if !producer_done => {
                    producer_done = true;
                    match joined {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => {
                            result = Err(e);
                            break;
                        }
                        Err(e) => {
                            result = Err(EngineError::Read {
                                msg: format!("producer task failed: {}", e),
                            });
                            break;
                        }
                    }
                }
                joined = &mut writer_task, if !writer_done => {
                    writer_done = true;
                    match joined {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => {
                            result = Err(e);
                            break;
                        }
                        Err(e) => {
                            result = Err(EngineError::Write {
                                msg: format!("writer task failed: {}", e),
                            });
                            break;
                        }
                    }
                }
            }
        }

        // on the error path the other tasks unwind through closed channels
        self.state.mark_finished();
        if !producer_done {
            producer_task.abort();
        }
        if !writer_done {
            writer_task.abort();
        }
        let _ = throttle_task.await;
        if let Some(task) = progress_task {
            let _ = task.await;
        }
        result
    }
}

/// Executes a full run against MySQL: pre-flight, discovery, pipeline.
pub async fn run(cfg: RunConfig) -> Result<RunSummary, EngineError> {
    cfg.validate()?;
    let started = Instant::now();

    let statement = introspect::inspect_dml(&cfg.execute_query)?;
    info!(table = %statement.table, "chunking {:?} statement", statement.kind);

    let read_pool = mysql::connect(&cfg, Some(&cfg.database)).await?;
    if !mysql::table_exists(&read_pool, &cfg.database, &statement.table).await? {
        return Err(EngineError::Introspection {
            msg: format!("table {}.{} does not exist", cfg.database, statement.table),
        });
    }

    let ddl = mysql::show_create_table(&read_pool, &cfg.database, &statement.table).await?;
    let candidates = introspect::candidate_keys(&ddl)?;
    let forced = cfg.forced_columns();
    let spec = select_key(&candidates, forced.as_deref())?;
    info!(
        key = %spec.quoted_key_list(),
        primary = spec.primary,
        "chunking on unique key"
    );

    let plan = ChunkPlan::new(
        &spec,
        &cfg.database,
        &statement.table,
        statement.origin_where.as_deref(),
        cfg.chunk_size,
    );

    // writes get their own connections so fetches never queue behind DML
    let write_pool = mysql::connect(&cfg, Some(&cfg.database)).await?;

    let topology = MySqlTopology::new(read_pool.clone(), cfg.clone());
    let filter = ReplicaFilter::new(cfg.include_replicas.clone(), cfg.exclude_replicas.clone());
    let monitor = match ReplicaMonitor::discover(&topology, &filter).await {
        Ok(monitor) => Some(monitor),
        Err(e) => {
            warn!("replica discovery failed, throttling on baseline sleep only: {}", e);
            None
        }
    };

    let pipeline = Pipeline::new(
        spec,
        plan,
        statement.base_sql,
        cfg.chunk_size,
        cfg.txn_size,
        cfg.throttle(),
        cfg.print_progress,
        Box::new(MySqlKeysetSource::new(read_pool)),
        Box::new(MySqlDmlSink::new(write_pool)),
        monitor,
    );
    let state = pipeline.state();
    pipeline.run().await?;

    let summary = RunSummary {
        rows_affected: state.rows_affected(),
        elapsed_secs: started.elapsed().as_secs_f64(),
    };
    info!(
        "run complete: {} rows affected in {:.2}s",
        summary.rows_affected, summary.elapsed_secs
    );
    Ok(summary)
}
