//! Boundary production.
//!
//! The producer walks the target table in key order, one keyset fetch per
//! chunk, and emits a [`Boundary`] per chunk into a bounded queue. The walk
//! never re-reads rows: each fetch resumes strictly after the previous
//! chunk's last tuple. A final terminal boundary tells the writer the table
//! has been exhausted.

use chunkflow_core::{sequence, ChunkPlan, KeyTuple, UniqueKeySpec};
use tokio::sync::mpsc;
use tracing::debug;

use crate::db::KeysetSource;
use crate::error::EngineError;

/// Capacity of the boundary queue between producer and writer.
pub const BOUNDARY_QUEUE_CAPACITY: usize = 1000;

/// One unit of work handed to the writer.
#[derive(Debug, Clone)]
pub struct Boundary {
    /// Predicate suffix appended to the base DML statement.
    pub predicate: String,
    /// Key tuples bound into the predicate. One tuple for equality chunks,
    /// a first/last pair for range chunks, empty for the terminal boundary.
    pub tuples: Vec<KeyTuple>,
    /// Whether this is the end-of-table marker.
    pub terminal: bool,
}

impl Boundary {
    fn chunk(predicate: String, tuples: Vec<KeyTuple>) -> Self {
        Self {
            predicate,
            tuples,
            terminal: false,
        }
    }

    fn terminal() -> Self {
        Self {
            predicate: String::new(),
            tuples: Vec::new(),
            terminal: true,
        }
    }
}

/// Walks the keyset and streams boundaries to the writer.
pub struct BoundaryProducer {
    spec: UniqueKeySpec,
    plan: ChunkPlan,
    chunk_size: u64,
    source: Box<dyn KeysetSource>,
    out: mpsc::Sender<Boundary>,
}

impl BoundaryProducer {
    /// Creates a producer for one run.
    pub fn new(
        spec: UniqueKeySpec,
        plan: ChunkPlan,
        chunk_size: u64,
        source: Box<dyn KeysetSource>,
        out: mpsc::Sender<Boundary>,
    ) -> Self {
        Self {
            spec,
            plan,
            chunk_size,
            source,
            out,
        }
    }

    /// Runs the walk to completion or to the first fetch error.
    ///
    /// A closed queue means the writer is gone; the producer stops quietly
    /// and lets the orchestrator report the writer's error.
    pub async fn run(self) -> Result<(), EngineError> {
        if self.chunk_size == 0 {
            debug!("chunk size zero, emitting terminal boundary only");
            let _ = self.out.send(Boundary::terminal()).await;
            return Ok(());
        }
        if self.chunk_size == 1 {
            self.walk_rows().await
        } else {
            self.walk_chunks().await
        }
    }

    async fn fetch_after(&self, last: &Option<KeyTuple>) -> Result<Vec<KeyTuple>, EngineError> {
        match last {
            None => {
                self.source
                    .fetch_key_rows(&self.plan.first_sql, &[], &self.spec)
                    .await
            }
            Some(tuple) => {
                let args = sequence(&self.plan.next_slots, tuple);
                self.source
                    .fetch_key_rows(&self.plan.next_sql, &args, &self.spec)
                    .await
            }
        }
    }

    async fn walk_chunks(self) -> Result<(), EngineError> {
        let mut last: Option<KeyTuple> = None;
        loop {
            let rows = self.fetch_after(&last).await?;
            let Some(first) = rows.first().cloned() else {
                debug!("keyset exhausted");
                let _ = self.out.send(Boundary::terminal()).await;
                return Ok(());
            };
            // a one-row fetch closes the chunk on its own first tuple
            let tail = rows.last().cloned().unwrap_or_else(|| first.clone());

            let boundary = Boundary::chunk(
                self.plan.exec_predicate.clone(),
                vec![first, tail.clone()],
            );
            if self.out.send(boundary).await.is_err() {
                debug!("boundary queue closed, stopping walk");
                return Ok(());
            }
            last = Some(tail);
        }
    }

    async fn walk_rows(self) -> Result<(), EngineError> {
        let mut last: Option<KeyTuple> = None;
        loop {
            let rows = self.fetch_after(&last).await?;
            if rows.is_empty() {
                debug!("keyset exhausted");
                let _ = self.out.send(Boundary::terminal()).await;
                return Ok(());
            }
            for row in &rows {
                let boundary =
                    Boundary::chunk(self.plan.exec_predicate.clone(), vec![row.clone()]);
                if self.out.send(boundary).await.is_err() {
                    debug!("boundary queue closed, stopping walk");
                    return Ok(());
                }
            }
            last = rows.last().cloned();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chunkflow_core::{KeyColumn, ScalarKind, ScalarValue};
    use std::sync::Mutex;

    fn int_spec() -> UniqueKeySpec {
        UniqueKeySpec {
            columns: vec![KeyColumn::new("id", ScalarKind::Int64, false)],
            primary: true,
        }
    }

    fn tuple(spec: &UniqueKeySpec, id: i64) -> KeyTuple {
        KeyTuple {
            entries: vec![chunkflow_core::KeyValue {
                column: spec.columns[0].name.clone(),
                value: ScalarValue::Int64(id),
            }],
        }
    }

    /// Serves an integer keyset, interpreting the bound argument as the
    /// exclusive lower bound for resumed fetches.
    struct IntKeyset {
        rows: Vec<i64>,
        chunk: usize,
        fetches: Mutex<u32>,
    }

    #[async_trait]
    impl KeysetSource for IntKeyset {
        async fn fetch_key_rows(
            &self,
            _sql: &str,
            args: &[ScalarValue],
            spec: &UniqueKeySpec,
        ) -> Result<Vec<KeyTuple>, EngineError> {
            *self.fetches.lock().unwrap() += 1;
            let floor = match args.first() {
                Some(ScalarValue::Int64(v)) => Some(*v),
                _ => None,
            };
            Ok(self
                .rows
                .iter()
                .filter(|id| floor.map_or(true, |f| **id > f))
                .take(self.chunk)
                .map(|id| tuple(spec, *id))
                .collect())
        }
    }

    fn producer(
        rows: Vec<i64>,
        chunk_size: u64,
        out: mpsc::Sender<Boundary>,
    ) -> BoundaryProducer {
        let spec = int_spec();
        let plan = ChunkPlan::new(&spec, "app", "t", None, chunk_size);
        let fetch_window = if chunk_size == 1 { 1000 } else { chunk_size as usize };
        BoundaryProducer::new(
            spec,
            plan,
            chunk_size,
            Box::new(IntKeyset {
                rows,
                chunk: fetch_window,
                fetches: Mutex::new(0),
            }),
            out,
        )
    }

    async fn collect(rows: Vec<i64>, chunk_size: u64) -> Vec<Boundary> {
        let (tx, mut rx) = mpsc::channel(BOUNDARY_QUEUE_CAPACITY);
        producer(rows, chunk_size, tx).run().await.unwrap();
        let mut out = Vec::new();
        while let Some(b) = rx.recv().await {
            out.push(b);
        }
        out
    }

    fn ids(boundary: &Boundary) -> Vec<i64> {
        boundary
            .tuples
            .iter()
            .map(|t| match t.scalar(0) {
                ScalarValue::Int64(v) => *v,
                other => panic!("unexpected value {:?}", other),
            })
            .collect()
    }

    mod chunked {
        use super::*;

        #[tokio::test]
        async fn test_pairs_and_terminal() {
            let rows: Vec<i64> = (1..=2500).collect();
            let boundaries = collect(rows, 1000).await;
            assert_eq!(boundaries.len(), 4);
            assert_eq!(ids(&boundaries[0]), vec![1, 1000]);
            assert_eq!(ids(&boundaries[1]), vec![1001, 2000]);
            assert_eq!(ids(&boundaries[2]), vec![2001, 2500]);
            assert!(boundaries[3].terminal);
        }

        #[tokio::test]
        async fn test_exact_multiple_ends_cleanly() {
            let rows: Vec<i64> = (1..=2000).collect();
            let boundaries = collect(rows, 1000).await;
            assert_eq!(boundaries.len(), 3);
            assert_eq!(ids(&boundaries[1]), vec![1001, 2000]);
            assert!(boundaries[2].terminal);
        }

        #[tokio::test]
        async fn test_single_row_fetch_reuses_first_as_last() {
            let rows: Vec<i64> = (1..=1001).collect();
            let boundaries = collect(rows, 1000).await;
            assert_eq!(ids(&boundaries[1]), vec![1001, 1001]);
            assert!(boundaries[2].terminal);
        }

        #[tokio::test]
        async fn test_empty_table_is_terminal_only() {
            let boundaries = collect(Vec::new(), 1000).await;
            assert_eq!(boundaries.len(), 1);
            assert!(boundaries[0].terminal);
        }
    }

    mod single_row {
        use super::*;

        #[tokio::test]
        async fn test_one_boundary_per_row() {
            let rows: Vec<i64> = (1..=5).collect();
            let boundaries = collect(rows, 1).await;
            assert_eq!(boundaries.len(), 6);
            for (i, b) in boundaries[..5].iter().enumerate() {
                assert_eq!(ids(b), vec![i as i64 + 1]);
                assert_eq!(b.tuples.len(), 1);
            }
            assert!(boundaries[5].terminal);
        }
    }

    mod degenerate {
        use super::*;

        #[tokio::test]
        async fn test_chunk_size_zero_is_terminal_only() {
            let (tx, mut rx) = mpsc::channel(BOUNDARY_QUEUE_CAPACITY);
            producer(vec![1, 2, 3], 0, tx).run().await.unwrap();
            let first = rx.recv().await.unwrap();
            assert!(first.terminal);
            assert!(rx.recv().await.is_none());
        }
    }
}
