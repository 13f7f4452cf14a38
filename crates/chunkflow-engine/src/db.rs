//! Database seams used by the pipeline tasks.
//!
//! The producer, writer, and lag monitor talk to the server through these
//! traits so the pipeline can be exercised end to end against in-memory
//! fakes. The MySQL implementations live in [`crate::mysql`].

use async_trait::async_trait;
use chunkflow_core::{KeyTuple, ScalarValue, UniqueKeySpec};

use crate::error::EngineError;

/// A replica advertised by the source server.
#[derive(Debug, Clone)]
pub struct ReplicaHost {
    /// The replica's server id, zero when not reported.
    pub server_id: i64,
    /// Host name or address.
    pub host: String,
    /// Advertised port, zero when not reported.
    pub port: u16,
}

/// Read side of the pipeline: fetches key tuples for boundary production.
#[async_trait]
pub trait KeysetSource: Send + Sync {
    /// Runs a key-fetch statement and decodes each row into a [`KeyTuple`]
    /// shaped by `spec`.
    async fn fetch_key_rows(
        &self,
        sql: &str,
        args: &[ScalarValue],
        spec: &UniqueKeySpec,
    ) -> Result<Vec<KeyTuple>, EngineError>;
}

/// An open transaction on the write connection.
#[async_trait]
pub trait DmlTxn: Send {
    /// Executes one chunk statement, returning the rows affected.
    async fn execute(&mut self, sql: &str, args: &[ScalarValue]) -> Result<u64, EngineError>;

    /// Commits everything executed on this transaction.
    async fn commit(self: Box<Self>) -> Result<(), EngineError>;
}

/// Write side of the pipeline: hands out transactions.
#[async_trait]
pub trait DmlSink: Send + Sync {
    /// Opens a new transaction.
    async fn begin(&self) -> Result<Box<dyn DmlTxn>, EngineError>;
}

/// A lag probe connected to a single replica.
#[async_trait]
pub trait ReplicaProbe: Send + Sync {
    /// The replica host this probe is connected to.
    fn host(&self) -> &str;

    /// Current replication lag in seconds. Errors when the replica is not
    /// replicating or cannot be reached.
    async fn lag_seconds(&self) -> Result<i64, EngineError>;
}

/// Replica discovery on the source server.
#[async_trait]
pub trait ReplicaTopology: Send + Sync {
    /// The replicas currently advertised by the source.
    async fn replica_hosts(&self) -> Result<Vec<ReplicaHost>, EngineError>;

    /// Connects a lag probe to one advertised replica.
    async fn connect_probe(&self, host: &ReplicaHost) -> Result<Box<dyn ReplicaProbe>, EngineError>;
}
