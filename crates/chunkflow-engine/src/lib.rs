#![warn(missing_docs)]

//! chunkflow runtime.
//!
//! Executes a large UPDATE or DELETE against MySQL as a stream of small
//! keyset-bounded chunks, batched into row-capped transactions and paced by
//! replica lag. The SQL shapes come from [`chunkflow_core`]; this crate owns
//! the moving parts: boundary production, chunk execution, lag monitoring,
//! throttling, and orchestration.

pub mod boundary;
pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod introspect;
pub mod lag;
pub mod mysql;
pub mod progress;
pub mod run;
pub mod state;
pub mod throttle;
pub mod writer;

pub use boundary::{Boundary, BoundaryProducer, BOUNDARY_QUEUE_CAPACITY};
pub use config::RunConfig;
pub use error::EngineError;
pub use lag::{ReplicaFilter, ReplicaMonitor, Vocabulary};
pub use run::{Pipeline, RunSummary};
pub use state::RunState;
pub use throttle::{ThrottleConfig, ThrottleController, ThrottleToken, TOKEN_QUEUE_CAPACITY};
pub use writer::ChunkWriter;
