#![warn(missing_docs)]

//! chunkflow core: keyset pagination predicates, positional bind-argument
//! sequencing, and chunk plan assembly for online chunked DML.
//!
//! Everything in this crate is pure and deterministic: given the same
//! unique-key spec the builders produce byte-identical SQL text, and the
//! placeholder slot lists they return are the single binding contract the
//! runtime crate uses to order positional arguments.

pub mod args;
pub mod clause;
pub mod error;
pub mod keyspec;
pub mod plan;
pub mod scalar;

pub use args::{sequence, sequence_pair};
pub use clause::{Comparator, KeysetClause, RangeClauses};
pub use error::CoreError;
pub use keyspec::{select_key, KeyColumn, KeyTuple, KeyValue, UniqueKeySpec};
pub use plan::{ChunkPlan, ExecSlots};
pub use scalar::{ScalarKind, ScalarValue};
