//! Unique-key model: column descriptors, key tuples, and key selection.
//!
//! A [`UniqueKeySpec`] is chosen once per run from the introspected table
//! metadata (a caller-forced column set wins, else the primary key, else
//! the first unique-key candidate) and is immutable thereafter.

use crate::error::CoreError;
use crate::scalar::{ScalarKind, ScalarValue};
use serde::{Deserialize, Serialize};

/// One column of a chunking key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyColumn {
    /// Column name, unquoted.
    pub name: String,
    /// Scalar kind derived from the declared SQL type.
    pub kind: ScalarKind,
    /// Whether the column admits NULL.
    pub nullable: bool,
}

impl KeyColumn {
    /// Create a new key column descriptor.
    pub fn new(name: impl Into<String>, kind: ScalarKind, nullable: bool) -> Self {
        Self {
            name: name.into(),
            kind,
            nullable,
        }
    }
}

/// An ordered composite unique key chosen for chunk traversal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UniqueKeySpec {
    /// Ordered column descriptors.
    pub columns: Vec<KeyColumn>,
    /// Whether this key is the table's primary key.
    pub primary: bool,
}

impl UniqueKeySpec {
    /// Create a spec from its columns.
    pub fn new(columns: Vec<KeyColumn>, primary: bool) -> Self {
        Self { columns, primary }
    }

    /// Number of key columns.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Whether the spec has no columns.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Backtick-quoted, comma-joined column list used in select lists and
    /// ORDER BY clauses.
    pub fn quoted_key_list(&self) -> String {
        self.columns
            .iter()
            .map(|c| format!("`{}`", c.name))
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Unquoted column names in key order.
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// Whether a tuple has the right arity and column names for this key.
    pub fn matches_tuple(&self, tuple: &KeyTuple) -> bool {
        tuple.len() == self.len()
            && tuple
                .entries
                .iter()
                .zip(&self.columns)
                .all(|(kv, col)| kv.column == col.name)
    }
}

/// One (column, value) pair of a boundary row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyValue {
    /// Column name, unquoted.
    pub column: String,
    /// The fetched value.
    pub value: ScalarValue,
}

/// An ordered tuple of key values, one entry per key column.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct KeyTuple {
    /// The (column, value) pairs in key order.
    pub entries: Vec<KeyValue>,
}

impl KeyTuple {
    /// Build a tuple from (column, value) pairs.
    pub fn new(entries: Vec<KeyValue>) -> Self {
        Self { entries }
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the tuple is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Value at key-column position `i`.
    pub fn scalar(&self, i: usize) -> &ScalarValue {
        &self.entries[i].value
    }
}

/// Select the chunking key for a run.
///
/// A caller-forced column set (order-insensitive) must match one of the
/// candidates exactly; without a forced set the first primary-key
/// candidate wins, then the first candidate of any kind.
pub fn select_key(
    candidates: &[UniqueKeySpec],
    forced_columns: Option<&[String]>,
) -> Result<UniqueKeySpec, CoreError> {
    if candidates.is_empty() {
        return Err(CoreError::NoUsableKey);
    }

    if let Some(forced) = forced_columns {
        let mut wanted: Vec<String> = forced.to_vec();
        wanted.sort();
        for candidate in candidates {
            let mut names = candidate.column_names();
            names.sort();
            if names == wanted {
                return Ok(candidate.clone());
            }
        }
        return Err(CoreError::ForcedKeyMismatch {
            columns: forced.join(","),
        });
    }

    if let Some(primary) = candidates.iter().find(|c| c.primary) {
        return Ok(primary.clone());
    }

    Ok(candidates[0].clone())
}
