//! Closed scalar model for chunking-key values.
//!
//! The kind is fixed at introspection time from the declared SQL column
//! type; the value side additionally carries `Null` so that boundary rows
//! read from nullable key columns bind back as SQL NULL.

use serde::{Deserialize, Serialize};

/// The scalar kind of a key column, chosen from its declared SQL type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScalarKind {
    /// Signed 64-bit integer (covers all signed integer column widths).
    Int64,
    /// Unsigned 64-bit integer (BIGINT UNSIGNED).
    UInt64,
    /// 64-bit float (FLOAT and DOUBLE columns).
    Float64,
    /// Text (covers strings, dates, datetimes and timestamps).
    Text,
}

/// One key-column value fetched from a boundary row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ScalarValue {
    /// SQL NULL read from a nullable key column.
    Null,
    /// Signed integer value.
    Int64(i64),
    /// Unsigned integer value.
    UInt64(u64),
    /// Floating-point value.
    Float64(f64),
    /// Textual value.
    Text(String),
}

impl ScalarValue {
    /// Whether this value is SQL NULL.
    pub fn is_null(&self) -> bool {
        matches!(self, ScalarValue::Null)
    }

    /// The kind this value belongs to, or `None` for NULL.
    pub fn kind(&self) -> Option<ScalarKind> {
        match self {
            ScalarValue::Null => None,
            ScalarValue::Int64(_) => Some(ScalarKind::Int64),
            ScalarValue::UInt64(_) => Some(ScalarKind::UInt64),
            ScalarValue::Float64(_) => Some(ScalarKind::Float64),
            ScalarValue::Text(_) => Some(ScalarKind::Text),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_null() {
        assert!(ScalarValue::Null.is_null());
        assert!(!ScalarValue::Int64(0).is_null());
    }

    #[test]
    fn test_kind_of_value() {
        assert_eq!(ScalarValue::Null.kind(), None);
        assert_eq!(ScalarValue::Int64(-3).kind(), Some(ScalarKind::Int64));
        assert_eq!(ScalarValue::UInt64(3).kind(), Some(ScalarKind::UInt64));
        assert_eq!(ScalarValue::Float64(0.5).kind(), Some(ScalarKind::Float64));
        assert_eq!(
            ScalarValue::Text("x".to_string()).kind(),
            Some(ScalarKind::Text)
        );
    }

    #[test]
    fn test_serialization_round_trip() {
        let value = ScalarValue::Text("2024-03-07 12:00:00".to_string());
        let json = serde_json::to_string(&value).unwrap();
        let decoded: ScalarValue = serde_json::from_str(&json).unwrap();
        assert_eq!(value, decoded);
    }
}
