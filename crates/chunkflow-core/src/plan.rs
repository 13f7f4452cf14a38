//! Chunk plan assembly: the fetch statements the boundary producer walks
//! the table with, and the exec predicate appended to the rewritten DML.
//!
//! Keyset pagination shape: the first fetch selects the key columns under
//! the caller's original WHERE, ordered by the key; every later fetch adds
//! the strict ">" clause past the last-seen tuple. The exec predicate is
//! either the AND-of-equalities form (chunk size 1) or the ">=" lower /
//! "<=" upper pair with a row limit (chunk size > 1).

use crate::clause::{build_equality_clause, build_range_clauses};
use crate::keyspec::UniqueKeySpec;

/// Placeholder slot contract of the exec predicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecSlots {
    /// Chunk size 1: one tuple bound against the equality clause.
    Equality(Vec<usize>),
    /// Chunk size > 1: a lower tuple bound against the ">=" clause and an
    /// upper tuple bound against the "<=" clause, concatenated.
    Range {
        /// Slots of the ">=" (lower bound) half.
        lower: Vec<usize>,
        /// Slots of the "<=" (upper bound) half.
        upper: Vec<usize>,
    },
}

/// Precomputed SQL text and binding contracts for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkPlan {
    /// First boundary fetch (no bind arguments).
    pub first_sql: String,
    /// Subsequent boundary fetches, bound past the last-seen tuple.
    pub next_sql: String,
    /// Slot contract of `next_sql`'s ">" clause.
    pub next_slots: Vec<usize>,
    /// Predicate appended to the rewritten DML text.
    pub exec_predicate: String,
    /// Slot contract of `exec_predicate`.
    pub exec_slots: ExecSlots,
}

/// Fetch window used for the row-at-a-time walk (chunk size 1).
pub const SINGLE_ROW_FETCH_WINDOW: u64 = 1000;

impl ChunkPlan {
    /// Build the plan for one run.
    ///
    /// `origin_where` is the WHERE body of the caller's statement, if any;
    /// it is parenthesized here. Meaningful for `chunk_size >= 1`; a
    /// zero chunk size short-circuits before any fetch.
    pub fn new(
        spec: &UniqueKeySpec,
        database: &str,
        table: &str,
        origin_where: Option<&str>,
        chunk_size: u64,
    ) -> Self {
        let keys = spec.quoted_key_list();
        let where_text = match origin_where {
            Some(w) => format!("({w})"),
            None => "1 = 1".to_string(),
        };
        let clauses = build_range_clauses(spec);

        let base = format!(
            "select /*!40001 SQL_NO_CACHE */ {keys} from {database}.{table} where {where_text}"
        );
        let next_base = format!("{base} AND {} ", clauses.gt.text);
        let first_sql = format!("{base} ORDER BY {keys} LIMIT {chunk_size} ");
        let next_limit = if chunk_size > 1 {
            chunk_size
        } else {
            SINGLE_ROW_FETCH_WINDOW
        };
        let next_sql = format!("{next_base} ORDER BY {keys} LIMIT {next_limit} ");

        let (exec_predicate, exec_slots) = if chunk_size == 1 {
            let eq = build_equality_clause(spec);
            (format!(" AND {}", eq.text), ExecSlots::Equality(eq.slots))
        } else {
            (
                format!(
                    " AND ({} AND {}) limit {chunk_size}",
                    clauses.ge.text, clauses.le.text
                ),
                ExecSlots::Range {
                    lower: clauses.ge.slots,
                    upper: clauses.le.slots,
                },
            )
        };

        Self {
            first_sql,
            next_sql,
            next_slots: clauses.gt.slots,
            exec_predicate,
            exec_slots,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keyspec::KeyColumn;
    use crate::scalar::ScalarKind;

    fn id_spec() -> UniqueKeySpec {
        UniqueKeySpec::new(vec![KeyColumn::new("id", ScalarKind::Int64, false)], true)
    }

    mod fetch_sql {
        use super::*;

        #[test]
        fn test_first_sql_shape() {
            let plan = ChunkPlan::new(&id_spec(), "shop", "orders", Some("`state` = 0"), 1000);
            assert_eq!(
                plan.first_sql,
                "select /*!40001 SQL_NO_CACHE */ `id` from shop.orders \
                 where (`state` = 0) ORDER BY `id` LIMIT 1000 "
            );
        }

        #[test]
        fn test_next_sql_appends_strict_clause() {
            let plan = ChunkPlan::new(&id_spec(), "shop", "orders", Some("`state` = 0"), 1000);
            assert!(plan.next_sql.contains(" AND ((`id` > ?)) "));
            assert!(plan.next_sql.ends_with("ORDER BY `id` LIMIT 1000 "));
            assert_eq!(plan.next_slots, vec![0]);
        }

        #[test]
        fn test_missing_where_defaults_to_true() {
            let plan = ChunkPlan::new(&id_spec(), "shop", "orders", None, 10);
            assert!(plan.first_sql.contains("where 1 = 1 ORDER BY"));
        }

        #[test]
        fn test_single_row_walk_uses_wide_window() {
            let plan = ChunkPlan::new(&id_spec(), "shop", "orders", None, 1);
            assert!(plan.first_sql.ends_with("LIMIT 1 "));
            assert!(plan.next_sql.ends_with("LIMIT 1000 "));
        }
    }

    mod exec_predicate {
        use super::*;

        #[test]
        fn test_chunked_predicate_pairs_bounds() {
            let plan = ChunkPlan::new(&id_spec(), "shop", "orders", None, 500);
            assert_eq!(
                plan.exec_predicate,
                " AND (((`id` >= ?)) AND ((`id` <= ?))) limit 500"
            );
            match plan.exec_slots {
                ExecSlots::Range { ref lower, ref upper } => {
                    assert_eq!(lower, &vec![0]);
                    assert_eq!(upper, &vec![0]);
                }
                _ => panic!("expected range slots"),
            }
        }

        #[test]
        fn test_single_row_predicate_is_equality() {
            let plan = ChunkPlan::new(&id_spec(), "shop", "orders", None, 1);
            assert_eq!(plan.exec_predicate, " AND ((`id` = ?))");
            assert_eq!(plan.exec_slots, ExecSlots::Equality(vec![0]));
        }

        #[test]
        fn test_nullable_composite_key_predicate() {
            let spec = UniqueKeySpec::new(
                vec![
                    KeyColumn::new("id", ScalarKind::Int64, false),
                    KeyColumn::new("name", ScalarKind::Text, true),
                ],
                true,
            );
            let plan = ChunkPlan::new(&spec, "shop", "orders", None, 500);
            assert!(plan
                .exec_predicate
                .contains("(`id` = ? AND (? IS NULL OR `name` >= ?))"));
            assert!(plan.exec_predicate.ends_with("limit 500"));
        }
    }

    mod determinism {
        use super::*;

        #[test]
        fn test_plan_is_pure() {
            let a = ChunkPlan::new(&id_spec(), "a", "b", Some("x = 1"), 100);
            let b = ChunkPlan::new(&id_spec(), "a", "b", Some("x = 1"), 100);
            assert_eq!(a, b);
        }
    }
}
