//! Positional bind-argument sequencing.
//!
//! A clause's `slots` list is the binding contract: slot `p` names the key
//! column whose value the `p`-th placeholder binds. Sequencing is therefore
//! a straight slot-to-value mapping, which for a non-nullable key spec
//! reduces to the triangular expansion (`n(n+1)/2` arguments for a single
//! tuple, `n(n+1)` for a lower/upper pair). A mismatch here silently binds
//! the wrong value to the wrong placeholder, so the tests below pin the
//! counts exhaustively for small key widths.

use crate::keyspec::KeyTuple;
use crate::scalar::ScalarValue;

/// Arguments for one clause against one key tuple.
///
/// `slots` must come from the clause the arguments are bound to, and the
/// tuple must carry one value per key column.
pub fn sequence(slots: &[usize], tuple: &KeyTuple) -> Vec<ScalarValue> {
    slots.iter().map(|&i| tuple.scalar(i).clone()).collect()
}

/// Arguments for a lower-bound clause followed by an upper-bound clause,
/// as used by the chunked exec predicate: the lower tuple binds the ">="
/// half, the upper tuple binds the "<=" half, concatenated.
pub fn sequence_pair(
    lower_slots: &[usize],
    upper_slots: &[usize],
    lower: &KeyTuple,
    upper: &KeyTuple,
) -> Vec<ScalarValue> {
    let mut args = sequence(lower_slots, lower);
    args.extend(sequence(upper_slots, upper));
    args
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clause::{build_equality_clause, build_range_clauses};
    use crate::keyspec::{KeyColumn, KeyValue, UniqueKeySpec};
    use crate::scalar::ScalarKind;

    fn spec_of(n: usize) -> UniqueKeySpec {
        let columns = (0..n)
            .map(|i| KeyColumn::new(format!("k{i}"), ScalarKind::Int64, false))
            .collect();
        UniqueKeySpec::new(columns, true)
    }

    fn tuple_of(values: &[i64]) -> KeyTuple {
        KeyTuple::new(
            values
                .iter()
                .enumerate()
                .map(|(i, &v)| KeyValue {
                    column: format!("k{i}"),
                    value: ScalarValue::Int64(v),
                })
                .collect(),
        )
    }

    mod triangular_counts {
        use super::*;

        #[test]
        fn test_single_tuple_counts() {
            for n in 1..=4usize {
                let spec = spec_of(n);
                let clauses = build_range_clauses(&spec);
                let tuple = tuple_of(&(0..n as i64).collect::<Vec<_>>());
                let args = sequence(&clauses.gt.slots, &tuple);
                assert_eq!(args.len(), n * (n + 1) / 2, "n={n}");
            }
        }

        #[test]
        fn test_paired_counts() {
            for n in 1..=4usize {
                let spec = spec_of(n);
                let clauses = build_range_clauses(&spec);
                let lower = tuple_of(&(0..n as i64).collect::<Vec<_>>());
                let upper = tuple_of(&(100..100 + n as i64).collect::<Vec<_>>());
                let args =
                    sequence_pair(&clauses.ge.slots, &clauses.le.slots, &lower, &upper);
                assert_eq!(args.len(), n * (n + 1), "n={n}");
            }
        }

        #[test]
        fn test_equality_counts() {
            for n in 1..=4usize {
                let spec = spec_of(n);
                let eq = build_equality_clause(&spec);
                let tuple = tuple_of(&(0..n as i64).collect::<Vec<_>>());
                assert_eq!(sequence(&eq.slots, &tuple).len(), n);
            }
        }
    }

    mod value_order {
        use super::*;

        #[test]
        fn test_triangular_order_n3() {
            // (k0 > v0) OR (k0 = v0 AND k1 > v1) OR (k0 = v0 AND k1 = v1 AND k2 >= v2)
            let spec = spec_of(3);
            let clauses = build_range_clauses(&spec);
            let tuple = tuple_of(&[10, 20, 30]);
            let args = sequence(&clauses.ge.slots, &tuple);
            let expected: Vec<ScalarValue> = [10, 10, 20, 10, 20, 30]
                .iter()
                .map(|&v| ScalarValue::Int64(v))
                .collect();
            assert_eq!(args, expected);
        }

        #[test]
        fn test_pair_halves_are_independent() {
            let spec = spec_of(2);
            let clauses = build_range_clauses(&spec);
            let lower = tuple_of(&[1, 2]);
            let upper = tuple_of(&[8, 9]);
            let args = sequence_pair(&clauses.ge.slots, &clauses.le.slots, &lower, &upper);
            let expected: Vec<ScalarValue> = [1, 1, 2, 8, 8, 9]
                .iter()
                .map(|&v| ScalarValue::Int64(v))
                .collect();
            assert_eq!(args, expected);
        }

        #[test]
        fn test_nullable_column_binds_twice() {
            let spec = UniqueKeySpec::new(
                vec![
                    KeyColumn::new("id", ScalarKind::Int64, false),
                    KeyColumn::new("name", ScalarKind::Text, true),
                ],
                true,
            );
            let eq = build_equality_clause(&spec);
            let tuple = KeyTuple::new(vec![
                KeyValue {
                    column: "id".to_string(),
                    value: ScalarValue::Int64(7),
                },
                KeyValue {
                    column: "name".to_string(),
                    value: ScalarValue::Null,
                },
            ]);
            let args = sequence(&eq.slots, &tuple);
            assert_eq!(
                args,
                vec![ScalarValue::Int64(7), ScalarValue::Null, ScalarValue::Null]
            );
        }
    }
}
