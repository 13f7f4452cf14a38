//! Keyset pagination predicate builder.
//!
//! Expands a composite tuple comparison `(k1..kn) CMP (v1..vn)` into the
//! pt-archiver OR-branch form that stays index-friendly: branch `i`
//! conjuncts equality on the first `i` key columns with a comparison on
//! column `i`; every branch but the last compares strictly, the last uses
//! the requested comparator. Nullable columns expand three ways per
//! comparator under NULL-as-ordering-minimum semantics.
//!
//! Alongside the text, each clause carries its placeholder slot list:
//! `slots[p]` is the key-column index bound by the `p`-th `?` in the text.
//! That list is the binding contract [`crate::args`] consumes; the text is
//! never re-parsed to recover argument order.

use crate::keyspec::UniqueKeySpec;

/// The four range comparators a keyset walk needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Comparator {
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
}

impl Comparator {
    /// SQL symbol of this comparator.
    pub fn symbol(self) -> &'static str {
        match self {
            Comparator::Lt => "<",
            Comparator::Le => "<=",
            Comparator::Gt => ">",
            Comparator::Ge => ">=",
        }
    }

    /// The strict form (`<=` becomes `<`, `>=` becomes `>`).
    pub fn strict_symbol(self) -> &'static str {
        match self {
            Comparator::Lt | Comparator::Le => "<",
            Comparator::Gt | Comparator::Ge => ">",
        }
    }

    fn inclusive(self) -> bool {
        matches!(self, Comparator::Le | Comparator::Ge)
    }

    fn ascending(self) -> bool {
        matches!(self, Comparator::Gt | Comparator::Ge)
    }
}

/// A generated predicate plus its placeholder binding contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeysetClause {
    /// Parenthesized boolean expression with `?` placeholders.
    pub text: String,
    /// Key-column index bound by each placeholder, in text order.
    pub slots: Vec<usize>,
}

/// The range predicates for all four comparators over one key spec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeClauses {
    /// `<` predicate.
    pub lt: KeysetClause,
    /// `<=` predicate.
    pub le: KeysetClause,
    /// `>` predicate.
    pub gt: KeysetClause,
    /// `>=` predicate.
    pub ge: KeysetClause,
}

impl RangeClauses {
    /// Clause for one comparator.
    pub fn get(&self, cmp: Comparator) -> &KeysetClause {
        match cmp {
            Comparator::Lt => &self.lt,
            Comparator::Le => &self.le,
            Comparator::Gt => &self.gt,
            Comparator::Ge => &self.ge,
        }
    }
}

/// Build the four range predicates for a key spec.
///
/// An empty key spec is a caller programming error; the result would be
/// the degenerate `()` predicate and is never constructed by the runtime.
pub fn build_range_clauses(spec: &UniqueKeySpec) -> RangeClauses {
    RangeClauses {
        lt: build_range_clause(spec, Comparator::Lt),
        le: build_range_clause(spec, Comparator::Le),
        gt: build_range_clause(spec, Comparator::Gt),
        ge: build_range_clause(spec, Comparator::Ge),
    }
}

fn build_range_clause(spec: &UniqueKeySpec, cmp: Comparator) -> KeysetClause {
    let n = spec.len();
    let mut branches: Vec<String> = Vec::new();
    let mut slots: Vec<usize> = Vec::new();

    for i in 0..n {
        let mut conjuncts: Vec<String> = Vec::new();
        let mut branch_slots: Vec<usize> = Vec::new();
        for j in 0..i {
            let (text, extra) = equality_conjunct(spec, j);
            conjuncts.push(text);
            branch_slots.extend(extra);
        }

        let column = &spec.columns[i];
        let key = format!("`{}`", column.name);
        let is_end = i == n - 1;

        if column.nullable {
            if cmp.inclusive() && is_end {
                conjuncts.push(format!("(? IS NULL OR {key} {} ?)", cmp.symbol()));
                branch_slots.extend([i, i]);
            } else if cmp.ascending() {
                conjuncts.push(format!(
                    "((? IS NULL AND {key} IS NOT NULL) OR ({key} {} ?))",
                    cmp.strict_symbol()
                ));
                branch_slots.extend([i, i]);
            } else {
                // Descending direction with NULL ordered below every value:
                // the null-capturing disjunct stands as its own OR-branch,
                // ahead of the equality-prefix branch.
                branches.push(format!(
                    "((? IS NOT NULL AND {key} IS NULL) OR ({key} {} ?))",
                    cmp.strict_symbol()
                ));
                slots.extend([i, i]);
            }
        } else if cmp.inclusive() && is_end {
            conjuncts.push(format!("{key} {} ?", cmp.symbol()));
            branch_slots.push(i);
        } else {
            conjuncts.push(format!("{key} {} ?", cmp.strict_symbol()));
            branch_slots.push(i);
        }

        if !conjuncts.is_empty() {
            branches.push(format!("({})", conjuncts.join(" AND ")));
            slots.extend(branch_slots);
        }
    }

    KeysetClause {
        text: format!("({})", branches.join(" OR ")),
        slots,
    }
}

/// Build the pure AND-of-equalities predicate used when the chunk size
/// is 1 (one statement per key tuple).
pub fn build_equality_clause(spec: &UniqueKeySpec) -> KeysetClause {
    let mut conjuncts: Vec<String> = Vec::new();
    let mut slots: Vec<usize> = Vec::new();
    for (j, _) in spec.columns.iter().enumerate() {
        let (text, extra) = equality_conjunct(spec, j);
        conjuncts.push(text);
        slots.extend(extra);
    }
    KeysetClause {
        text: format!("({})", conjuncts.join(" AND ")),
        slots,
    }
}

fn equality_conjunct(spec: &UniqueKeySpec, j: usize) -> (String, Vec<usize>) {
    let column = &spec.columns[j];
    let key = format!("`{}`", column.name);
    if column.nullable {
        (
            format!("((? IS NULL AND {key} IS NULL) OR ({key} = ?))"),
            vec![j, j],
        )
    } else {
        (format!("{key} = ?"), vec![j])
    }
}
