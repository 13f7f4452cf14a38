//! Statement and table introspection.
//!
//! Two jobs: pull the target table and WHERE clause out of the user's UPDATE
//! or DELETE statement, and pull candidate unique keys out of the table's
//! `SHOW CREATE TABLE` output. Both go through sqlparser with the MySQL
//! dialect so quoting and comments are handled properly.

use chunkflow_core::{KeyColumn, ScalarKind, UniqueKeySpec};
use sqlparser::ast::{
    ColumnDef, ColumnOption, CreateTable, FromTable, ObjectName, Statement, TableConstraint,
    TableFactor, TableWithJoins,
};
use sqlparser::dialect::MySqlDialect;
use sqlparser::parser::Parser;
use tracing::debug;

use crate::error::EngineError;

/// What kind of DML a run executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    /// An UPDATE statement.
    Update,
    /// A DELETE statement.
    Delete,
}

/// The chunkable parts of the user's statement.
#[derive(Debug, Clone)]
pub struct StatementInfo {
    /// UPDATE or DELETE.
    pub kind: StatementKind,
    /// Target table name, unquoted.
    pub table: String,
    /// The user's WHERE clause, rendered back to SQL, if present.
    pub origin_where: Option<String>,
    /// The normalized statement up to and including the WHERE clause, ready
    /// for a chunk predicate to be appended.
    pub base_sql: String,
}

fn parse_one(sql: &str) -> Result<Statement, EngineError> {
    let mut statements =
        Parser::parse_sql(&MySqlDialect {}, sql).map_err(|e| EngineError::Introspection {
            msg: format!("cannot parse statement: {}", e),
        })?;
    if statements.len() != 1 {
        return Err(EngineError::Introspection {
            msg: format!("expected exactly one statement, found {}", statements.len()),
        });
    }
    Ok(statements.remove(0))
}

fn table_name(relation: &TableWithJoins) -> Result<String, EngineError> {
    if !relation.joins.is_empty() {
        return Err(EngineError::Introspection {
            msg: "joins are not supported in chunked statements".to_string(),
        });
    }
    let TableFactor::Table { name, .. } = &relation.relation else {
        return Err(EngineError::Introspection {
            msg: "target must be a plain table".to_string(),
        });
    };
    object_tail(name)
}

fn object_tail(name: &ObjectName) -> Result<String, EngineError> {
    name.0
        .last()
        .map(|ident| ident.value.clone())
        .ok_or_else(|| EngineError::Introspection {
            msg: "statement has no table name".to_string(),
        })
}

fn where_text(selection: Option<&sqlparser::ast::Expr>) -> String {
    match selection {
        Some(expr) => format!("({})", expr),
        None => "1 = 1".to_string(),
    }
}

/// Parses the user's UPDATE or DELETE and rebuilds its chunkable base form.
///
/// A statement without a WHERE clause gets the always-true `1 = 1` so chunk
/// predicates can be appended uniformly.
pub fn inspect_dml(sql: &str) -> Result<StatementInfo, EngineError> {
    match parse_one(sql)? {
        Statement::Delete(delete) => {
            let tables = match &delete.from {
                FromTable::WithFromKeyword(tables) | FromTable::WithoutKeyword(tables) => tables,
            };
            if tables.len() != 1 {
                return Err(EngineError::Introspection {
                    msg: "DELETE must target exactly one table".to_string(),
                });
            }
            let table = table_name(&tables[0])?;
            let origin_where = delete.selection.as_ref().map(|e| e.to_string());
            let base_sql = format!(
                "DELETE FROM `{}` WHERE {}",
                table,
                where_text(delete.selection.as_ref())
            );
            Ok(StatementInfo {
                kind: StatementKind::Delete,
                table,
                origin_where,
                base_sql,
            })
        }
        Statement::Update {
            table,
            assignments,
            from,
            selection,
            ..
        } => {
            if from.is_some() {
                return Err(EngineError::Introspection {
                    msg: "UPDATE ... FROM is not supported".to_string(),
                });
            }
            let table = table_name(&table)?;
            let sets = assignments
                .iter()
                .map(|a| a.to_string())
                .collect::<Vec<_>>()
                .join(", ");
            let origin_where = selection.as_ref().map(|e| e.to_string());
            let base_sql = format!(
                "UPDATE `{}` SET {} WHERE {}",
                table,
                sets,
                where_text(selection.as_ref())
            );
            Ok(StatementInfo {
                kind: StatementKind::Update,
                table,
                origin_where,
                base_sql,
            })
        }
        other => Err(EngineError::Introspection {
            msg: format!("only UPDATE and DELETE can be chunked, got {}", kind_of(&other)),
        }),
    }
}

fn kind_of(statement: &Statement) -> &'static str {
    match statement {
        Statement::Query(_) => "SELECT",
        Statement::Insert(_) => "INSERT",
        _ => "another statement kind",
    }
}

/// Maps a rendered column type to the scalar kind used for key values.
///
/// Classifying on the rendered name keeps this stable across sqlparser's
/// `DataType` variants. Temporal types ride through as text; MySQL compares
/// and binds their string form correctly.
fn scalar_kind(column: &ColumnDef) -> Option<ScalarKind> {
    let rendered = column.data_type.to_string().to_uppercase();
    let name = rendered.split('(').next().unwrap_or(&rendered).trim();
    if name.starts_with("BIGINT") {
        if rendered.contains("UNSIGNED") {
            return Some(ScalarKind::UInt64);
        }
        return Some(ScalarKind::Int64);
    }
    if name.contains("INT") {
        return Some(ScalarKind::Int64);
    }
    if name.starts_with("FLOAT") || name.starts_with("DOUBLE") || name.starts_with("REAL") {
        return Some(ScalarKind::Float64);
    }
    if name.contains("CHAR")
        || name.contains("TEXT")
        || name.starts_with("DATE")
        || name.starts_with("TIME")
        || name.starts_with("ENUM")
    {
        return Some(ScalarKind::Text);
    }
    None
}

struct ColumnMeta {
    kind: Option<ScalarKind>,
    nullable: bool,
}

fn key_columns(
    names: &[String],
    meta: &[(String, ColumnMeta)],
    primary: bool,
) -> Option<Vec<KeyColumn>> {
    let mut columns = Vec::with_capacity(names.len());
    for name in names {
        let (_, m) = meta.iter().find(|(n, _)| n == name)?;
        let kind = match m.kind {
            Some(kind) => kind,
            None => {
                debug!(column = %name, "key column has an unsupported type, skipping key");
                return None;
            }
        };
        // primary key columns are implicitly NOT NULL
        let nullable = m.nullable && !primary;
        columns.push(KeyColumn::new(name, kind, nullable));
    }
    Some(columns)
}

/// Extracts the candidate unique keys from `SHOW CREATE TABLE` output.
///
/// Candidates appear in declaration order, primary key included. A key whose
/// columns include an unsupported type is dropped rather than failing the
/// run, since another key may still be usable.
pub fn candidate_keys(create_sql: &str) -> Result<Vec<UniqueKeySpec>, EngineError> {
    let Statement::CreateTable(CreateTable {
        columns,
        constraints,
        ..
    }) = parse_one(create_sql)?
    else {
        return Err(EngineError::Introspection {
            msg: "expected a CREATE TABLE statement".to_string(),
        });
    };

    let meta: Vec<(String, ColumnMeta)> = columns
        .iter()
        .map(|c| {
            let nullable = !c
                .options
                .iter()
                .any(|o| matches!(o.option, ColumnOption::NotNull));
            (
                c.name.value.clone(),
                ColumnMeta {
                    kind: scalar_kind(c),
                    nullable,
                },
            )
        })
        .collect();

    let mut candidates = Vec::new();
    for constraint in &constraints {
        let (names, primary) = match constraint {
            TableConstraint::PrimaryKey { columns, .. } => {
                (columns.iter().map(|i| i.value.clone()).collect::<Vec<_>>(), true)
            }
            TableConstraint::Unique { columns, .. } => {
                (columns.iter().map(|i| i.value.clone()).collect::<Vec<_>>(), false)
            }
            _ => continue,
        };
        if let Some(columns) = key_columns(&names, &meta, primary) {
            candidates.push(UniqueKeySpec { columns, primary });
        }
    }

    // inline single-column PRIMARY KEY / UNIQUE markers
    for column in &columns {
        for option in &column.options {
            let ColumnOption::Unique { is_primary, .. } = &option.option else {
                continue;
            };
            let names = vec![column.name.value.clone()];
            if let Some(columns) = key_columns(&names, &meta, *is_primary) {
                candidates.push(UniqueKeySpec {
                    columns,
                    primary: *is_primary,
                });
            }
        }
    }

    Ok(candidates)
}
