//! Query planning for exports.
//!
//! Turns a (tables, columns, join conditions) request into a single SELECT
//! statement. Every identifier is checked against the schema catalog built by
//! the inspector before any statement text is composed.

mod identifier;
mod predicate;

pub use identifier::{is_plain_identifier, quote_identifier, ColumnRef, TableRef};
pub use predicate::Predicate;

use std::collections::HashSet;

use tracing::debug;

use crate::error::{GatewayError, Result};
use crate::schema::{SchemaCatalog, TableSchema};

/// Separator between per-edge join conditions in a request.
pub const PREDICATE_SEPARATOR: char = ';';

/// Tables to read plus one join condition per joined table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinSpec {
    anchor: TableRef,
    edges: Vec<(TableRef, String)>,
}

impl JoinSpec {
    /// A plain single-table read.
    pub fn single(table: TableRef) -> Self {
        Self {
            anchor: table,
            edges: Vec::new(),
        }
    }

    /// Joins every table after the first using its own condition.
    pub fn new(anchor: TableRef, edges: Vec<(TableRef, String)>) -> Self {
        Self { anchor, edges }
    }

    /// Builds a join spec from a table list and the raw `join_condition` field.
    ///
    /// The field holds either one condition, applied to every joined table, or
    /// exactly one condition per joined table separated by `;`.
    pub fn from_request(tables: Vec<TableRef>, join_condition: &str) -> Result<Self> {
        let mut tables = tables.into_iter();
        let anchor = tables
            .next()
            .ok_or_else(|| GatewayError::bad_request("at least one table is required"))?;
        let joined: Vec<TableRef> = tables.collect();

        let conditions: Vec<String> = join_condition
            .split(PREDICATE_SEPARATOR)
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string)
            .collect();

        if joined.is_empty() {
            if !conditions.is_empty() {
                debug!("Ignoring join condition for single-table export of {anchor}");
            }
            return Ok(Self::single(anchor));
        }

        let edges = match conditions.len() {
            0 => {
                return Err(GatewayError::bad_request(
                    "a join condition is required when exporting more than one table",
                ))
            }
            1 => joined
                .into_iter()
                .map(|t| (t, conditions[0].clone()))
                .collect(),
            n if n == joined.len() => joined.into_iter().zip(conditions).collect(),
            n if joined.len() == 1 => {
                return Err(GatewayError::bad_request(format!(
                    "expected 1 join condition, got {n}"
                )))
            }
            n => {
                return Err(GatewayError::bad_request(format!(
                    "expected 1 or {} join conditions, got {n}",
                    joined.len()
                )))
            }
        };

        Ok(Self { anchor, edges })
    }

    pub fn anchor(&self) -> &TableRef {
        &self.anchor
    }

    pub fn edges(&self) -> &[(TableRef, String)] {
        &self.edges
    }

    /// All tables in join order.
    pub fn tables(&self) -> Vec<TableRef> {
        std::iter::once(self.anchor.clone())
            .chain(self.edges.iter().map(|(t, _)| t.clone()))
            .collect()
    }

    pub fn is_join(&self) -> bool {
        !self.edges.is_empty()
    }
}

/// One `JOIN <table> ON <predicate>` clause.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinEdge {
    pub table: TableRef,
    pub predicate: Predicate,
}

/// An executable projection/join statement.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectPlan {
    anchor: TableRef,
    joins: Vec<JoinEdge>,
    columns: Vec<ColumnRef>,
    header: Vec<String>,
    sql: String,
}

impl SelectPlan {
    pub fn anchor(&self) -> &TableRef {
        &self.anchor
    }

    pub fn joins(&self) -> &[JoinEdge] {
        &self.joins
    }

    /// Resolved projection, in request order.
    pub fn columns(&self) -> &[ColumnRef] {
        &self.columns
    }

    /// Column names as requested; used as the export header.
    pub fn header(&self) -> &[String] {
        &self.header
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }
}

/// Splits a comma-separated column list, keeping order and duplicates.
pub fn parse_column_list(raw: &str) -> Result<Vec<String>> {
    let columns: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .collect();
    if columns.is_empty() {
        return Err(GatewayError::bad_request("at least one column is required"));
    }
    Ok(columns)
}

/// Plans a SELECT for `spec` projecting `columns`.
pub fn plan(catalog: &SchemaCatalog, spec: &JoinSpec, columns: &[String]) -> Result<SelectPlan> {
    if columns.is_empty() {
        return Err(GatewayError::bad_request("at least one column is required"));
    }

    let tables = spec.tables();
    let mut seen = HashSet::new();
    for table in &tables {
        if !seen.insert(table.to_string()) {
            return Err(GatewayError::bad_request(format!(
                "table '{table}' appears more than once; self joins are not supported"
            )));
        }
    }

    let scope: Vec<&TableSchema> = tables
        .iter()
        .map(|t| {
            catalog
                .table(t)
                .ok_or_else(|| GatewayError::internal(format!("table '{t}' was not described")))
        })
        .collect::<Result<_>>()?;

    let mut joins = Vec::with_capacity(spec.edges().len());
    for (i, (table, condition)) in spec.edges().iter().enumerate() {
        // A condition may only see the anchor, earlier joins and its own table.
        let predicate = Predicate::parse(condition, &scope[..i + 2])?;
        joins.push(JoinEdge {
            table: table.clone(),
            predicate,
        });
    }

    let resolved = columns
        .iter()
        .map(|raw| resolve_projection(&scope, spec.is_join(), raw))
        .collect::<Result<Vec<_>>>()?;

    let sql = render(spec.anchor(), &joins, &resolved);
    debug!("Planned export statement: {sql}");

    Ok(SelectPlan {
        anchor: spec.anchor().clone(),
        joins,
        columns: resolved,
        header: columns.to_vec(),
        sql,
    })
}

fn render(anchor: &TableRef, joins: &[JoinEdge], columns: &[ColumnRef]) -> String {
    let projection = columns
        .iter()
        .map(ColumnRef::quoted)
        .collect::<Vec<_>>()
        .join(", ");

    let mut sql = format!("SELECT {projection} FROM {}", anchor.quoted());
    for join in joins {
        sql.push_str(&format!(
            " JOIN {} ON {}",
            join.table.quoted(),
            join.predicate.to_sql()
        ));
    }
    sql
}

fn resolve_projection(scope: &[&TableSchema], is_join: bool, raw: &str) -> Result<ColumnRef> {
    if !is_join {
        let table = scope[0];
        // Whole name first, so column names containing '.' still resolve.
        if table.has_column(raw) {
            return Ok(ColumnRef::bare(raw));
        }
        if let Some((qualifier, column)) = raw.rsplit_once('.') {
            if table.table.matches_qualifier(qualifier) && table.has_column(column) {
                return Ok(ColumnRef::bare(column));
            }
        }
        return Err(GatewayError::schema(format!(
            "unknown column '{raw}' in table '{}'",
            table.table
        )));
    }

    // Longest matching qualifier wins, so `t.n.x` resolves to column `n.x`
    // of `t` when `t.n` is not a table.
    let splits: Vec<(&str, &str)> = raw
        .match_indices('.')
        .map(|(i, _)| (&raw[..i], &raw[i + 1..]))
        .collect();
    for &(qualifier, column) in splits.iter().rev() {
        if scope
            .iter()
            .any(|t| t.table.matches_qualifier(qualifier) && t.has_column(column))
        {
            let (table, column) = resolve_column(scope, Some(qualifier), column)?;
            return Ok(ColumnRef::qualified(table, column));
        }
    }
    if scope.iter().any(|t| t.has_column(raw)) {
        let (table, column) = resolve_column(scope, None, raw)?;
        return Ok(ColumnRef::qualified(table, column));
    }

    let (table, column) = match raw.rsplit_once('.') {
        Some((qualifier, column)) => resolve_column(scope, Some(qualifier), column)?,
        None => resolve_column(scope, None, raw)?,
    };
    Ok(ColumnRef::qualified(table, column))
}

/// Finds `column` among `scope`, optionally restricted to the table named by
/// `qualifier`. Unqualified names must belong to exactly one table.
pub(crate) fn resolve_column(
    scope: &[&TableSchema],
    qualifier: Option<&str>,
    column: &str,
) -> Result<(TableRef, String)> {
    match qualifier {
        Some(qualifier) => {
            let table = scope
                .iter()
                .find(|t| t.table.matches_qualifier(qualifier))
                .ok_or_else(|| {
                    GatewayError::schema(format!(
                        "unknown table '{qualifier}' (available: {})",
                        scope
                            .iter()
                            .map(|t| t.table.to_string())
                            .collect::<Vec<_>>()
                            .join(", ")
                    ))
                })?;
            if !table.has_column(column) {
                return Err(GatewayError::schema(format!(
                    "unknown column '{column}' in table '{}'",
                    table.table
                )));
            }
            Ok((table.table.clone(), column.to_string()))
        }
        None => {
            let owners: Vec<&&TableSchema> =
                scope.iter().filter(|t| t.has_column(column)).collect();
            match owners.as_slice() {
                [only] => Ok((only.table.clone(), column.to_string())),
                [] => Err(GatewayError::schema(format!("unknown column '{column}'"))),
                _ => Err(GatewayError::schema(format!(
                    "column '{column}' is ambiguous; qualify it with a table name"
                ))),
            }
        }
    }
}
