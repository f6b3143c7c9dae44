//! In-memory store for tests.
//!
//! Holds typed tables, evaluates planned selects (including inner joins on
//! validated predicates) and can inject latency, unreachable hosts, wrong
//! passwords and failing insert batches.

use std::cmp::Ordering;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use sqlparser::ast::{BinaryOperator, Expr, UnaryOperator, Value as SqlValue};

use super::{ColumnInfo, ResultSet, Row, StoreClient, StoreConnector, Value};
use crate::config::ConnectionParams;
use crate::error::{GatewayError, Result};
use crate::planner::{ColumnRef, SelectPlan, TableRef};

#[derive(Debug, Clone)]
struct MockTable {
    name: String,
    columns: Vec<ColumnInfo>,
    rows: Vec<Row>,
}

impl MockTable {
    fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }
}

#[derive(Debug, Default)]
struct MockState {
    tables: Vec<MockTable>,
    statements: Vec<String>,
    insert_batches: usize,
    fail_on_batch: Option<usize>,
}

impl MockState {
    fn table(&self, table: &TableRef) -> Result<&MockTable> {
        let key = table.to_string();
        self.tables
            .iter()
            .find(|t| t.name == key)
            .or_else(|| self.tables.iter().find(|t| t.name == table.name()))
            .ok_or_else(|| GatewayError::schema(format!("Table {key} doesn't exist")))
    }

    fn table_mut(&mut self, table: &TableRef) -> Result<&mut MockTable> {
        let key = table.to_string();
        let index = self
            .tables
            .iter()
            .position(|t| t.name == key)
            .or_else(|| self.tables.iter().position(|t| t.name == table.name()))
            .ok_or_else(|| GatewayError::schema(format!("Table {key} doesn't exist")))?;
        Ok(&mut self.tables[index])
    }
}

/// A shared in-memory database.
#[derive(Debug, Clone, Default)]
pub struct MockStore {
    state: Arc<Mutex<MockState>>,
    latency: Option<Duration>,
}

impl MockStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a table with `(name, type)` columns and initial rows.
    pub fn with_table(self, name: &str, columns: &[(&str, &str)], rows: Vec<Row>) -> Self {
        self.create_table(name, columns, rows);
        self
    }

    /// Delays every data operation by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Makes the `n`th insert batch (1-based, counted across the store) fail.
    pub fn fail_on_insert_batch(self, n: usize) -> Self {
        self.state().fail_on_batch = Some(n);
        self
    }

    /// Adds or replaces a table.
    pub fn create_table(&self, name: &str, columns: &[(&str, &str)], rows: Vec<Row>) {
        let table = MockTable {
            name: name.to_string(),
            columns: columns
                .iter()
                .map(|(n, t)| ColumnInfo::new(*n, *t))
                .collect(),
            rows,
        };
        let mut state = self.state();
        state.tables.retain(|t| t.name != name);
        state.tables.push(table);
    }

    /// Current rows of `table`, empty if it does not exist.
    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.state()
            .tables
            .iter()
            .find(|t| t.name == table)
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    /// Statements issued so far, in order.
    pub fn statements(&self) -> Vec<String> {
        self.state().statements.clone()
    }

    /// Number of insert round-trips attempted.
    pub fn insert_batches(&self) -> usize {
        self.state().insert_batches
    }

    /// A client bound to this store.
    pub fn client(&self) -> MockClient {
        MockClient {
            store: self.clone(),
            live: None,
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn delay(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

/// Client handed out by [`MockStore`] and [`MockConnector`].
#[derive(Debug)]
pub struct MockClient {
    store: MockStore,
    live: Option<Arc<AtomicUsize>>,
}

impl Drop for MockClient {
    fn drop(&mut self) {
        if let Some(live) = &self.live {
            live.fetch_sub(1, AtomicOrdering::SeqCst);
        }
    }
}

#[async_trait]
impl StoreClient for MockClient {
    async fn list_tables(&self) -> Result<Vec<String>> {
        self.store.delay().await;
        let mut state = self.store.state();
        state.statements.push("SHOW TABLES".to_string());
        let mut names: Vec<String> = state.tables.iter().map(|t| t.name.clone()).collect();
        names.sort();
        Ok(names)
    }

    async fn describe_table(&self, table: &TableRef) -> Result<Vec<ColumnInfo>> {
        self.store.delay().await;
        let mut state = self.store.state();
        state
            .statements
            .push(format!("DESCRIBE TABLE {}", table.quoted()));
        Ok(state.table(table)?.columns.clone())
    }

    async fn select(&self, plan: &SelectPlan) -> Result<ResultSet> {
        self.store.delay().await;
        let mut state = self.store.state();
        state.statements.push(plan.sql().to_string());

        let anchor = state.table(plan.anchor())?;
        let mut bound: Vec<(TableRef, &MockTable)> = vec![(plan.anchor().clone(), anchor)];
        let mut rows: Vec<Row> = anchor.rows.clone();

        for join in plan.joins() {
            let right = state.table(&join.table)?;
            bound.push((join.table.clone(), right));

            let mut joined = Vec::new();
            for left in &rows {
                for candidate in &right.rows {
                    let mut combined = left.clone();
                    combined.extend(candidate.iter().cloned());
                    if truthy(&eval(join.predicate.expr(), &bound, &combined)?) {
                        joined.push(combined);
                    }
                }
            }
            rows = joined;
        }

        let mut columns = Vec::with_capacity(plan.columns().len());
        let mut positions = Vec::with_capacity(plan.columns().len());
        for column in plan.columns() {
            let (position, info) = locate(&bound, column)?;
            columns.push(ColumnInfo::new(column.to_string(), info.data_type.clone()));
            positions.push(position);
        }

        let rows = rows
            .into_iter()
            .map(|row| positions.iter().map(|&p| row[p].clone()).collect())
            .collect();

        Ok(ResultSet::with_data(columns, rows))
    }

    async fn insert_batch(
        &self,
        table: &TableRef,
        columns: &[String],
        rows: &[Row],
    ) -> Result<u64> {
        self.store.delay().await;
        let mut state = self.store.state();
        state.statements.push(format!(
            "INSERT INTO {} ({}) FORMAT CSV",
            table.quoted(),
            columns.join(", ")
        ));
        state.insert_batches += 1;
        if state.fail_on_batch == Some(state.insert_batches) {
            return Err(GatewayError::execution(format!(
                "insert batch {} rejected",
                state.insert_batches
            )));
        }

        let target = state.table_mut(table)?;
        let mut mapping = Vec::with_capacity(columns.len());
        for name in columns {
            let index = target.column_index(name).ok_or_else(|| {
                GatewayError::schema(format!(
                    "No such column {name} in table {}",
                    target.name
                ))
            })?;
            mapping.push(index);
        }

        // Build the whole batch first so a bad value rejects it atomically.
        let mut staged = Vec::with_capacity(rows.len());
        for row in rows {
            let mut full: Row = Vec::with_capacity(target.columns.len());
            for (index, column) in target.columns.iter().enumerate() {
                let supplied = mapping
                    .iter()
                    .position(|&m| m == index)
                    .and_then(|i| row.get(i));
                let value = match supplied {
                    None | Some(Value::Null) => Value::coerce(None, column),
                    Some(Value::String(text)) => Value::coerce(Some(text), column),
                    Some(other) => Ok(other.clone()),
                }
                .map_err(GatewayError::execution)?;
                full.push(value);
            }
            staged.push(full);
        }

        target.rows.extend(staged);
        Ok(rows.len() as u64)
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Connector that hands out [`MockClient`]s over one shared store.
#[derive(Debug, Clone)]
pub struct MockConnector {
    store: MockStore,
    password: Option<String>,
    unreachable: bool,
    opened: Arc<AtomicUsize>,
    live: Arc<AtomicUsize>,
}

impl MockConnector {
    pub fn new(store: MockStore) -> Self {
        Self {
            store,
            password: None,
            unreachable: false,
            opened: Arc::new(AtomicUsize::new(0)),
            live: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Only accept this password.
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Fail every open as if the host were down.
    pub fn unreachable(mut self) -> Self {
        self.unreachable = true;
        self
    }

    pub fn store(&self) -> &MockStore {
        &self.store
    }

    /// Total connections opened.
    pub fn opened(&self) -> usize {
        self.opened.load(AtomicOrdering::SeqCst)
    }

    /// Connections opened and not yet released.
    pub fn open_sessions(&self) -> usize {
        self.live.load(AtomicOrdering::SeqCst)
    }
}

#[async_trait]
impl StoreConnector for MockConnector {
    async fn open(
        &self,
        params: &ConnectionParams,
        password: &str,
    ) -> Result<Box<dyn StoreClient>> {
        if self.unreachable {
            return Err(GatewayError::unreachable(format!(
                "Cannot connect to {}:{}",
                params.host, params.port
            )));
        }
        if let Some(expected) = &self.password {
            if expected != password {
                return Err(GatewayError::auth_rejected(format!(
                    "{}: Authentication failed: password is incorrect",
                    params.user
                )));
            }
        }

        self.opened.fetch_add(1, AtomicOrdering::SeqCst);
        self.live.fetch_add(1, AtomicOrdering::SeqCst);
        Ok(Box::new(MockClient {
            store: self.store.clone(),
            live: Some(self.live.clone()),
        }))
    }
}

/// Finds the position of `column` in a joined row and its metadata.
fn locate<'a>(
    bound: &[(TableRef, &'a MockTable)],
    column: &ColumnRef,
) -> Result<(usize, &'a ColumnInfo)> {
    let mut offset = 0;
    for (table, data) in bound {
        let owns = match &column.table {
            Some(qualifier) => qualifier == table,
            None => offset == 0,
        };
        if owns {
            if let Some(index) = data.column_index(&column.name) {
                return Ok((offset + index, &data.columns[index]));
            }
        }
        offset += data.columns.len();
    }
    Err(GatewayError::schema(format!("Missing column {column}")))
}

fn lookup(bound: &[(TableRef, &MockTable)], parts: &[&str], row: &Row) -> Result<Value> {
    let Some((column, qualifier)) = parts.split_last() else {
        return Err(GatewayError::schema("empty identifier"));
    };
    let qualifier = qualifier.join(".");
    let mut offset = 0;
    for (table, data) in bound {
        if qualifier.is_empty() || table.matches_qualifier(&qualifier) {
            if let Some(index) = data.column_index(column) {
                return Ok(row[offset + index].clone());
            }
        }
        offset += data.columns.len();
    }
    Err(GatewayError::schema(format!(
        "Missing column {}",
        parts.join(".")
    )))
}

fn eval(expr: &Expr, bound: &[(TableRef, &MockTable)], row: &Row) -> Result<Value> {
    match expr {
        Expr::Identifier(ident) => lookup(bound, &[ident.value.as_str()], row),
        Expr::CompoundIdentifier(parts) => {
            let parts: Vec<&str> = parts.iter().map(|p| p.value.as_str()).collect();
            lookup(bound, &parts, row)
        }
        Expr::Value(value) => Ok(match value {
            SqlValue::Number(n, _) => n
                .parse::<i64>()
                .map(Value::Int)
                .or_else(|_| n.parse::<f64>().map(Value::Float))
                .unwrap_or(Value::Null),
            SqlValue::SingleQuotedString(s) => Value::String(s.clone()),
            SqlValue::Boolean(b) => Value::Bool(*b),
            _ => Value::Null,
        }),
        Expr::Nested(inner) => eval(inner, bound, row),
        Expr::IsNull(inner) => Ok(Value::Bool(eval(inner, bound, row)?.is_null())),
        Expr::IsNotNull(inner) => Ok(Value::Bool(!eval(inner, bound, row)?.is_null())),
        Expr::UnaryOp { op, expr } => {
            let value = eval(expr, bound, row)?;
            Ok(match (op, value) {
                (_, Value::Null) => Value::Null,
                (UnaryOperator::Not, v) => Value::Bool(!truthy(&v)),
                (UnaryOperator::Minus, Value::Int(i)) => Value::Int(-i),
                (UnaryOperator::Minus, Value::Float(f)) => Value::Float(-f),
                (_, v) => v,
            })
        }
        Expr::BinaryOp { left, op, right } => {
            let l = eval(left, bound, row)?;
            let r = eval(right, bound, row)?;
            Ok(binary(op, &l, &r))
        }
        other => Err(GatewayError::execution(format!(
            "mock store cannot evaluate {other}"
        ))),
    }
}

fn binary(op: &BinaryOperator, l: &Value, r: &Value) -> Value {
    match op {
        BinaryOperator::And => match (l, r) {
            (Value::Null, _) | (_, Value::Null) => Value::Null,
            _ => Value::Bool(truthy(l) && truthy(r)),
        },
        BinaryOperator::Or => Value::Bool(truthy(l) || truthy(r)),
        _ if l.is_null() || r.is_null() => Value::Null,
        BinaryOperator::Eq => Value::Bool(compare(l, r) == Some(Ordering::Equal)),
        BinaryOperator::NotEq => Value::Bool(compare(l, r) != Some(Ordering::Equal)),
        BinaryOperator::Lt => Value::Bool(compare(l, r) == Some(Ordering::Less)),
        BinaryOperator::LtEq => Value::Bool(matches!(
            compare(l, r),
            Some(Ordering::Less | Ordering::Equal)
        )),
        BinaryOperator::Gt => Value::Bool(compare(l, r) == Some(Ordering::Greater)),
        BinaryOperator::GtEq => Value::Bool(matches!(
            compare(l, r),
            Some(Ordering::Greater | Ordering::Equal)
        )),
        _ => arithmetic(op, l, r),
    }
}

fn arithmetic(op: &BinaryOperator, l: &Value, r: &Value) -> Value {
    if let (Value::Int(a), Value::Int(b)) = (l, r) {
        return match op {
            BinaryOperator::Plus => Value::Int(a.wrapping_add(*b)),
            BinaryOperator::Minus => Value::Int(a.wrapping_sub(*b)),
            BinaryOperator::Multiply => Value::Int(a.wrapping_mul(*b)),
            BinaryOperator::Divide if *b != 0 => Value::Float(*a as f64 / *b as f64),
            BinaryOperator::Modulo if *b != 0 => Value::Int(a % b),
            _ => Value::Null,
        };
    }
    match (as_f64(l), as_f64(r)) {
        (Some(a), Some(b)) => match op {
            BinaryOperator::Plus => Value::Float(a + b),
            BinaryOperator::Minus => Value::Float(a - b),
            BinaryOperator::Multiply => Value::Float(a * b),
            BinaryOperator::Divide => Value::Float(a / b),
            BinaryOperator::Modulo => Value::Float(a % b),
            _ => Value::Null,
        },
        _ => Value::Null,
    }
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Int(i) => Some(*i as f64),
        Value::Float(f) => Some(*f),
        _ => None,
    }
}

fn compare(l: &Value, r: &Value) -> Option<Ordering> {
    match (l, r) {
        (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        _ => match (as_f64(l), as_f64(r)) {
            (Some(a), Some(b)) => a.partial_cmp(&b),
            _ => Some(l.to_string().cmp(&r.to_string())),
        },
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Int(i) => *i != 0,
        Value::Float(f) => *f != 0.0,
        Value::Null => false,
        Value::String(s) => !s.is_empty(),
    }
}
