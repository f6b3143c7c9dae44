//! Result set types.
//!
//! Defines the structures used to represent rows exchanged with the store.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Represents the result of executing a statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    /// Column metadata, in server order.
    pub columns: Vec<ColumnInfo>,

    /// Rows of data.
    pub rows: Vec<Row>,

    /// Time taken to execute the statement.
    pub execution_time: Duration,
}

impl ResultSet {
    /// Creates a result set with the given columns and rows.
    pub fn with_data(columns: Vec<ColumnInfo>, rows: Vec<Row>) -> Self {
        Self {
            columns,
            rows,
            execution_time: Duration::ZERO,
        }
    }

    /// Sets the execution time.
    pub fn with_execution_time(mut self, duration: Duration) -> Self {
        self.execution_time = duration;
        self
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Returns true if the result set is empty.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Metadata about a column.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    /// Column name.
    pub name: String,

    /// Store data type, e.g. `UInt64` or `Nullable(String)`.
    pub data_type: String,
}

impl ColumnInfo {
    /// Creates a new column info with the given name and type.
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
        }
    }

    /// True for `Nullable(..)` columns.
    pub fn is_nullable(&self) -> bool {
        self.data_type.starts_with("Nullable(")
    }

    /// Type name with `Nullable(..)` / `LowCardinality(..)` wrappers removed.
    pub fn base_type(&self) -> &str {
        let mut ty = self.data_type.as_str();
        for wrapper in ["LowCardinality(", "Nullable("] {
            if let Some(inner) = ty.strip_prefix(wrapper).and_then(|t| t.strip_suffix(')')) {
                ty = inner;
            }
        }
        ty
    }
}

/// A row of data, aligned positionally with its columns.
pub type Row = Vec<Value>;

/// Represents a single cell value.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub enum Value {
    /// NULL value.
    #[default]
    Null,

    /// Boolean value.
    Bool(bool),

    /// Signed integer (up to i64).
    Int(i64),

    /// Floating point number.
    Float(f64),

    /// Text value; also carries dates, decimals and anything without a
    /// lossless numeric form.
    String(String),
}

impl Value {
    /// Returns true if this value is NULL.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Field text for a delimited file; `None` for NULL.
    pub fn to_field(&self) -> Option<String> {
        match self {
            Value::Null => None,
            Value::Bool(b) => Some(b.to_string()),
            Value::Int(i) => Some(i.to_string()),
            Value::Float(f) => Some(f.to_string()),
            Value::String(s) => Some(s.clone()),
        }
    }

    /// Converts a JSON cell from the store's JSON output formats.
    pub fn from_json(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else if n.is_u64() {
                    // Above i64::MAX: keep the exact digits.
                    Value::String(n.to_string())
                } else {
                    n.as_f64().map(Value::Float).unwrap_or(Value::Null)
                }
            }
            serde_json::Value::String(s) => Value::String(s),
            other => Value::String(other.to_string()),
        }
    }

    /// Parses field text into the value a column of `column` type would hold.
    ///
    /// Missing fields become NULL for nullable columns and the type's default
    /// otherwise, mirroring how the store treats empty CSV fields.
    pub fn coerce(field: Option<&str>, column: &ColumnInfo) -> Result<Self, String> {
        let base = column.base_type();
        let Some(text) = field else {
            if column.is_nullable() {
                return Ok(Value::Null);
            }
            return Ok(type_default(base));
        };

        if is_integer_type(base) {
            text.trim()
                .parse::<i64>()
                .map(Value::Int)
                .map_err(|_| format!("cannot parse '{text}' as {base} for column '{}'", column.name))
        } else if base.starts_with("Float") {
            text.trim()
                .parse::<f64>()
                .map(Value::Float)
                .map_err(|_| format!("cannot parse '{text}' as {base} for column '{}'", column.name))
        } else if base == "Bool" {
            match text.trim() {
                "true" | "1" => Ok(Value::Bool(true)),
                "false" | "0" => Ok(Value::Bool(false)),
                _ => Err(format!(
                    "cannot parse '{text}' as Bool for column '{}'",
                    column.name
                )),
            }
        } else {
            Ok(Value::String(text.to_string()))
        }
    }
}

fn is_integer_type(base: &str) -> bool {
    matches!(
        base,
        "Int8" | "Int16" | "Int32" | "Int64" | "UInt8" | "UInt16" | "UInt32" | "UInt64"
    )
}

fn type_default(base: &str) -> Value {
    if is_integer_type(base) {
        Value::Int(0)
    } else if base.starts_with("Float") {
        Value::Float(0.0)
    } else if base == "Bool" {
        Value::Bool(false)
    } else {
        Value::String(String::new())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_field() {
            Some(text) => write!(f, "{text}"),
            None => write!(f, "NULL"),
        }
    }
}

// Conversion implementations for common types
impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl<T> From<Option<T>> for Value
where
    T: Into<Value>,
{
    fn from(v: Option<T>) -> Self {
        match v {
            Some(val) => val.into(),
            None => Value::Null,
        }
    }
}
