//! Table and column identifiers.
//!
//! Names coming from requests are never trusted: table names must match a
//! strict identifier shape and are always rendered back-quoted.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{GatewayError, Result};

fn identifier_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("static regex"))
}

/// Returns true if `name` is a plain, unquoted identifier.
pub fn is_plain_identifier(name: &str) -> bool {
    identifier_re().is_match(name)
}

/// Renders `name` back-quoted with embedded back-quotes and backslashes escaped.
pub fn quote_identifier(name: &str) -> String {
    let mut quoted = String::with_capacity(name.len() + 2);
    quoted.push('`');
    for ch in name.chars() {
        if ch == '`' || ch == '\\' {
            quoted.push('\\');
        }
        quoted.push(ch);
    }
    quoted.push('`');
    quoted
}

/// A table name, optionally qualified with its database.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableRef {
    database: Option<String>,
    name: String,
}

impl TableRef {
    /// Parses `table` or `database.table`.
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(GatewayError::bad_request("table name must not be empty"));
        }

        let (database, name) = match raw.split_once('.') {
            Some((db, name)) => (Some(db), name),
            None => (None, raw),
        };

        for part in database.iter().chain(std::iter::once(&name)) {
            if !is_plain_identifier(part) {
                return Err(GatewayError::schema(format!(
                    "invalid table name '{raw}': only letters, digits and '_' are allowed"
                )));
            }
        }

        Ok(Self {
            database: database.map(str::to_string),
            name: name.to_string(),
        })
    }

    /// Parses a comma-separated table list, ignoring blank entries.
    pub fn parse_list(raw: &str) -> Result<Vec<Self>> {
        let tables = raw
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(Self::parse)
            .collect::<Result<Vec<_>>>()?;
        if tables.is_empty() {
            return Err(GatewayError::bad_request("at least one table is required"));
        }
        Ok(tables)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn database(&self) -> Option<&str> {
        self.database.as_deref()
    }

    /// Identifier parts, database first.
    pub fn parts(&self) -> Vec<&str> {
        self.database
            .as_deref()
            .into_iter()
            .chain(std::iter::once(self.name.as_str()))
            .collect()
    }

    /// Back-quoted form for statement text.
    pub fn quoted(&self) -> String {
        self.parts()
            .into_iter()
            .map(quote_identifier)
            .collect::<Vec<_>>()
            .join(".")
    }

    /// True if `qualifier` names this table, either fully or by bare name.
    pub fn matches_qualifier(&self, qualifier: &str) -> bool {
        qualifier == self.to_string() || qualifier == self.name
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.database {
            Some(db) => write!(f, "{db}.{}", self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

/// A column resolved against the schema catalog.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColumnRef {
    /// Owning table; `None` in single-table projections.
    pub table: Option<TableRef>,
    pub name: String,
}

impl ColumnRef {
    pub fn bare(name: impl Into<String>) -> Self {
        Self {
            table: None,
            name: name.into(),
        }
    }

    pub fn qualified(table: TableRef, name: impl Into<String>) -> Self {
        Self {
            table: Some(table),
            name: name.into(),
        }
    }

    /// Back-quoted form for statement text.
    pub fn quoted(&self) -> String {
        match &self.table {
            Some(table) => format!("{}.{}", table.quoted(), quote_identifier(&self.name)),
            None => quote_identifier(&self.name),
        }
    }
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.table {
            Some(table) => write!(f, "{table}.{}", self.name),
            None => write!(f, "{}", self.name),
        }
    }
}
