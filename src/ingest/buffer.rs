//! In-memory tabular data shared by the export and import paths.

use crate::error::{GatewayError, Result};
use crate::store::{ResultSet, Row};

/// Named columns plus rows aligned positionally with them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TabularBuffer {
    columns: Vec<String>,
    rows: Vec<Row>,
}

impl TabularBuffer {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Wraps a result set under `header`, which must match its width.
    pub fn from_result(header: &[String], result: ResultSet) -> Result<Self> {
        let mut buffer = Self::new(header.to_vec());
        buffer.rows.reserve(result.rows.len());
        for row in result.rows {
            buffer.push_row(row).map_err(|e| {
                GatewayError::execution(format!("result does not match projection: {e}"))
            })?;
        }
        Ok(buffer)
    }

    /// Appends a row; its width must equal the column count.
    pub fn push_row(&mut self, row: Row) -> Result<()> {
        if row.len() != self.columns.len() {
            return Err(GatewayError::parse_failed(format!(
                "row {} has {} fields, expected {}",
                self.rows.len() + 1,
                row.len(),
                self.columns.len()
            )));
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Number of data rows, header excluded.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
