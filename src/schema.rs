//! Schema inspection.
//!
//! Describes tables through an open store connection. The resulting
//! [`SchemaCatalog`] is the identifier allow-list the planner and the import
//! pipeline validate against.

use tracing::debug;

use crate::error::Result;
use crate::planner::TableRef;
use crate::store::{ColumnInfo, StoreClient};

/// Columns of one table, in the store's native order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    pub table: TableRef,
    pub columns: Vec<ColumnInfo>,
}

impl TableSchema {
    pub fn new(table: TableRef, columns: Vec<ColumnInfo>) -> Self {
        Self { table, columns }
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    pub fn column(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }
}

/// Described tables, in request order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaCatalog {
    tables: Vec<TableSchema>,
}

impl SchemaCatalog {
    pub fn new(tables: Vec<TableSchema>) -> Self {
        Self { tables }
    }

    pub fn table(&self, table: &TableRef) -> Option<&TableSchema> {
        self.tables.iter().find(|t| &t.table == table)
    }

    pub fn tables(&self) -> &[TableSchema] {
        &self.tables
    }

    /// Every column as `table.column`, table by table.
    pub fn qualified_column_names(&self) -> Vec<String> {
        self.tables
            .iter()
            .flat_map(|t| {
                t.columns
                    .iter()
                    .map(move |c| format!("{}.{}", t.table, c.name))
            })
            .collect()
    }
}

/// Table names in the connection's database.
pub async fn list_tables(client: &dyn StoreClient) -> Result<Vec<String>> {
    let tables = client.list_tables().await?;
    debug!("Listed {} tables", tables.len());
    Ok(tables)
}

/// Describes one table.
pub async fn describe_table(client: &dyn StoreClient, table: &TableRef) -> Result<TableSchema> {
    let columns = client.describe_table(table).await?;
    debug!("Described {table}: {} columns", columns.len());
    Ok(TableSchema::new(table.clone(), columns))
}

/// Describes each table with one statement per table.
pub async fn describe_tables(client: &dyn StoreClient, tables: &[TableRef]) -> Result<SchemaCatalog> {
    let mut described = Vec::with_capacity(tables.len());
    for table in tables {
        if described.iter().any(|s: &TableSchema| &s.table == table) {
            continue;
        }
        described.push(describe_table(client, table).await?);
    }
    Ok(SchemaCatalog::new(described))
}
