//! Import pipeline: insert a parsed file into a table in bounded batches.

use tracing::{debug, info, warn};

use super::TabularBuffer;
use crate::error::{GatewayError, Result};
use crate::planner::TableRef;
use crate::schema::{self, TableSchema};
use crate::store::StoreClient;

/// Inserts every row of `buffer` into `table`, `batch_size` rows per
/// round-trip, using the header as the target column order.
///
/// Batches already written stay written if a later one fails; the error then
/// carries the committed count.
pub async fn import(
    client: &dyn StoreClient,
    table: &TableRef,
    buffer: &TabularBuffer,
    batch_size: usize,
) -> Result<u64> {
    let target = schema::describe_table(client, table).await?;
    check_header(&target, buffer.columns())?;

    if buffer.is_empty() {
        debug!("Nothing to import into {table}");
        return Ok(0);
    }

    let batch_size = batch_size.max(1);
    let mut committed = 0u64;
    for (index, batch) in buffer.rows().chunks(batch_size).enumerate() {
        match client.insert_batch(table, buffer.columns(), batch).await {
            Ok(written) => {
                committed += written;
                debug!("Batch {} into {table}: {written} rows", index + 1);
            }
            Err(e) if committed > 0 => {
                warn!("Import into {table} stopped after {committed} records: {e}");
                return Err(GatewayError::partial_import(committed, e));
            }
            Err(e) => return Err(e),
        }
    }

    info!("Imported {committed} records into {table}");
    Ok(committed)
}

/// Every header column must exist in the destination table.
fn check_header(target: &TableSchema, header: &[String]) -> Result<()> {
    let unknown: Vec<&str> = header
        .iter()
        .filter(|c| !target.has_column(c))
        .map(String::as_str)
        .collect();
    if unknown.is_empty() {
        return Ok(());
    }
    Err(GatewayError::schema(format!(
        "unknown column(s) {} in table '{}' (available: {})",
        unknown.join(", "),
        target.table,
        target.column_names().join(", ")
    )))
}
