//! Export pipeline: run a planned SELECT and materialize it.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::{delimited, TabularBuffer};
use crate::error::{GatewayError, Result};
use crate::planner::SelectPlan;
use crate::store::StoreClient;

/// Runs `plan` and buffers every row under the requested header.
pub async fn export(client: &dyn StoreClient, plan: &SelectPlan) -> Result<TabularBuffer> {
    let result = client.select(plan).await?;
    debug!(
        "Export query returned {} rows in {:?}",
        result.row_count(),
        result.execution_time
    );
    TabularBuffer::from_result(plan.header(), result)
}

/// Writes `buffer` to `path` off the async runtime.
pub async fn write_export(buffer: TabularBuffer, path: PathBuf) -> Result<u64> {
    let target = path.clone();
    let written = tokio::task::spawn_blocking(move || delimited::write_delimited(&buffer, &target))
        .await
        .map_err(|e| GatewayError::internal(format!("export writer panicked: {e}")))??;

    info!("Exported {written} records to {}", path.display());
    Ok(written)
}

/// Export file name for a single table.
pub fn table_export_path(dir: &Path, table: &str) -> PathBuf {
    dir.join(format!("{table}_export.csv"))
}

/// Export file name for a join.
pub fn join_export_path(dir: &Path) -> PathBuf {
    dir.join("joined_export.csv")
}
