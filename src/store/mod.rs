//! Store access layer.
//!
//! Provides a trait-based interface to the columnar store so the ClickHouse
//! HTTP client and the in-memory mock can be used interchangeably. Every
//! request opens its own [`Session`] and releases it when done.

mod clickhouse;
mod mock;
mod types;

pub use clickhouse::{ClickHouseClient, ClickHouseConnector};
pub use mock::{MockClient, MockConnector, MockStore};
pub use types::{ColumnInfo, ResultSet, Row, Value};

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::auth::Credential;
use crate::config::ConnectionParams;
use crate::error::{ConnectionError, GatewayError, Result};
use crate::planner::{SelectPlan, TableRef};

/// Opens store connections for a request.
#[async_trait]
pub trait StoreConnector: Send + Sync {
    /// Opens a connection authenticated with `password`.
    async fn open(&self, params: &ConnectionParams, password: &str)
        -> Result<Box<dyn StoreClient>>;
}

/// Operations the engine issues against an open connection.
#[async_trait]
pub trait StoreClient: Send + Sync {
    /// Lists table names in the connection's database.
    async fn list_tables(&self) -> Result<Vec<String>>;

    /// Describes a table, columns in the store's native order.
    async fn describe_table(&self, table: &TableRef) -> Result<Vec<ColumnInfo>>;

    /// Runs a planned SELECT and returns every row.
    async fn select(&self, plan: &SelectPlan) -> Result<ResultSet>;

    /// Inserts `rows` into `table` in one round-trip; returns rows written.
    async fn insert_batch(&self, table: &TableRef, columns: &[String], rows: &[Row])
        -> Result<u64>;

    /// Closes the connection.
    async fn close(&self) -> Result<()>;
}

/// A request-scoped store connection.
///
/// Applies the per-operation timeout to every call. [`Session::close`] should
/// be called on every path; dropping an unclosed session still releases the
/// underlying client.
pub struct Session {
    client: Box<dyn StoreClient>,
    timeout: Duration,
    label: String,
    closed: bool,
}

impl Session {
    /// Opens a session for `params` using the password bound to `credential`.
    pub async fn open(
        connector: &dyn StoreConnector,
        params: &ConnectionParams,
        credential: &Credential,
        timeout: Duration,
    ) -> Result<Self> {
        let label = params.display_string();
        let password = credential.password().ok_or_else(|| {
            GatewayError::auth_rejected("token does not carry a store password")
        })?;

        debug!("Opening store session: {label}");
        let client = with_timeout(timeout, connector.open(params, password)).await?;

        Ok(Self {
            client,
            timeout,
            label,
            closed: false,
        })
    }

    /// Wraps an already open client.
    pub fn from_client(client: Box<dyn StoreClient>, timeout: Duration) -> Self {
        Self {
            client,
            timeout,
            label: "preopened".to_string(),
            closed: false,
        }
    }

    /// Closes the session, logging rather than failing on close errors.
    pub async fn close(mut self) {
        self.closed = true;
        match with_timeout(self.timeout, self.client.close()).await {
            Ok(()) => debug!("Closed store session: {}", self.label),
            Err(e) => warn!("Error closing store session {}: {e}", self.label),
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if !self.closed {
            debug!("Store session {} dropped without close", self.label);
        }
    }
}

#[async_trait]
impl StoreClient for Session {
    async fn list_tables(&self) -> Result<Vec<String>> {
        with_timeout(self.timeout, self.client.list_tables()).await
    }

    async fn describe_table(&self, table: &TableRef) -> Result<Vec<ColumnInfo>> {
        with_timeout(self.timeout, self.client.describe_table(table)).await
    }

    async fn select(&self, plan: &SelectPlan) -> Result<ResultSet> {
        with_timeout(self.timeout, self.client.select(plan)).await
    }

    async fn insert_batch(
        &self,
        table: &TableRef,
        columns: &[String],
        rows: &[Row],
    ) -> Result<u64> {
        with_timeout(self.timeout, self.client.insert_batch(table, columns, rows)).await
    }

    async fn close(&self) -> Result<()> {
        with_timeout(self.timeout, self.client.close()).await
    }
}

/// Runs `fut`, failing with `ConnectionError::Timeout` once `limit` elapses.
pub async fn with_timeout<T>(limit: Duration, fut: impl Future<Output = Result<T>>) -> Result<T> {
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| GatewayError::Connection(ConnectionError::Timeout(limit)))?
}
