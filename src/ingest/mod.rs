//! Request orchestration.
//!
//! [`IngestEngine`] runs every gateway operation the same way: verify the
//! token, open a request-scoped session, do the work, close the session.
//! Nothing is kept between requests except the shared connector.

mod buffer;
pub mod delimited;
pub mod export;
pub mod import;

pub use buffer::TabularBuffer;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde::Serialize;
use tracing::{debug, info};

use crate::auth::{Credential, CredentialGate};
use crate::config::{Config, ConnectionParams};
use crate::error::{GatewayError, Result};
use crate::planner::{self, JoinSpec, TableRef};
use crate::schema;
use crate::store::{Session, StoreConnector};

/// Outcome of a successful export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportOutcome {
    pub records: u64,
    pub file: PathBuf,
}

/// Runs gateway operations against the store.
#[derive(Clone)]
pub struct IngestEngine {
    connector: Arc<dyn StoreConnector>,
    gate: CredentialGate,
    export_dir: PathBuf,
    batch_size: usize,
    timeout: Duration,
}

impl std::fmt::Debug for IngestEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IngestEngine")
            .field("gate", &self.gate)
            .field("export_dir", &self.export_dir)
            .field("batch_size", &self.batch_size)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl IngestEngine {
    pub fn new(
        connector: Arc<dyn StoreConnector>,
        gate: CredentialGate,
        export_dir: impl Into<PathBuf>,
        batch_size: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            connector,
            gate,
            export_dir: export_dir.into(),
            batch_size: batch_size.max(1),
            timeout,
        }
    }

    /// Builds an engine from validated configuration.
    pub fn from_config(config: &Config, connector: Arc<dyn StoreConnector>) -> Result<Self> {
        config.validate()?;
        let secret = config
            .auth
            .secret
            .as_deref()
            .ok_or_else(|| GatewayError::config("no token verification key configured"))?;

        Ok(Self::new(
            connector,
            CredentialGate::new(secret, config.auth.leeway_secs),
            config.server.export_dir.clone(),
            config.store.insert_batch_size,
            config.store.timeout(),
        ))
    }

    pub fn export_dir(&self) -> &Path {
        &self.export_dir
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn authenticate(&self, token: &str) -> Result<Credential> {
        let credential = self.gate.authenticate(token)?;
        if let Some(subject) = credential.subject() {
            debug!("Token accepted for subject {subject}");
        }
        Ok(credential)
    }

    async fn open(&self, params: &ConnectionParams, credential: &Credential) -> Result<Session> {
        Session::open(self.connector.as_ref(), params, credential, self.timeout).await
    }

    /// Lists the tables of the requested database.
    pub async fn list_tables(&self, params: &ConnectionParams, token: &str) -> Result<Vec<String>> {
        let credential = self.authenticate(token)?;
        let session = self.open(params, &credential).await?;
        let result = schema::list_tables(&session).await;
        session.close().await;
        result
    }

    /// Column names of `table`, in native order.
    pub async fn columns(
        &self,
        params: &ConnectionParams,
        token: &str,
        table: &str,
    ) -> Result<Vec<String>> {
        let credential = self.authenticate(token)?;
        let table = TableRef::parse(table)?;

        let session = self.open(params, &credential).await?;
        let result = schema::describe_table(&session, &table).await;
        session.close().await;
        Ok(result?.column_names())
    }

    /// `table.column` names across a comma-separated table list.
    pub async fn join_columns(
        &self,
        params: &ConnectionParams,
        token: &str,
        tables: &str,
    ) -> Result<Vec<String>> {
        let credential = self.authenticate(token)?;
        let tables = TableRef::parse_list(tables)?;

        let session = self.open(params, &credential).await?;
        let result = schema::describe_tables(&session, &tables).await;
        session.close().await;
        Ok(result?.qualified_column_names())
    }

    /// Exports `columns` of one table to `<table>_export.csv`.
    pub async fn export_table(
        &self,
        params: &ConnectionParams,
        token: &str,
        table: &str,
        columns: &str,
    ) -> Result<ExportOutcome> {
        let credential = self.authenticate(token)?;
        let table = TableRef::parse(table)?;
        let columns = planner::parse_column_list(columns)?;
        let path = export::table_export_path(&self.export_dir, &table.to_string());

        self.run_export(params, &credential, JoinSpec::single(table), &columns, path)
            .await
    }

    /// Exports a join of `tables` to `joined_export.csv`.
    ///
    /// `join_condition` holds one condition for every join, or one per joined
    /// table separated by `;`.
    pub async fn export_join(
        &self,
        params: &ConnectionParams,
        token: &str,
        tables: &str,
        join_condition: &str,
        columns: &str,
    ) -> Result<ExportOutcome> {
        let credential = self.authenticate(token)?;
        let spec = JoinSpec::from_request(TableRef::parse_list(tables)?, join_condition)?;
        let columns = planner::parse_column_list(columns)?;
        let path = export::join_export_path(&self.export_dir);

        self.run_export(params, &credential, spec, &columns, path)
            .await
    }

    async fn run_export(
        &self,
        params: &ConnectionParams,
        credential: &Credential,
        spec: JoinSpec,
        columns: &[String],
        path: PathBuf,
    ) -> Result<ExportOutcome> {
        let session = self.open(params, credential).await?;
        let buffer = async {
            let catalog = schema::describe_tables(&session, &spec.tables()).await?;
            let plan = planner::plan(&catalog, &spec, columns)?;
            export::export(&session, &plan).await
        }
        .await;
        session.close().await;

        let records = export::write_export(buffer?, path.clone()).await?;
        Ok(ExportOutcome {
            records,
            file: path,
        })
    }

    /// Imports CSV content into `table`.
    pub async fn import_bytes(
        &self,
        params: &ConnectionParams,
        token: &str,
        table: &str,
        data: Bytes,
    ) -> Result<u64> {
        let credential = self.authenticate(token)?;
        let table = TableRef::parse(table)?;
        debug!("Parsing {} byte upload for {table}", data.len());

        let buffer = tokio::task::spawn_blocking(move || delimited::read_delimited(data.as_ref()))
            .await
            .map_err(|e| GatewayError::internal(format!("upload parser panicked: {e}")))??;

        self.run_import(params, &credential, &table, &buffer).await
    }

    /// Imports a CSV file from disk into `table`.
    pub async fn import_file(
        &self,
        params: &ConnectionParams,
        token: &str,
        table: &str,
        path: &Path,
    ) -> Result<u64> {
        let credential = self.authenticate(token)?;
        let table = TableRef::parse(table)?;

        let source = path.to_path_buf();
        let buffer = tokio::task::spawn_blocking(move || delimited::read_delimited_file(&source))
            .await
            .map_err(|e| GatewayError::internal(format!("file parser panicked: {e}")))??;

        self.run_import(params, &credential, &table, &buffer).await
    }

    async fn run_import(
        &self,
        params: &ConnectionParams,
        credential: &Credential,
        table: &TableRef,
        buffer: &TabularBuffer,
    ) -> Result<u64> {
        let session = self.open(params, credential).await?;
        let result = import::import(&session, table, buffer, self.batch_size).await;
        session.close().await;

        if let Ok(records) = &result {
            info!("Import into {table} finished: {records} records");
        }
        result
    }
}
