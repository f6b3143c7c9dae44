//! ClickHouse client over the HTTP interface.
//!
//! One `reqwest::Client` (and its connection pool) is shared by the gateway;
//! each request gets a [`ClickHouseClient`] bound to its own database, user
//! and password. Statement text only ever carries validated, back-quoted
//! identifiers: lookups bind values as typed query parameters and inserts
//! stream rows as the request body.

use std::sync::OnceLock;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use csv::QuoteStyle;
use regex::Regex;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;

use super::{ColumnInfo, ResultSet, Row, StoreClient, StoreConnector, Value};
use crate::config::{ConnectionParams, StoreConfig};
use crate::error::{ConnectionError, GatewayError, Result};
use crate::planner::{quote_identifier, SelectPlan, TableRef};

/// Null marker in CSV request bodies.
const CSV_NULL: &str = "\\N";

/// Output settings for `FORMAT JSONCompact` reads. Wide integers and decimals
/// arrive as JSON strings so their digits survive untouched.
///
/// Users with `readonly=1` cannot change settings; read-only accounts need
/// `readonly=2`.
const OUTPUT_SETTINGS: &[(&str, &str)] = &[
    ("output_format_json_quote_64bit_integers", "1"),
    ("output_format_json_quote_decimals", "1"),
    ("output_format_json_quote_denormals", "1"),
];

/// Input settings for `FORMAT CSV` inserts.
const INSERT_SETTINGS: &[(&str, &str)] = &[("input_format_csv_trim_whitespaces", "0")];

/// Opens [`ClickHouseClient`]s from a shared HTTP connection pool.
#[derive(Debug, Clone)]
pub struct ClickHouseConnector {
    http: Client,
    scheme: String,
    timeout: Duration,
}

impl ClickHouseConnector {
    pub fn new(config: &StoreConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.timeout())
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .build()
            .map_err(|e| GatewayError::internal(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            http,
            scheme: config.scheme.clone(),
            timeout: config.timeout(),
        })
    }
}

#[async_trait]
impl StoreConnector for ClickHouseConnector {
    async fn open(
        &self,
        params: &ConnectionParams,
        password: &str,
    ) -> Result<Box<dyn StoreClient>> {
        let client = ClickHouseClient {
            http: self.http.clone(),
            base_url: params.base_url(&self.scheme)?,
            database: params.database.clone(),
            user: params.user.clone(),
            password: password.to_string(),
            timeout: self.timeout,
        };

        client.ping().await?;
        debug!("Connected to ClickHouse: {}", params.display_string());
        Ok(Box::new(client))
    }
}

/// A ClickHouse session bound to one database and user.
pub struct ClickHouseClient {
    http: Client,
    base_url: Url,
    database: String,
    user: String,
    password: String,
    timeout: Duration,
}

impl std::fmt::Debug for ClickHouseClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClickHouseClient")
            .field("base_url", &self.base_url.as_str())
            .field("database", &self.database)
            .field("user", &self.user)
            .finish_non_exhaustive()
    }
}

/// Body of a `FORMAT JSONCompact` response.
#[derive(Debug, Deserialize)]
struct JsonCompactResponse {
    meta: Vec<MetaColumn>,
    data: Vec<Vec<serde_json::Value>>,
}

#[derive(Debug, Deserialize)]
struct MetaColumn {
    name: String,
    #[serde(rename = "type")]
    data_type: String,
}

impl ClickHouseClient {
    /// Verifies reachability and credentials.
    async fn ping(&self) -> Result<()> {
        self.post("SELECT 1", &[], &[], None).await.map(|_| ())
    }

    /// Runs a read statement and parses its JSONCompact output.
    async fn query(&self, sql: &str, params: &[(&str, &str)]) -> Result<ResultSet> {
        let start = Instant::now();
        let statement = format!("{sql} FORMAT JSONCompact");
        let body = self.post(&statement, OUTPUT_SETTINGS, params, None).await?;
        let result = parse_json_compact(&body)?.with_execution_time(start.elapsed());
        debug!(
            "Query returned {} rows in {:?}",
            result.row_count(),
            result.execution_time
        );
        Ok(result)
    }

    /// Builds the request URL. `statement` is set when the body carries data.
    fn request_url(
        &self,
        settings: &[(&str, &str)],
        params: &[(&str, &str)],
        statement: Option<&str>,
    ) -> Url {
        let mut url = self.base_url.clone();
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("database", &self.database);
            for (key, value) in settings {
                pairs.append_pair(key, value);
            }
            for (name, value) in params {
                pairs.append_pair(&format!("param_{name}"), value);
            }
            if let Some(statement) = statement {
                pairs.append_pair("query", statement);
            }
        }
        url
    }

    /// Sends one statement. With `data`, the statement goes in the URL and the
    /// rows in the body; otherwise the statement is the body.
    async fn post(
        &self,
        statement: &str,
        settings: &[(&str, &str)],
        params: &[(&str, &str)],
        data: Option<Vec<u8>>,
    ) -> Result<String> {
        let url = self.request_url(settings, params, data.is_some().then_some(statement));
        let body = match data {
            Some(rows) => rows,
            None => statement.as_bytes().to_vec(),
        };

        let response = self
            .http
            .post(url)
            .header("X-ClickHouse-User", &self.user)
            .header("X-ClickHouse-Key", &self.password)
            .body(body)
            .send()
            .await
            .map_err(|e| map_transport_error(e, self.timeout))?;

        let status = response.status();
        let code_header = response
            .headers()
            .get("X-ClickHouse-Exception-Code")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u32>().ok());
        let text = response
            .text()
            .await
            .map_err(|e| map_transport_error(e, self.timeout))?;

        if !status.is_success() {
            let error = classify_server_error(status, code_header, &text);
            warn!("ClickHouse rejected statement: {error}");
            return Err(error);
        }
        Ok(text)
    }
}

#[async_trait]
impl StoreClient for ClickHouseClient {
    async fn list_tables(&self) -> Result<Vec<String>> {
        let result = self.query("SHOW TABLES", &[]).await?;
        Ok(result
            .rows
            .into_iter()
            .filter_map(|row| row.into_iter().next())
            .filter_map(|value| value.to_field())
            .collect())
    }

    async fn describe_table(&self, table: &TableRef) -> Result<Vec<ColumnInfo>> {
        let database = table.database().unwrap_or(&self.database);
        let result = self
            .query(
                "SELECT name, type FROM system.columns \
                 WHERE database = {db:String} AND table = {table:String} \
                 ORDER BY position",
                &[("db", database), ("table", table.name())],
            )
            .await?;

        if result.is_empty() {
            return Err(GatewayError::schema(format!(
                "Table {database}.{} doesn't exist",
                table.name()
            )));
        }

        Ok(result
            .rows
            .into_iter()
            .filter_map(|row| {
                let mut cells = row.into_iter();
                let name = cells.next()?.to_field()?;
                let data_type = cells.next()?.to_field()?;
                Some(ColumnInfo::new(name, data_type))
            })
            .collect())
    }

    async fn select(&self, plan: &SelectPlan) -> Result<ResultSet> {
        let result = self.query(plan.sql(), &[]).await?;
        if result.columns.len() != plan.columns().len() {
            return Err(GatewayError::execution(format!(
                "server returned {} columns, expected {}",
                result.columns.len(),
                plan.columns().len()
            )));
        }
        Ok(result)
    }

    async fn insert_batch(
        &self,
        table: &TableRef,
        columns: &[String],
        rows: &[Row],
    ) -> Result<u64> {
        if rows.is_empty() {
            return Ok(0);
        }

        let column_list = columns
            .iter()
            .map(|c| quote_identifier(c))
            .collect::<Vec<_>>()
            .join(", ");
        let statement = format!(
            "INSERT INTO {} ({column_list}) FORMAT CSV",
            table.quoted()
        );
        let body = encode_csv_body(rows)?;

        self.post(&statement, INSERT_SETTINGS, &[], Some(body)).await?;
        Ok(rows.len() as u64)
    }

    async fn close(&self) -> Result<()> {
        // Idle sockets go back to the shared pool.
        debug!("Released ClickHouse session for {}", self.user);
        Ok(())
    }
}

/// Encodes rows as CSV for an INSERT body.
///
/// Strings are always quoted so the server keeps surrounding whitespace and a
/// literal `\N` stays text; only NULL is written as the bare `\N` marker.
fn encode_csv_body(rows: &[Row]) -> Result<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .quote_style(QuoteStyle::Never)
        .from_writer(Vec::new());
    for row in rows {
        let record = row.iter().map(|value| match value {
            Value::Null => CSV_NULL.to_string(),
            Value::String(s) => format!("\"{}\"", s.replace('"', "\"\"")),
            other => other.to_field().unwrap_or_default(),
        });
        writer
            .write_record(record)
            .map_err(|e| GatewayError::internal(format!("Failed to encode insert body: {e}")))?;
    }
    writer
        .into_inner()
        .map_err(|e| GatewayError::internal(format!("Failed to encode insert body: {e}")))
}

fn parse_json_compact(body: &str) -> Result<ResultSet> {
    let response: JsonCompactResponse = serde_json::from_str(body)
        .map_err(|e| GatewayError::execution(format!("Unexpected response from server: {e}")))?;

    let columns = response
        .meta
        .into_iter()
        .map(|m| ColumnInfo::new(m.name, m.data_type))
        .collect();
    let rows = response
        .data
        .into_iter()
        .map(|row| row.into_iter().map(Value::from_json).collect())
        .collect();

    Ok(ResultSet::with_data(columns, rows))
}

fn exception_code(text: &str) -> Option<u32> {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"Code:\s*(\d+)").expect("static regex"))
        .captures(text)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Maps a failed HTTP response to the error taxonomy.
fn classify_server_error(status: StatusCode, code: Option<u32>, text: &str) -> GatewayError {
    let message = text.trim().to_string();
    match code.or_else(|| exception_code(text)) {
        // AUTHENTICATION_FAILED, UNKNOWN_USER, WRONG_PASSWORD, REQUIRED_PASSWORD
        Some(516 | 192 | 193 | 194) => GatewayError::auth_rejected(message),
        // NO_SUCH_COLUMN_IN_TABLE, UNKNOWN_IDENTIFIER, UNKNOWN_TABLE, SYNTAX_ERROR,
        // UNKNOWN_DATABASE, ACCESS_DENIED
        Some(16 | 47 | 60 | 62 | 81 | 497) => GatewayError::schema(message),
        Some(_) => GatewayError::execution(message),
        None if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN => {
            GatewayError::auth_rejected(message)
        }
        None => GatewayError::execution(format!("HTTP {status}: {message}")),
    }
}

fn map_transport_error(error: reqwest::Error, timeout: Duration) -> GatewayError {
    if error.is_timeout() {
        GatewayError::Connection(ConnectionError::Timeout(timeout))
    } else {
        GatewayError::unreachable(error.to_string())
    }
}
