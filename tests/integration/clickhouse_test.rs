//! Live ClickHouse tests.
//!
//! Require a running server. Set CLICKHOUSE_URL (e.g. `http://localhost:8123`)
//! and optionally CLICKHOUSE_USER / CLICKHOUSE_PASSWORD.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use ingest_gateway::auth::CredentialGate;
use ingest_gateway::config::{ConnectionParams, StoreConfig};
use ingest_gateway::error::{ConnectionError, GatewayError, QueryError};
use ingest_gateway::ingest::delimited::{read_delimited, read_delimited_file};
use ingest_gateway::ingest::{IngestEngine, TabularBuffer};
use ingest_gateway::planner::{plan, JoinSpec, TableRef};
use ingest_gateway::schema::describe_tables;
use ingest_gateway::store::{ClickHouseConnector, Row, StoreClient, StoreConnector, Value};
use tempfile::TempDir;
use url::Url;

use super::common::{token, SECRET};

struct LiveTarget {
    config: StoreConfig,
    params: ConnectionParams,
    password: String,
}

fn live_target() -> Option<LiveTarget> {
    let url = Url::parse(&std::env::var("CLICKHOUSE_URL").ok()?).ok()?;
    let config = StoreConfig {
        scheme: url.scheme().to_string(),
        ..Default::default()
    };
    let params = ConnectionParams::new(
        url.host_str()?,
        url.port().unwrap_or(8123),
        "default",
        std::env::var("CLICKHOUSE_USER").unwrap_or_else(|_| "default".to_string()),
    );
    let password = std::env::var("CLICKHOUSE_PASSWORD").unwrap_or_default();
    Some(LiveTarget {
        config,
        params,
        password,
    })
}

async fn connect(target: &LiveTarget) -> Box<dyn StoreClient> {
    let connector = ClickHouseConnector::new(&target.config).unwrap();
    connector.open(&target.params, &target.password).await.unwrap()
}

#[tokio::test]
async fn test_list_tables() {
    let Some(target) = live_target() else {
        eprintln!("Skipping test: CLICKHOUSE_URL not set");
        return;
    };

    let client = connect(&target).await;
    // Any answer is fine; an empty database lists nothing.
    client.list_tables().await.unwrap();
    client.close().await.unwrap();
}

#[tokio::test]
async fn test_describe_and_select_system_table() {
    let Some(target) = live_target() else {
        eprintln!("Skipping test: CLICKHOUSE_URL not set");
        return;
    };

    let client = connect(&target).await;
    let tables = vec![TableRef::parse("system.one").unwrap()];
    let catalog = describe_tables(client.as_ref(), &tables).await.unwrap();
    assert_eq!(catalog.tables()[0].column_names(), vec!["dummy"]);

    let plan = plan(
        &catalog,
        &JoinSpec::single(tables[0].clone()),
        &["dummy".to_string()],
    )
    .unwrap();
    let result = client.select(&plan).await.unwrap();
    assert_eq!(result.rows, vec![vec![Value::Int(0)]]);
    client.close().await.unwrap();
}

#[tokio::test]
async fn test_describe_missing_table() {
    let Some(target) = live_target() else {
        eprintln!("Skipping test: CLICKHOUSE_URL not set");
        return;
    };

    let client = connect(&target).await;
    let err = client
        .describe_table(&TableRef::parse("no_such_table_for_gateway_tests").unwrap())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        GatewayError::Query(QueryError::SyntaxOrSchema(_))
    ));
}

#[tokio::test]
async fn test_wrong_password_rejected() {
    let Some(target) = live_target() else {
        eprintln!("Skipping test: CLICKHOUSE_URL not set");
        return;
    };

    let connector = ClickHouseConnector::new(&target.config).unwrap();
    let result = connector
        .open(&target.params, "definitely-not-the-password")
        .await;
    assert!(matches!(
        result,
        Err(GatewayError::Connection(ConnectionError::AuthRejected(_)))
    ));
}

/// Runs a DDL statement outside the gateway.
async fn execute(target: &LiveTarget, sql: &str) {
    let url = format!(
        "{}://{}:{}/",
        target.config.scheme, target.params.host, target.params.port
    );
    let response = reqwest::Client::new()
        .post(url)
        .header("X-ClickHouse-User", &target.params.user)
        .header("X-ClickHouse-Key", &target.password)
        .body(sql.to_string())
        .send()
        .await
        .unwrap();
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    assert!(status.is_success(), "{sql}: {body}");
}

fn sorted_rows(buffer: &TabularBuffer) -> Vec<Row> {
    let mut rows = buffer.rows().to_vec();
    rows.sort_by_key(|row| row[0].to_field());
    rows
}

#[tokio::test]
async fn test_import_then_export_round_trip() {
    let Some(target) = live_target() else {
        eprintln!("Skipping test: CLICKHOUSE_URL not set");
        return;
    };

    let table = format!("gateway_round_trip_{}", std::process::id());
    execute(&target, &format!("DROP TABLE IF EXISTS {table}")).await;
    execute(
        &target,
        &format!(
            "CREATE TABLE {table} (id UInt32, name String, note Nullable(String), \
             amount Decimal(38, 10)) ENGINE = Memory"
        ),
    )
    .await;

    let source = "id,name,note,amount\n\
                  1,\"hello, world\",plain,12345678901234567.1234567891\n\
                  2,\"  padded  \",,0.5\n\
                  3,\\N,\"say \"\"hi\"\"\",-3.25\n";

    let dir = TempDir::new().unwrap();
    let connector = ClickHouseConnector::new(&target.config).unwrap();
    let engine = IngestEngine::new(
        Arc::new(connector),
        CredentialGate::new(SECRET, 0),
        dir.path(),
        1000,
        Duration::from_secs(30),
    );
    let token = token(Some(&target.password), 3600);

    let imported = engine
        .import_bytes(&target.params, &token, &table, Bytes::from(source))
        .await;
    let exported = engine
        .export_table(&target.params, &token, &table, "id,name,note,amount")
        .await;
    execute(&target, &format!("DROP TABLE IF EXISTS {table}")).await;

    assert_eq!(imported.unwrap(), 3);
    let exported = exported.unwrap();
    assert_eq!(exported.records, 3);

    let expected = read_delimited(source.as_bytes()).unwrap();
    let actual = read_delimited_file(&exported.file).unwrap();
    assert_eq!(actual.columns(), expected.columns());
    assert_eq!(sorted_rows(&actual), sorted_rows(&expected));
    assert_eq!(sorted_rows(&actual)[1][1], Value::from("  padded  "));
    assert_eq!(sorted_rows(&actual)[2][1], Value::from("\\N"));
}
