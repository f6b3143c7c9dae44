//! Import pipeline tests, including export -> import round trips.

use std::fs;

use bytes::Bytes;
use ingest_gateway::error::{GatewayError, IoError};
use ingest_gateway::ingest::delimited::read_delimited_file;
use ingest_gateway::store::{MockStore, Value};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

use super::common::{engine, metrics_store, params, valid_token};

fn ab_store() -> MockStore {
    MockStore::new().with_table("pairs", &[("a", "Int64"), ("b", "Int64")], vec![])
}

#[tokio::test]
async fn test_import_three_rows() {
    let dir = TempDir::new().unwrap();
    let store = ab_store();
    let (engine, connector) = engine(store.clone(), dir.path(), 1000);

    let records = engine
        .import_bytes(
            &params(),
            &valid_token(),
            "pairs",
            Bytes::from_static(b"a,b\n1,2\n3,4\n5,6\n"),
        )
        .await
        .unwrap();

    assert_eq!(records, 3);
    assert_eq!(
        store.rows("pairs"),
        vec![
            vec![Value::Int(1), Value::Int(2)],
            vec![Value::Int(3), Value::Int(4)],
            vec![Value::Int(5), Value::Int(6)],
        ]
    );
    assert_eq!(connector.open_sessions(), 0);
}

#[tokio::test]
async fn test_import_header_defines_column_order() {
    let dir = TempDir::new().unwrap();
    let store = ab_store();
    let (engine, _connector) = engine(store.clone(), dir.path(), 1000);

    engine
        .import_bytes(&params(), &valid_token(), "pairs", Bytes::from_static(b"b,a\n2,1\n"))
        .await
        .unwrap();

    assert_eq!(store.rows("pairs"), vec![vec![Value::Int(1), Value::Int(2)]]);
}

#[tokio::test]
async fn test_import_is_batched() {
    let dir = TempDir::new().unwrap();
    let store = ab_store();
    let (engine, _connector) = engine(store.clone(), dir.path(), 2);

    let records = engine
        .import_bytes(
            &params(),
            &valid_token(),
            "pairs",
            Bytes::from_static(b"a,b\n1,1\n2,2\n3,3\n4,4\n5,5\n"),
        )
        .await
        .unwrap();

    assert_eq!(records, 5);
    assert_eq!(store.insert_batches(), 3);
    let inserts = store
        .statements()
        .into_iter()
        .filter(|s| s.starts_with("INSERT"))
        .count();
    assert_eq!(inserts, 3);
}

#[tokio::test]
async fn test_partial_import_reports_committed() {
    let dir = TempDir::new().unwrap();
    let store = ab_store().fail_on_insert_batch(3);
    let (engine, connector) = engine(store.clone(), dir.path(), 2);

    let err = engine
        .import_bytes(
            &params(),
            &valid_token(),
            "pairs",
            Bytes::from_static(b"a,b\n1,1\n2,2\n3,3\n4,4\n5,5\n6,6\n"),
        )
        .await
        .unwrap_err();

    assert_eq!(err.committed_records(), Some(4));
    assert_eq!(store.rows("pairs").len(), 4);
    assert_eq!(store.insert_batches(), 3);
    assert_eq!(connector.open_sessions(), 0);
}

#[tokio::test]
async fn test_ragged_file_never_opens_session() {
    let dir = TempDir::new().unwrap();
    let (engine, connector) = engine(ab_store(), dir.path(), 10);

    let err = engine
        .import_bytes(&params(), &valid_token(), "pairs", Bytes::from_static(b"a,b\n1\n"))
        .await
        .unwrap_err();

    assert!(matches!(err, GatewayError::Io(IoError::ParseFailed(_))));
    assert_eq!(connector.opened(), 0);
}

#[tokio::test]
async fn test_import_file_from_disk() {
    let dir = TempDir::new().unwrap();
    let store = ab_store();
    let (engine, _connector) = engine(store.clone(), dir.path(), 10);
    let path = dir.path().join("input.csv");
    fs::write(&path, "a,b\n7,8\n").unwrap();

    let records = engine
        .import_file(&params(), &valid_token(), "pairs", &path)
        .await
        .unwrap();
    assert_eq!(records, 1);
    assert_eq!(store.rows("pairs"), vec![vec![Value::Int(7), Value::Int(8)]]);
}

// Fixture strings are non-empty: an empty string and NULL share the empty
// CSV field and both read back as NULL.
#[tokio::test]
async fn test_round_trip_through_csv() {
    let dir = TempDir::new().unwrap();
    let store = metrics_store();
    store.create_table(
        "metrics_copy",
        &[
            ("id", "UInt64"),
            ("name", "String"),
            ("value", "Nullable(Float64)"),
        ],
        vec![],
    );
    let (engine, _connector) = engine(store.clone(), dir.path(), 2);
    let token = valid_token();

    let first = engine
        .export_table(&params(), &token, "metrics", "id,name,value")
        .await
        .unwrap();
    let imported = engine
        .import_file(&params(), &token, "metrics_copy", &first.file)
        .await
        .unwrap();
    let second = engine
        .export_table(&params(), &token, "metrics_copy", "id,name,value")
        .await
        .unwrap();

    assert_eq!(imported, first.records);
    assert_eq!(
        read_delimited_file(&second.file).unwrap(),
        read_delimited_file(&first.file).unwrap()
    );
    assert_eq!(store.rows("metrics_copy"), store.rows("metrics"));
    assert_eq!(store.rows("metrics_copy")[0][1], Value::from("hello, world"));
}
