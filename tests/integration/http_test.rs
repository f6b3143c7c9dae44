//! HTTP endpoint tests against the mock store.

use actix_web::http::StatusCode;
use actix_web::{test, web, App};
use ingest_gateway::http::{configure, UploadLimit};
use ingest_gateway::ingest::IngestEngine;
use ingest_gateway::store::{MockStore, Value};
use serde_json::Value as Json;
use tempfile::TempDir;

use super::common::{engine, metrics_store, orders_users_store, token, valid_token};

const BOUNDARY: &str = "----gateway-test-boundary";

fn form(extra: &[(&str, &str)], token: &str) -> Vec<(String, String)> {
    [
        ("host", "clickhouse.test"),
        ("port", "8123"),
        ("database", "default"),
        ("user", "default"),
        ("jwt_token", token),
    ]
    .iter()
    .chain(extra.iter())
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

fn multipart_body(fields: &[(String, String)], file: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"data.csv\"\r\nContent-Type: text/csv\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(file);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
}

macro_rules! app {
    ($engine:expr, $limit:expr) => {
        test::init_service(
            App::new()
                .app_data(web::Data::new($engine))
                .app_data(web::Data::new(UploadLimit($limit)))
                .configure(configure),
        )
        .await
    };
}

async fn post_form(engine: IngestEngine, uri: &str, fields: Vec<(String, String)>) -> (StatusCode, Json) {
    let app = app!(engine, 1024 * 1024);
    let req = test::TestRequest::post()
        .uri(uri)
        .set_form(&fields)
        .to_request();
    let resp = test::call_service(&app, req).await;
    let status = resp.status();
    let body: Json = test::read_body_json(resp).await;
    (status, body)
}

#[actix_web::test]
async fn test_health() {
    let dir = TempDir::new().unwrap();
    let (engine, _) = engine(MockStore::new(), dir.path(), 10);
    let app = app!(engine, 1024);

    let req = test::TestRequest::get().uri("/health").to_request();
    let body: Json = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["status"], "ok");
}

#[actix_web::test]
async fn test_connect_lists_tables() {
    let dir = TempDir::new().unwrap();
    let (engine, _) = engine(orders_users_store(), dir.path(), 10);

    let (status, body) = post_form(engine, "/connect_clickhouse", form(&[], &valid_token())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    assert_eq!(body["tables"], serde_json::json!(["orders", "users"]));
}

#[actix_web::test]
async fn test_expired_token_is_unauthorized() {
    let dir = TempDir::new().unwrap();
    let (engine, _) = engine(orders_users_store(), dir.path(), 10);

    let expired = token(Some(super::common::PASSWORD), -10);
    let (status, body) = post_form(engine, "/connect_clickhouse", form(&[], &expired)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["status"], "error");
    assert_eq!(body["error"]["code"], "TOKEN_EXPIRED");
}

#[actix_web::test]
async fn test_missing_form_field_is_bad_request() {
    let dir = TempDir::new().unwrap();
    let (engine, _) = engine(orders_users_store(), dir.path(), 10);

    let fields = vec![("host".to_string(), "clickhouse.test".to_string())];
    let (status, body) = post_form(engine, "/connect_clickhouse", fields).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
}

#[actix_web::test]
async fn test_get_columns() {
    let dir = TempDir::new().unwrap();
    let (engine, _) = engine(metrics_store(), dir.path(), 10);

    let (status, body) = post_form(
        engine,
        "/get_columns",
        form(&[("table", "metrics")], &valid_token()),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["columns"], serde_json::json!(["id", "name", "value"]));
}

#[actix_web::test]
async fn test_get_columns_unknown_table() {
    let dir = TempDir::new().unwrap();
    let (engine, _) = engine(metrics_store(), dir.path(), 10);

    let (status, body) = post_form(
        engine,
        "/get_columns",
        form(&[("table", "ghost")], &valid_token()),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "QUERY_SCHEMA");
}

#[actix_web::test]
async fn test_get_join_columns() {
    let dir = TempDir::new().unwrap();
    let (engine, _) = engine(orders_users_store(), dir.path(), 10);

    let (status, body) = post_form(
        engine,
        "/get_join_columns",
        form(&[("tables", "orders,users")], &valid_token()),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["columns"],
        serde_json::json!(["orders.id", "orders.user_id", "users.id", "users.name"])
    );
}

#[actix_web::test]
async fn test_export_endpoint() {
    let dir = TempDir::new().unwrap();
    let (engine, _) = engine(metrics_store(), dir.path(), 10);

    let (status, body) = post_form(
        engine,
        "/ingest_clickhouse_to_file",
        form(&[("table", "metrics"), ("columns", "id,name")], &valid_token()),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    assert_eq!(body["records"], 3);
    let file = body["file"].as_str().unwrap();
    assert!(file.ends_with("metrics_export.csv"));
    assert!(std::fs::read_to_string(file)
        .unwrap()
        .starts_with("id,name\n1,\"hello, world\"\n"));
}

#[actix_web::test]
async fn test_join_export_endpoint() {
    let dir = TempDir::new().unwrap();
    let (engine, _) = engine(orders_users_store(), dir.path(), 10);

    let (status, body) = post_form(
        engine,
        "/ingest_join_to_file",
        form(
            &[
                ("tables", "orders,users"),
                ("join_condition", "orders.user_id = users.id"),
                ("columns", "orders.id,users.name"),
            ],
            &valid_token(),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["records"], 2);
    assert!(body["file"].as_str().unwrap().ends_with("joined_export.csv"));
}

#[actix_web::test]
async fn test_join_export_missing_condition() {
    let dir = TempDir::new().unwrap();
    let (engine, _) = engine(orders_users_store(), dir.path(), 10);

    let (status, body) = post_form(
        engine,
        "/ingest_join_to_file",
        form(
            &[("tables", "orders,users"), ("columns", "orders.id")],
            &valid_token(),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
}

#[actix_web::test]
async fn test_import_endpoint() {
    let dir = TempDir::new().unwrap();
    let store = MockStore::new().with_table("pairs", &[("a", "Int64"), ("b", "Int64")], vec![]);
    let (engine, _) = engine(store.clone(), dir.path(), 10);
    let app = app!(engine, 1024 * 1024);

    let body = multipart_body(
        &form(&[("table", "pairs")], &valid_token()),
        b"a,b\n1,2\n3,4\n5,6\n",
    );
    let req = test::TestRequest::post()
        .uri("/ingest_file_to_clickhouse")
        .insert_header((
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        ))
        .set_payload(body)
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::OK);
    let json: Json = test::read_body_json(resp).await;
    assert_eq!(json["records"], 3);
    assert_eq!(store.rows("pairs")[2], vec![Value::Int(5), Value::Int(6)]);
}

#[actix_web::test]
async fn test_import_partial_failure_reports_records() {
    let dir = TempDir::new().unwrap();
    let store = MockStore::new()
        .with_table("pairs", &[("a", "Int64"), ("b", "Int64")], vec![])
        .fail_on_insert_batch(2);
    let (engine, _) = engine(store, dir.path(), 1);
    let app = app!(engine, 1024 * 1024);

    let body = multipart_body(
        &form(&[("table", "pairs")], &valid_token()),
        b"a,b\n1,2\n3,4\n",
    );
    let req = test::TestRequest::post()
        .uri("/ingest_file_to_clickhouse")
        .insert_header((
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        ))
        .set_payload(body)
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let json: Json = test::read_body_json(resp).await;
    assert_eq!(json["status"], "error");
    assert_eq!(json["records"], 1);
}

#[actix_web::test]
async fn test_import_upload_too_large() {
    let dir = TempDir::new().unwrap();
    let (engine, connector) = engine(
        MockStore::new().with_table("pairs", &[("a", "Int64")], vec![]),
        dir.path(),
        10,
    );
    let app = app!(engine, 16);

    let body = multipart_body(
        &form(&[("table", "pairs")], &valid_token()),
        b"a\n1\n2\n3\n4\n5\n6\n7\n8\n9\n",
    );
    let req = test::TestRequest::post()
        .uri("/ingest_file_to_clickhouse")
        .insert_header((
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        ))
        .set_payload(body)
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(connector.opened(), 0);
}
