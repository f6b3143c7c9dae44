//! Engine tests: token checks, session handling, schema inspection.

use ingest_gateway::error::{AuthError, ConnectionError, GatewayError, QueryError};
use ingest_gateway::store::MockStore;
use pretty_assertions::assert_eq;
use tempfile::TempDir;

use super::common::{engine, metrics_store, orders_users_store, params, token, valid_token};

#[tokio::test]
async fn test_valid_token_lists_tables() {
    let dir = TempDir::new().unwrap();
    let (engine, connector) = engine(orders_users_store(), dir.path(), 100);

    let tables = engine.list_tables(&params(), &valid_token()).await.unwrap();
    assert_eq!(tables, vec!["orders", "users"]);
    assert_eq!(connector.opened(), 1);
    assert_eq!(connector.open_sessions(), 0);
}

#[tokio::test]
async fn test_expired_token_never_reaches_store() {
    let dir = TempDir::new().unwrap();
    let (engine, connector) = engine(orders_users_store(), dir.path(), 100);

    let err = engine
        .list_tables(&params(), &token(Some(super::common::PASSWORD), -60))
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::Auth(AuthError::Expired)));
    assert_eq!(connector.opened(), 0);
}

#[tokio::test]
async fn test_malformed_token() {
    let dir = TempDir::new().unwrap();
    let (engine, connector) = engine(orders_users_store(), dir.path(), 100);

    let err = engine
        .list_tables(&params(), "eyJhbGciOiJIUzI1NiJ9.garbage.sig")
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::Auth(AuthError::Malformed(_))));
    assert_eq!(connector.opened(), 0);
}

#[tokio::test]
async fn test_token_without_password_is_rejected_by_connector() {
    let dir = TempDir::new().unwrap();
    let (engine, connector) = engine(orders_users_store(), dir.path(), 100);

    let err = engine
        .list_tables(&params(), &token(None, 3600))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        GatewayError::Connection(ConnectionError::AuthRejected(_))
    ));
    assert_eq!(connector.opened(), 0);
}

#[tokio::test]
async fn test_wrong_store_password() {
    let dir = TempDir::new().unwrap();
    let (engine, _connector) = engine(orders_users_store(), dir.path(), 100);

    let err = engine
        .list_tables(&params(), &token(Some("nope"), 3600))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        GatewayError::Connection(ConnectionError::AuthRejected(_))
    ));
}

#[tokio::test]
async fn test_describe_table_native_order() {
    let dir = TempDir::new().unwrap();
    let (engine, connector) = engine(metrics_store(), dir.path(), 100);

    let columns = engine
        .columns(&params(), &valid_token(), "metrics")
        .await
        .unwrap();
    assert_eq!(columns, vec!["id", "name", "value"]);
    assert_eq!(connector.open_sessions(), 0);
}

#[tokio::test]
async fn test_describe_missing_table_closes_session() {
    let dir = TempDir::new().unwrap();
    let (engine, connector) = engine(metrics_store(), dir.path(), 100);

    let err = engine
        .columns(&params(), &valid_token(), "ghost")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        GatewayError::Query(QueryError::SyntaxOrSchema(_))
    ));
    assert_eq!(connector.open_sessions(), 0);
}

#[tokio::test]
async fn test_invalid_table_name_rejected_before_connecting() {
    let dir = TempDir::new().unwrap();
    let (engine, connector) = engine(metrics_store(), dir.path(), 100);

    let err = engine
        .columns(&params(), &valid_token(), "metrics; DROP TABLE metrics")
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::Query(_)));
    assert_eq!(connector.opened(), 0);
}

#[tokio::test]
async fn test_join_columns_qualified() {
    let dir = TempDir::new().unwrap();
    let (engine, _connector) = engine(orders_users_store(), dir.path(), 100);

    let columns = engine
        .join_columns(&params(), &valid_token(), "orders, users")
        .await
        .unwrap();
    assert_eq!(
        columns,
        vec!["orders.id", "orders.user_id", "users.id", "users.name"]
    );
}

#[tokio::test]
async fn test_unreachable_store() {
    let dir = TempDir::new().unwrap();
    let connector = ingest_gateway::store::MockConnector::new(MockStore::new()).unreachable();
    let engine = ingest_gateway::ingest::IngestEngine::new(
        std::sync::Arc::new(connector),
        ingest_gateway::auth::CredentialGate::new(super::common::SECRET, 0),
        dir.path(),
        100,
        std::time::Duration::from_secs(1),
    );

    let err = engine
        .list_tables(&params(), &valid_token())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        GatewayError::Connection(ConnectionError::Unreachable(_))
    ));
}
