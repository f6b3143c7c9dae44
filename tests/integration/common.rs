//! Shared fixtures for integration tests.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use ingest_gateway::auth::{Claims, CredentialGate};
use ingest_gateway::config::ConnectionParams;
use ingest_gateway::ingest::IngestEngine;
use ingest_gateway::store::{MockConnector, MockStore, Value};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};

pub const SECRET: &str = "integration-secret";
pub const PASSWORD: &str = "ch-pass";

/// Signs a token carrying `password` that expires `ttl_secs` from now.
pub fn token(password: Option<&str>, ttl_secs: i64) -> String {
    let claims = Claims {
        password: password.map(str::to_string),
        exp: chrono::Utc::now().timestamp() + ttl_secs,
        sub: Some("integration".to_string()),
    };
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .expect("token encodes")
}

pub fn valid_token() -> String {
    token(Some(PASSWORD), 3600)
}

pub fn params() -> ConnectionParams {
    ConnectionParams::new("clickhouse.test", 8123, "default", "default")
}

/// Engine over `store` that only accepts [`PASSWORD`].
pub fn engine(store: MockStore, export_dir: &Path, batch_size: usize) -> (IngestEngine, MockConnector) {
    let connector = MockConnector::new(store).with_password(PASSWORD);
    let engine = IngestEngine::new(
        Arc::new(connector.clone()),
        CredentialGate::new(SECRET, 0),
        export_dir,
        batch_size,
        Duration::from_secs(5),
    );
    (engine, connector)
}

/// `orders(id, user_id)` and `users(id, name)` with two matching pairs and
/// one order without a user.
pub fn orders_users_store() -> MockStore {
    MockStore::new()
        .with_table(
            "orders",
            &[("id", "UInt64"), ("user_id", "UInt64")],
            vec![
                vec![Value::Int(10), Value::Int(1)],
                vec![Value::Int(11), Value::Int(2)],
                vec![Value::Int(12), Value::Int(99)],
            ],
        )
        .with_table(
            "users",
            &[("id", "UInt64"), ("name", "String")],
            vec![
                vec![Value::Int(1), Value::from("Ada")],
                vec![Value::Int(2), Value::from("Linus")],
            ],
        )
}

/// `metrics(id, name, value)` with a comma-bearing string and a NULL.
pub fn metrics_store() -> MockStore {
    MockStore::new().with_table(
        "metrics",
        &[
            ("id", "UInt64"),
            ("name", "String"),
            ("value", "Nullable(Float64)"),
        ],
        vec![
            vec![Value::Int(1), Value::from("hello, world"), Value::Float(0.5)],
            vec![Value::Int(2), Value::from("plain"), Value::Null],
            vec![
                Value::Int(3),
                Value::from("quote \"inside\""),
                Value::Float(-2.25),
            ],
        ],
    )
}
