//! ingest-gateway - bidirectional ClickHouse <-> CSV ingestion over HTTP.
//!
//! This library exposes the core modules for the binary and for integration
//! tests.

pub mod auth;
pub mod cli;
pub mod config;
pub mod error;
pub mod http;
pub mod ingest;
pub mod logging;
pub mod planner;
pub mod schema;
pub mod store;
