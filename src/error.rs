//! Error types for the ingestion gateway.
//!
//! Defines the four failure families surfaced by the engine (auth, connection,
//! query, file I/O) and the crate-wide error enum that wraps them.

use std::time::Duration;
use thiserror::Error;

/// Failures of the credential gate.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Token could not be decoded or its signature did not verify.
    #[error("malformed token: {0}")]
    Malformed(String),

    /// Token signature is valid but its expiry has passed.
    #[error("token expired")]
    Expired,
}

/// Failures while opening or talking to the store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    /// Host could not be reached (DNS, refused, reset).
    #[error("store unreachable: {0}")]
    Unreachable(String),

    /// A store operation exceeded the configured timeout.
    #[error("store operation timed out after {0:?}")]
    Timeout(Duration),

    /// The store refused the supplied user/password.
    #[error("store rejected credentials: {0}")]
    AuthRejected(String),
}

/// Failures reported by the store for a statement.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    /// Unknown table/column, bad identifier or syntax.
    #[error("{0}")]
    SyntaxOrSchema(String),

    /// The statement was valid but failed while running.
    #[error("{0}")]
    ExecutionFailed(String),
}

/// Failures reading, parsing or writing delimited files.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IoError {
    #[error("read failed: {0}")]
    ReadFailed(String),

    #[error("write failed: {0}")]
    WriteFailed(String),

    #[error("parse failed: {0}")]
    ParseFailed(String),
}

/// Main error type for gateway operations.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Token verification errors.
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    /// Store connection errors (unreachable, timeout, rejected credentials).
    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    /// Statement errors (unknown identifiers, execution failures).
    #[error("Query error: {0}")]
    Query(#[from] QueryError),

    /// Delimited file errors.
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// Missing or invalid request input.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Configuration errors (invalid config file, missing secret, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// An import stopped part way; `committed` rows were already written.
    #[error("Import stopped after {committed} committed records: {source}")]
    PartialImport {
        committed: u64,
        #[source]
        source: Box<GatewayError>,
    },

    /// Internal application errors (unexpected states, bugs, etc.)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Creates a malformed-token error with the given message.
    pub fn malformed_token(msg: impl Into<String>) -> Self {
        Self::Auth(AuthError::Malformed(msg.into()))
    }

    /// Creates an unreachable-store error with the given message.
    pub fn unreachable(msg: impl Into<String>) -> Self {
        Self::Connection(ConnectionError::Unreachable(msg.into()))
    }

    /// Creates a rejected-credentials error with the given message.
    pub fn auth_rejected(msg: impl Into<String>) -> Self {
        Self::Connection(ConnectionError::AuthRejected(msg.into()))
    }

    /// Creates a schema/syntax query error with the given message.
    pub fn schema(msg: impl Into<String>) -> Self {
        Self::Query(QueryError::SyntaxOrSchema(msg.into()))
    }

    /// Creates an execution query error with the given message.
    pub fn execution(msg: impl Into<String>) -> Self {
        Self::Query(QueryError::ExecutionFailed(msg.into()))
    }

    /// Creates a file read error with the given message.
    pub fn read_failed(msg: impl Into<String>) -> Self {
        Self::Io(IoError::ReadFailed(msg.into()))
    }

    /// Creates a file write error with the given message.
    pub fn write_failed(msg: impl Into<String>) -> Self {
        Self::Io(IoError::WriteFailed(msg.into()))
    }

    /// Creates a file parse error with the given message.
    pub fn parse_failed(msg: impl Into<String>) -> Self {
        Self::Io(IoError::ParseFailed(msg.into()))
    }

    /// Creates a bad request error with the given message.
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    /// Creates a configuration error with the given message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates an internal error with the given message.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Wraps an import failure together with the rows already committed.
    pub fn partial_import(committed: u64, source: GatewayError) -> Self {
        Self::PartialImport {
            committed,
            source: Box::new(source),
        }
    }

    /// Returns the error category as a string for display purposes.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Auth(_) => "Auth Error",
            Self::Connection(_) => "Connection Error",
            Self::Query(_) => "Query Error",
            Self::Io(_) => "I/O Error",
            Self::BadRequest(_) => "Bad Request",
            Self::Config(_) => "Configuration Error",
            Self::PartialImport { source, .. } => source.category(),
            Self::Internal(_) => "Internal Error",
        }
    }

    /// Stable machine-readable code for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Auth(AuthError::Malformed(_)) => "TOKEN_MALFORMED",
            Self::Auth(AuthError::Expired) => "TOKEN_EXPIRED",
            Self::Connection(ConnectionError::Unreachable(_)) => "STORE_UNREACHABLE",
            Self::Connection(ConnectionError::Timeout(_)) => "STORE_TIMEOUT",
            Self::Connection(ConnectionError::AuthRejected(_)) => "STORE_AUTH_REJECTED",
            Self::Query(QueryError::SyntaxOrSchema(_)) => "QUERY_SCHEMA",
            Self::Query(QueryError::ExecutionFailed(_)) => "QUERY_FAILED",
            Self::Io(IoError::ReadFailed(_)) => "FILE_READ_FAILED",
            Self::Io(IoError::WriteFailed(_)) => "FILE_WRITE_FAILED",
            Self::Io(IoError::ParseFailed(_)) => "FILE_PARSE_FAILED",
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::Config(_) => "CONFIG_ERROR",
            Self::PartialImport { source, .. } => source.code(),
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Rows committed before the failure, for partial imports.
    pub fn committed_records(&self) -> Option<u64> {
        match self {
            Self::PartialImport { committed, .. } => Some(*committed),
            _ => None,
        }
    }
}

/// Result type alias using GatewayError.
pub type Result<T> = std::result::Result<T, GatewayError>;
