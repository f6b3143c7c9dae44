//! Form inputs shared by every endpoint.

use std::collections::HashMap;

use serde::Deserialize;

use crate::config::ConnectionParams;
use crate::error::{GatewayError, Result};

fn default_port() -> u16 {
    8123
}

/// Connection parameters, token and operation inputs of one request.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayForm {
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    pub database: String,

    pub user: String,

    #[serde(alias = "token")]
    pub jwt_token: String,

    #[serde(default)]
    pub table: Option<String>,

    /// Comma-separated table list.
    #[serde(default)]
    pub tables: Option<String>,

    /// Comma-separated column list.
    #[serde(default)]
    pub columns: Option<String>,

    #[serde(default)]
    pub join_condition: Option<String>,
}

impl GatewayForm {
    /// Builds a form from multipart text fields.
    pub fn from_fields(mut fields: HashMap<String, String>) -> Result<Self> {
        let mut required = |name: &str| {
            fields
                .remove(name)
                .ok_or_else(|| GatewayError::bad_request(format!("missing form field '{name}'")))
        };

        let host = required("host")?;
        let database = required("database")?;
        let user = required("user")?;
        let jwt_token = required("jwt_token").or_else(|_| required("token"))?;

        let port = match fields.remove("port") {
            Some(raw) => raw.trim().parse::<u16>().map_err(|_| {
                GatewayError::bad_request(format!("invalid port '{raw}'"))
            })?,
            None => default_port(),
        };

        Ok(Self {
            host,
            port,
            database,
            user,
            jwt_token,
            table: fields.remove("table"),
            tables: fields.remove("tables"),
            columns: fields.remove("columns"),
            join_condition: fields.remove("join_condition"),
        })
    }

    pub fn params(&self) -> ConnectionParams {
        ConnectionParams::new(
            self.host.trim(),
            self.port,
            self.database.trim(),
            self.user.trim(),
        )
    }

    pub fn table(&self) -> Result<&str> {
        require(&self.table, "table")
    }

    pub fn tables(&self) -> Result<&str> {
        require(&self.tables, "tables")
    }

    pub fn columns(&self) -> Result<&str> {
        require(&self.columns, "columns")
    }

    /// Join conditions; blank when the client sent none.
    pub fn join_condition(&self) -> &str {
        self.join_condition.as_deref().unwrap_or("")
    }
}

fn require<'a>(value: &'a Option<String>, name: &str) -> Result<&'a str> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(GatewayError::bad_request(format!(
            "missing form field '{name}'"
        ))),
    }
}
