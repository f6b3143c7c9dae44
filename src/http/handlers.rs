//! Endpoint handlers.

use std::collections::HashMap;

use actix_multipart::Multipart;
use actix_web::{web, HttpResponse};
use bytes::BytesMut;
use futures::TryStreamExt;
use serde_json::json;
use tracing::{debug, info};

use super::forms::GatewayForm;
use super::UploadLimit;
use crate::error::{GatewayError, Result};
use crate::ingest::IngestEngine;

/// Multipart field holding the uploaded file.
const FILE_FIELD: &str = "file";

/// Largest accepted text field in a multipart upload.
const MAX_TEXT_FIELD_BYTES: usize = 64 * 1024;

pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

pub async fn connect(
    engine: web::Data<IngestEngine>,
    form: web::Form<GatewayForm>,
) -> Result<HttpResponse> {
    let params = form.params();
    info!("connect: {}", params.display_string());

    let tables = engine.list_tables(&params, &form.jwt_token).await?;
    Ok(HttpResponse::Ok().json(json!({
        "status": "success",
        "tables": tables,
    })))
}

pub async fn get_columns(
    engine: web::Data<IngestEngine>,
    form: web::Form<GatewayForm>,
) -> Result<HttpResponse> {
    let params = form.params();
    let table = form.table()?;
    debug!("get_columns: {table} on {}", params.display_string());

    let columns = engine.columns(&params, &form.jwt_token, table).await?;
    Ok(HttpResponse::Ok().json(json!({ "columns": columns })))
}

pub async fn get_join_columns(
    engine: web::Data<IngestEngine>,
    form: web::Form<GatewayForm>,
) -> Result<HttpResponse> {
    let params = form.params();
    let tables = form.tables()?;
    debug!("get_join_columns: {tables} on {}", params.display_string());

    let columns = engine.join_columns(&params, &form.jwt_token, tables).await?;
    Ok(HttpResponse::Ok().json(json!({ "columns": columns })))
}

pub async fn export_table(
    engine: web::Data<IngestEngine>,
    form: web::Form<GatewayForm>,
) -> Result<HttpResponse> {
    let params = form.params();
    let table = form.table()?;
    let columns = form.columns()?;
    info!("export: {table} [{columns}] from {}", params.display_string());

    let outcome = engine
        .export_table(&params, &form.jwt_token, table, columns)
        .await?;
    Ok(HttpResponse::Ok().json(json!({
        "status": "success",
        "records": outcome.records,
        "file": outcome.file,
    })))
}

pub async fn export_join(
    engine: web::Data<IngestEngine>,
    form: web::Form<GatewayForm>,
) -> Result<HttpResponse> {
    let params = form.params();
    let tables = form.tables()?;
    let columns = form.columns()?;
    info!("join export: {tables} [{columns}] from {}", params.display_string());

    let outcome = engine
        .export_join(
            &params,
            &form.jwt_token,
            tables,
            form.join_condition(),
            columns,
        )
        .await?;
    Ok(HttpResponse::Ok().json(json!({
        "status": "success",
        "records": outcome.records,
        "file": outcome.file,
    })))
}

pub async fn import_file(
    engine: web::Data<IngestEngine>,
    limit: web::Data<UploadLimit>,
    mut payload: Multipart,
) -> Result<HttpResponse> {
    let mut fields = HashMap::new();
    let mut upload: Option<BytesMut> = None;

    while let Some(mut field) = payload.try_next().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        let cap = if name == FILE_FIELD {
            limit.0
        } else {
            MAX_TEXT_FIELD_BYTES
        };
        let mut data = BytesMut::new();
        while let Some(chunk) = field.try_next().await.map_err(multipart_error)? {
            if data.len() + chunk.len() > cap {
                return Err(GatewayError::bad_request(format!(
                    "field '{name}' exceeds the {cap} byte limit"
                )));
            }
            data.extend_from_slice(&chunk);
        }

        if name == FILE_FIELD {
            upload = Some(data);
        } else {
            let text = String::from_utf8(data.to_vec()).map_err(|_| {
                GatewayError::bad_request(format!("form field '{name}' is not valid UTF-8"))
            })?;
            fields.insert(name, text);
        }
    }

    let form = GatewayForm::from_fields(fields)?;
    let upload =
        upload.ok_or_else(|| GatewayError::bad_request("missing uploaded file field 'file'"))?;
    let params = form.params();
    let table = form.table()?;
    info!(
        "import: {} bytes into {table} on {}",
        upload.len(),
        params.display_string()
    );

    let records = engine
        .import_bytes(&params, &form.jwt_token, table, upload.freeze())
        .await?;
    Ok(HttpResponse::Ok().json(json!({
        "status": "success",
        "records": records,
    })))
}

fn multipart_error(error: actix_multipart::MultipartError) -> GatewayError {
    GatewayError::read_failed(format!("invalid upload: {error}"))
}
