//! HTTP surface of the gateway.
//!
//! Form-encoded endpoints keep the paths the gateway has always exposed; the
//! import endpoint takes `multipart/form-data` with the CSV under `file`.

mod error;
pub mod forms;
mod handlers;

use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use tracing::{debug, info};

use crate::config::ServerConfig;
use crate::error::{GatewayError, Result};
use crate::ingest::IngestEngine;

/// Largest accepted upload, in bytes.
#[derive(Debug, Clone, Copy)]
pub struct UploadLimit(pub usize);

/// Registers every route and the form error handler.
pub fn configure(cfg: &mut web::ServiceConfig) {
    let forms = web::FormConfig::default()
        .error_handler(|err, _req| GatewayError::bad_request(err.to_string()).into());

    cfg.app_data(forms)
        .route("/health", web::get().to(handlers::health))
        .route("/connect_clickhouse", web::post().to(handlers::connect))
        .route("/get_columns", web::post().to(handlers::get_columns))
        .route("/get_join_columns", web::post().to(handlers::get_join_columns))
        .route(
            "/ingest_clickhouse_to_file",
            web::post().to(handlers::export_table),
        )
        .route("/ingest_join_to_file", web::post().to(handlers::export_join))
        .route(
            "/ingest_file_to_clickhouse",
            web::post().to(handlers::import_file),
        );
}

/// CORS policy from the configured origins; `*` allows any origin.
pub fn build_cors(origins: &[String]) -> Cors {
    let cors = Cors::default()
        .allowed_methods(vec!["GET", "POST", "OPTIONS"])
        .allow_any_header()
        .max_age(3600);

    if origins.is_empty() || origins.iter().any(|o| o == "*") {
        debug!("CORS: allowing any origin");
        return cors.allow_any_origin();
    }
    origins
        .iter()
        .fold(cors, |cors, origin| cors.allowed_origin(origin))
}

/// Binds the listener and serves until shutdown.
pub async fn serve(server: &ServerConfig, engine: IngestEngine) -> Result<()> {
    let engine = web::Data::new(engine);
    let limit = web::Data::new(UploadLimit(server.max_upload_bytes));
    let origins = server.allowed_origins.clone();

    let mut http = HttpServer::new(move || {
        App::new()
            .wrap(middleware::Logger::new("%r %s %b %Dms"))
            .wrap(build_cors(&origins))
            .app_data(engine.clone())
            .app_data(limit.clone())
            .configure(configure)
    });
    if server.workers > 0 {
        http = http.workers(server.workers);
    }

    let http = http
        .bind((server.host.as_str(), server.port))
        .map_err(|e| {
            GatewayError::config(format!(
                "cannot bind {}:{}: {e}",
                server.host, server.port
            ))
        })?;

    info!("Listening on {}:{}", server.host, server.port);
    http.run()
        .await
        .map_err(|e| GatewayError::internal(format!("server error: {e}")))
}
