//! ingest-gateway - ClickHouse <-> CSV ingestion over HTTP.

use std::sync::Arc;

use ingest_gateway::cli::Cli;
use ingest_gateway::config::Config;
use ingest_gateway::error::Result;
use ingest_gateway::ingest::IngestEngine;
use ingest_gateway::store::ClickHouseConnector;
use ingest_gateway::{http, logging};
use tracing::{error, info};

#[actix_web::main]
async fn main() {
    // A missing .env file is fine.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse_args();
    match cli.log_path() {
        Some(path) => logging::init_file_logging(&path),
        None => logging::init_stderr_logging(),
    }

    if let Err(e) = run(cli).await {
        error!("{}: {}", e.category(), e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config_path();
    info!("Loading config from: {}", config_path.display());
    let mut config = Config::load_from_file(&config_path)?;
    config.apply_env_overrides();
    cli.apply_to(&mut config);
    config.validate()?;

    let connector = ClickHouseConnector::new(&config.store)?;
    let engine = IngestEngine::from_config(&config, Arc::new(connector))?;
    info!(
        "Exports go to {} (insert batch size {})",
        engine.export_dir().display(),
        engine.batch_size()
    );

    http::serve(&config.server, engine).await
}
