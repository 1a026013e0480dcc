use std::sync::Arc;

use common::{storage::db::SurrealDbClient, utils::config::get_config};
use ingestion_pipeline::{FileIngestor, IngestionPipeline, WorkerConfig, WorkerPool};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Set up tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .try_init()
        .ok();

    let config = get_config()?;

    let db = Arc::new(
        SurrealDbClient::new(
            &config.surrealdb_address,
            &config.surrealdb_username,
            &config.surrealdb_password,
            &config.surrealdb_namespace,
            &config.surrealdb_database,
        )
        .await?,
    );
    db.ensure_initialized().await?;

    let pipeline = Arc::new(IngestionPipeline::new(
        Arc::clone(&db),
        Arc::new(FileIngestor),
    ));

    info!(worker_count = config.worker_count, "starting ingestion workers");
    let pool = WorkerPool::spawn(
        config.worker_count,
        db,
        pipeline,
        WorkerConfig::from_config(&config),
    );

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received; draining workers");
    pool.shutdown().await?;

    Ok(())
}
