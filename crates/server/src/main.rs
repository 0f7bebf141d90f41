use std::sync::Arc;

use anyhow::Context;
use fins_llm::HttpCompletionClient;
use fins_pipeline::IngestionService;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod routes;

use config::Settings;
use routes::AppState;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,fins=debug"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let settings = Settings::load()?;

    let db_path = &settings.storage.database_path;
    if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create data directory {}", parent.display()))?;
    }
    let db = fins_storage::create_db(db_path)
        .await
        .with_context(|| format!("Failed to open database {}", db_path.display()))?;

    if settings.llm.api_key.is_none() {
        warn!("No LLM API key configured; analysis and categorization will run degraded");
    }
    let llm = HttpCompletionClient::new(settings.llm.clone()).context("Failed to build LLM client")?;

    // ── Ingestion pipeline ────────────────────────────────────────────────────
    let pipeline = settings.pipeline_settings();
    let max_upload_bytes = pipeline.max_upload_bytes;
    let ingestion = IngestionService::spawn(db, Arc::new(llm), pipeline);

    let recovered = ingestion.recover_interrupted().await?;
    if recovered > 0 {
        info!("Re-queued {recovered} interrupted jobs");
    }

    // ── HTTP ──────────────────────────────────────────────────────────────────
    let app = routes::router(AppState { ingestion }, max_upload_bytes);
    let listener = tokio::net::TcpListener::bind(&settings.server.bind)
        .await
        .with_context(|| format!("Failed to bind {}", settings.server.bind))?;
    info!("Listening on {}", settings.server.bind);

    axum::serve(listener, app).await?;
    Ok(())
}
