use std::sync::Arc;

use anyhow::Result;
use dog_upload::SessionReaper;
use dog_upload_axum::ServerConfig;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = ServerConfig::from_env();
    let app = dog_upload_axum::build(&config).await?;

    let reaper = SessionReaper::with_interval(Arc::clone(&app.uploads), config.reaper_interval).spawn();

    tracing::info!(
        storage_root = %config.storage_root.display(),
        persistent_sessions = config.session_dir.is_some(),
        chunk_size = config.chunk_size,
        "starting upload server"
    );

    let served = app.listen(config.addr()).await;
    reaper.abort();
    served
}
