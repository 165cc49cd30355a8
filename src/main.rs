use std::sync::Arc;

use pipeline_vault::{
    api::{start_api_server, ApiState},
    init_observability,
    observability::log_config_info,
    secrets::SessionProvider,
    AppConfig, Result, APP_NAME, VERSION,
};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if it exists (optional - won't fail if missing)
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("Warning: Error loading .env file: {}", e);
        }
    }

    let config = AppConfig::from_env()?;
    init_observability(&config.observability).await?;

    info!(app_name = APP_NAME, version = VERSION, "Starting pipeline-vault");
    log_config_info(&config);

    let sessions = Arc::new(SessionProvider::new(config.session_cache_capacity));
    start_api_server(config.api.clone(), ApiState::new(sessions)).await?;

    info!("pipeline-vault shutdown completed");
    Ok(())
}
