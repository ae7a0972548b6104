//! Inference gateway: hosts the emotion, sentiment, audio and medicine handlers on top
//! of the shared resource registry and cache.

use anyhow::Result;
use std::sync::Arc;
use tracing::{info, warn};
use vdoc_core::{clear_ready, mark_ready, start_health_server, watch::spawn_artifact_watcher, AppConfig};

pub mod handlers;
pub mod state;
pub mod text;

pub use state::AppState;

pub async fn run(cfg: AppConfig) -> Result<()> {
    let state = Arc::new(AppState::from_config(&cfg));

    let registry = Arc::clone(&state.registry);
    let report = tokio::task::spawn_blocking(move || registry.preload_all()).await?;
    if !report.failed.is_empty() {
        warn!(failed = ?report.failed, "serving without some artifacts; they load on first use");
    }

    let _watcher = if cfg.registry.watch_artifacts { Some(spawn_artifact_watcher(Arc::clone(&state.registry))?) } else { None };

    let status_state = Arc::clone(&state);
    start_health_server(cfg.health_port, Arc::new(move || status_state.status())).await?;
    mark_ready();
    info!(service = %cfg.service_name, cache = state.cache.backend_name(), "inference gateway ready");

    tokio::signal::ctrl_c().await?;
    clear_ready();
    info!("shutdown");
    Ok(())
}
