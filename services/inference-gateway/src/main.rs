use anyhow::Result;
use tracing::info;
use vdoc_core::{init_tracing, load_config};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing("inference-gateway")?;
    let cfg = load_config("inference-gateway")?;
    info!(?cfg, "config loaded");
    inference_gateway::run(cfg).await
}
