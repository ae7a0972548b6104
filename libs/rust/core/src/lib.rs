//! Core shared utilities for the Virtual Doctor inference services.
//!
//! Holds the pieces every service wires together at startup: the artifact store and
//! resource registry, the cache layer, the medicine safety policy, configuration,
//! tracing and the health/metrics probe server.

use anyhow::Result;
use axum::{http::{header, StatusCode}, response::IntoResponse, routing::get, Router};
use once_cell::sync::OnceCell;
use prometheus::{Encoder, TextEncoder};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::prelude::*;

pub mod artifact;
pub mod cache;
pub mod config;
pub mod error;
pub mod metrics;
pub mod registry;
pub mod safety;
pub mod watch;

pub use artifact::{Artifact, ArtifactKind, ArtifactLoader, ArtifactSpec, ArtifactStore, FsLoader, LoadError, Predictor, Table};
pub use cache::{CacheBackend, CacheError, CacheLayer, Memoized};
pub use cache::key::{derive_key, Complex, KeyArg, KeyArgs, ToKeyArg, ToKeyArgs};
pub use config::{load_config, AppConfig, CacheBackendKind, CacheSettings, RegistrySettings};
pub use error::ServiceError;
pub use registry::{Handle, ResourceEntry, ResourceInfo, ResourceRegistry};
pub use safety::{assess, MedicineRecord, PatientHistory, SafetyAssessment, SafetyFlag};

static TRACING_INIT: OnceCell<()> = OnceCell::new();
static NODE_LIVENESS: AtomicBool = AtomicBool::new(true);
static NODE_READINESS: AtomicBool = AtomicBool::new(false);

pub fn mark_ready() { NODE_READINESS.store(true, Ordering::SeqCst); }
pub fn clear_ready() { NODE_READINESS.store(false, Ordering::SeqCst); }
pub fn mark_not_live() { NODE_LIVENESS.store(false, Ordering::SeqCst); }
pub fn is_ready() -> bool { NODE_READINESS.load(Ordering::SeqCst) }

/// Install the global tracing subscriber. `VDOC_JSON_LOG=1` switches to JSON lines.
pub fn init_tracing(service: &str) -> Result<()> {
    TRACING_INIT.get_or_try_init(|| -> Result<()> {
        let json = std::env::var("VDOC_JSON_LOG").ok().map(|v| v == "1" || v.eq_ignore_ascii_case("true")).unwrap_or(false);
        let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
        let registry = tracing_subscriber::registry().with(env_filter);
        if json {
            registry.with(tracing_subscriber::fmt::layer().json().flatten_event(true).with_current_span(true)).try_init()?;
        } else {
            registry.with(tracing_subscriber::fmt::layer().with_target(true).with_line_number(true)).try_init()?;
        }
        Ok(())
    })?;
    info!(target: "vdoc", service, "tracing initialized");
    Ok(())
}

/// Extra fields merged into `/status`, supplied by the hosting service.
pub type StatusFn = Arc<dyn Fn() -> serde_json::Value + Send + Sync>;

pub fn health_router(status: StatusFn) -> Router {
    Router::new()
        .route("/live", get(|| async { axum::Json(serde_json::json!({"live": NODE_LIVENESS.load(Ordering::SeqCst)})) }))
        .route("/ready", get(|| async { axum::Json(serde_json::json!({"ready": NODE_READINESS.load(Ordering::SeqCst)})) }))
        .route("/status", get(move || {
            let status = status.clone();
            async move {
                axum::Json(serde_json::json!({
                    "live": NODE_LIVENESS.load(Ordering::SeqCst),
                    "ready": NODE_READINESS.load(Ordering::SeqCst),
                    "details": status(),
                }))
            }
        }))
        .route("/metrics", get(metrics_handler))
}

/// Bind the probe server and serve it on a background task. Returns the bound address.
pub async fn start_health_server(port: u16, status: StatusFn) -> Result<SocketAddr> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound = listener.local_addr()?;
    info!(addr = ?bound, "health server listening");
    let app = health_router(status);
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = ?e, "health server failed");
        }
    });
    Ok(bound)
}

async fn metrics_handler() -> axum::response::Response {
    let families = prometheus::gather();
    let mut buf = Vec::new();
    if let Err(e) = TextEncoder::new().encode(&families, &mut buf) {
        return (StatusCode::INTERNAL_SERVER_ERROR, format!("encode error: {e}")).into_response();
    }
    (StatusCode::OK, [(header::CONTENT_TYPE, "text/plain; version=0.0.4")], buf).into_response()
}
