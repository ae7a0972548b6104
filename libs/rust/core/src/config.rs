//! Layered service configuration: built-in defaults, an optional file named by
//! `VDOC_CONFIG_FILE`, then `VDOC__SECTION__KEY` environment variables.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::artifact::{ArtifactKind, ArtifactSpec};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackendKind { Redis, Memory, Disabled }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSettings {
    pub backend: CacheBackendKind,
    pub host: String,
    pub port: u16,
    pub db: i64,
    pub default_ttl_secs: u64,
    pub connect_timeout_ms: u64,
    pub io_timeout_ms: u64,
    pub breaker_failure_threshold: u32,
    pub breaker_open_secs: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            backend: CacheBackendKind::Redis,
            host: "127.0.0.1".into(),
            port: 6379,
            db: 0,
            default_ttl_secs: 3600,
            connect_timeout_ms: 250,
            io_timeout_ms: 250,
            breaker_failure_threshold: 3,
            breaker_open_secs: 30,
        }
    }
}

impl CacheSettings {
    pub fn default_ttl(&self) -> Duration { Duration::from_secs(self.default_ttl_secs) }
    pub fn connect_timeout(&self) -> Duration { Duration::from_millis(self.connect_timeout_ms) }
    pub fn io_timeout(&self) -> Duration { Duration::from_millis(self.io_timeout_ms) }
    pub fn breaker_open(&self) -> Duration { Duration::from_secs(self.breaker_open_secs) }
    pub fn url(&self) -> String { format!("redis://{}:{}/{}", self.host, self.port, self.db) }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrySettings {
    /// Upper bound on waiting for another request's in-flight load of the same artifact.
    pub load_timeout_ms: u64,
    pub watch_artifacts: bool,
}

impl Default for RegistrySettings {
    fn default() -> Self { Self { load_timeout_ms: 30_000, watch_artifacts: false } }
}

impl RegistrySettings {
    pub fn load_timeout(&self) -> Duration { Duration::from_millis(self.load_timeout_ms) }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub service_name: String,
    pub artifact_root: PathBuf,
    pub health_port: u16,
    pub cache: CacheSettings,
    pub registry: RegistrySettings,
    pub artifacts: Vec<ArtifactSpec>,
}

impl AppConfig {
    pub fn defaults_for(service: &str) -> Self {
        Self {
            service_name: service.to_string(),
            artifact_root: PathBuf::from("models"),
            health_port: 9091,
            cache: CacheSettings::default(),
            registry: RegistrySettings::default(),
            artifacts: default_artifacts(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self { Self::defaults_for("inference-gateway") }
}

/// The artifacts every deployment ships, relative to `artifact_root`.
pub fn default_artifacts() -> Vec<ArtifactSpec> {
    vec![
        ArtifactSpec::new("sentiment", ArtifactKind::Model, "sentiment_analysis/sentiment_model.json"),
        ArtifactSpec::new("emotion", ArtifactKind::Model, "emotion_detection/emotion_model.json"),
        ArtifactSpec::new("audio", ArtifactKind::Model, "audio_processing/audio_model.json"),
        ArtifactSpec::new("medicine", ArtifactKind::Dataset, "medicine_prescription/medicine_data.json"),
        ArtifactSpec::new("interactions", ArtifactKind::Dataset, "medicine_prescription/drug_interactions.json"),
    ]
}

pub fn load_config(service: &str) -> Result<AppConfig> {
    let defaults = AppConfig::defaults_for(service);
    let mut builder = config::Config::builder()
        .add_source(config::Config::try_from(&defaults)?);
    if let Ok(file) = std::env::var("VDOC_CONFIG_FILE") {
        builder = builder.add_source(config::File::with_name(&file).required(false));
    }
    builder = builder.add_source(config::Environment::with_prefix("VDOC").separator("__").try_parsing(true));
    let cfg: AppConfig = builder.build()?.try_deserialize()?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_round_trip_through_config_layers() {
        let cfg = load_config("test-svc").unwrap();
        assert_eq!(cfg.service_name, "test-svc");
        assert_eq!(cfg.cache.default_ttl_secs, 3600);
        assert_eq!(cfg.artifacts.len(), 5);
        assert!(cfg.artifacts.iter().any(|a| a.name == "medicine" && a.kind == ArtifactKind::Dataset));
    }

    #[test]
    fn redis_url_from_parts() {
        let s = CacheSettings { host: "cache".into(), port: 6380, db: 2, ..Default::default() };
        assert_eq!(s.url(), "redis://cache:6380/2");
    }
}
