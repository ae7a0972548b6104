use serde_json::json;
use std::sync::Arc;
use vdoc_core::{AppConfig, ArtifactStore, CacheLayer, ResourceRegistry};

use crate::handlers::{audio::AudioProcessor, emotion::EmotionDetector, medicine::MedicineAdvisor, sentiment::SentimentAnalyzer};

/// Process-scoped services, built once at startup and shared by every request worker.
pub struct AppState {
    pub registry: Arc<ResourceRegistry>,
    pub cache: Arc<CacheLayer>,
    pub emotion: EmotionDetector,
    pub sentiment: SentimentAnalyzer,
    pub audio: AudioProcessor,
    pub medicine: MedicineAdvisor,
}

impl AppState {
    pub fn new(registry: Arc<ResourceRegistry>, cache: Arc<CacheLayer>) -> Self {
        Self {
            emotion: EmotionDetector::new(Arc::clone(&registry), &cache),
            sentiment: SentimentAnalyzer::new(Arc::clone(&registry), &cache),
            audio: AudioProcessor::new(Arc::clone(&registry)),
            medicine: MedicineAdvisor::new(Arc::clone(&registry), &cache),
            registry,
            cache,
        }
    }

    pub fn from_config(cfg: &AppConfig) -> Self {
        let store = ArtifactStore::new(&cfg.artifact_root, cfg.artifacts.iter().cloned());
        let registry = ResourceRegistry::new(store).with_load_timeout(cfg.registry.load_timeout());
        let cache = CacheLayer::from_settings(&cfg.cache);
        Self::new(Arc::new(registry), Arc::new(cache))
    }

    /// Details for the `/status` probe.
    pub fn status(&self) -> serde_json::Value {
        let artifacts: Vec<_> = self.registry.store().names().filter_map(|n| self.registry.describe(n)).collect();
        json!({
            "loaded": self.registry.loaded_names(),
            "artifacts": artifacts,
            "cache": {
                "backend": self.cache.backend_name(),
                "breaker": self.cache.breaker_state().as_str(),
                "default_ttl_secs": self.cache.default_ttl().as_secs(),
            },
        })
    }
}
