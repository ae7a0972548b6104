//! Resource registry: named models and datasets loaded at most once and swapped
//! atomically on reload.
//!
//! The set of names is fixed at construction (from the artifact store), so the
//! name -> slot map is never mutated and readers only touch an `ArcSwapOption`.
//! Loaders of the same slot serialize on a per-slot guard that readers never take.

use arc_swap::ArcSwapOption;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::artifact::{Artifact, ArtifactKind, ArtifactLoader, ArtifactStore, FsLoader, LoadError, ModelInfo, Predictor, Table, TableInfo};
use crate::error::ServiceError;
use crate::metrics;

pub type Handle = Arc<ResourceEntry>;

#[derive(Debug)]
pub struct ResourceEntry {
    pub name: String,
    pub kind: ArtifactKind,
    pub path: PathBuf,
    pub artifact: Artifact,
    pub loaded_at: DateTime<Utc>,
}

impl ResourceEntry {
    pub fn model(&self) -> Option<&Arc<dyn Predictor>> { self.artifact.as_model() }
    pub fn dataset(&self) -> Option<&Arc<Table>> { self.artifact.as_dataset() }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ResourceDetails {
    Model(ModelInfo),
    Dataset(TableInfo),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceInfo {
    pub name: String,
    pub path: PathBuf,
    pub loaded_at: DateTime<Utc>,
    pub details: ResourceDetails,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PreloadReport {
    pub loaded: Vec<String>,
    pub failed: Vec<String>,
}

struct Slot {
    entry: ArcSwapOption<ResourceEntry>,
    load_guard: Mutex<()>,
}

pub struct ResourceRegistry {
    store: ArtifactStore,
    loader: Box<dyn ArtifactLoader>,
    slots: HashMap<String, Slot>,
    load_timeout: Duration,
}

impl ResourceRegistry {
    pub fn new(store: ArtifactStore) -> Self { Self::with_loader(store, FsLoader) }

    pub fn with_loader(store: ArtifactStore, loader: impl ArtifactLoader + 'static) -> Self {
        let slots = store.names()
            .map(|n| (n.to_string(), Slot { entry: ArcSwapOption::empty(), load_guard: Mutex::new(()) }))
            .collect();
        Self { store, loader: Box::new(loader), slots, load_timeout: Duration::from_secs(30) }
    }

    pub fn with_load_timeout(mut self, timeout: Duration) -> Self {
        self.load_timeout = timeout;
        self
    }

    pub fn store(&self) -> &ArtifactStore { &self.store }

    /// Currently loaded handle, if any. Never loads.
    pub fn get(&self, name: &str) -> Option<Handle> {
        self.slots.get(name)?.entry.load_full()
    }

    pub fn loaded_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.slots.iter().filter(|(_, s)| s.entry.load().is_some()).map(|(n, _)| n.clone()).collect();
        names.sort();
        names
    }

    /// Load every catalogued artifact. Failures are logged and leave the slot as it was.
    pub fn preload_all(&self) -> PreloadReport {
        let mut report = PreloadReport::default();
        for name in self.store.names() {
            if self.reload(name) { report.loaded.push(name.to_string()); } else { report.failed.push(name.to_string()); }
        }
        info!(loaded = report.loaded.len(), failed = report.failed.len(), "artifact preload finished");
        report
    }

    /// Re-read `name` from disk and swap it in. Handles obtained earlier keep pointing at
    /// the previous artifact. On failure the previous artifact (if any) stays in place.
    pub fn reload(&self, name: &str) -> bool {
        let Some(slot) = self.slots.get(name) else {
            warn!(name, "reload requested for unknown artifact");
            return false;
        };
        let _guard = slot.load_guard.lock();
        match self.read_entry(name) {
            Ok(entry) => { slot.entry.store(Some(Arc::new(entry))); true }
            Err(_) => false,
        }
    }

    /// Loaded handle for `name`, loading it on first use. Waiting on another request's
    /// in-flight load is bounded by the load timeout.
    pub fn require(&self, name: &str) -> Result<Handle, ServiceError> {
        if let Some(handle) = self.get(name) { return Ok(handle); }
        let unavailable = || ServiceError::ArtifactUnavailable { name: name.to_string(), path: self.store.resolve(name) };
        let slot = self.slots.get(name).ok_or_else(unavailable)?;
        let Some(_guard) = slot.load_guard.try_lock_for(self.load_timeout) else {
            warn!(name, timeout_ms = self.load_timeout.as_millis() as u64, "timed out waiting for artifact load");
            return Err(unavailable());
        };
        if let Some(handle) = slot.entry.load_full() { return Ok(handle); }
        let entry = Arc::new(self.read_entry(name).map_err(|_| unavailable())?);
        slot.entry.store(Some(entry.clone()));
        Ok(entry)
    }

    pub fn describe(&self, name: &str) -> Option<ResourceInfo> {
        let entry = self.get(name)?;
        let details = match &entry.artifact {
            Artifact::Model(m) => ResourceDetails::Model(m.info()),
            Artifact::Dataset(t) => ResourceDetails::Dataset(t.info()),
        };
        Some(ResourceInfo { name: entry.name.clone(), path: entry.path.clone(), loaded_at: entry.loaded_at, details })
    }

    /// Persist a replacement dataset and swap it in.
    pub fn update_dataset(&self, name: &str, table: Table) -> bool {
        let Some(slot) = self.slots.get(name) else {
            warn!(name, "update requested for unknown dataset");
            return false;
        };
        let _guard = slot.load_guard.lock();
        match self.store.write_dataset(name, &table) {
            Ok(path) => {
                slot.entry.store(Some(Arc::new(ResourceEntry {
                    name: name.to_string(),
                    kind: ArtifactKind::Dataset,
                    path,
                    artifact: Artifact::Dataset(Arc::new(table)),
                    loaded_at: Utc::now(),
                })));
                info!(name, "dataset updated");
                true
            }
            Err(e) => {
                error!(name, error = %e, "dataset update failed");
                false
            }
        }
    }

    fn read_entry(&self, name: &str) -> Result<ResourceEntry, LoadError> {
        let (Some(spec), Some(path)) = (self.store.spec(name), self.store.resolve(name)) else {
            return Err(LoadError::Unknown(name.to_string()));
        };
        match self.loader.load(spec.kind, &path) {
            Ok(artifact) if artifact.kind() != spec.kind => {
                let err = LoadError::WrongKind { name: name.to_string(), expected: spec.kind.as_str(), actual: artifact.kind().as_str() };
                error!(name, path = %path.display(), error = %err, "artifact load failed");
                metrics::registry_load(name, "error");
                Err(err)
            }
            Ok(artifact) => {
                debug!(name, path = %path.display(), "artifact loaded");
                metrics::registry_load(name, "ok");
                Ok(ResourceEntry { name: name.to_string(), kind: spec.kind, path, artifact, loaded_at: Utc::now() })
            }
            Err(err) => {
                error!(name, path = %path.display(), error = %err, "artifact load failed");
                metrics::registry_load(name, "error");
                Err(err)
            }
        }
    }
}
