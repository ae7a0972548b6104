//! Reload artifacts when their files change on disk.

use anyhow::Result;
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::artifact::ArtifactStore;
use crate::registry::ResourceRegistry;

/// Catalogue name of the artifact stored at `path`, if any.
pub fn artifact_for_path(store: &ArtifactStore, path: &Path) -> Option<String> {
    store.names().find(|name| store.resolve(name).is_some_and(|p| paths_match(&p, path))).map(str::to_string)
}

fn paths_match(catalogued: &Path, event: &Path) -> bool {
    if catalogued == event { return true; }
    match (catalogued.canonicalize(), event.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Watch the artifact root and reload whatever changed. The watcher lives as long as the task.
pub fn spawn_artifact_watcher(registry: Arc<ResourceRegistry>) -> Result<JoinHandle<()>> {
    let root: PathBuf = registry.store().root().to_path_buf();
    let (tx, mut rx) = mpsc::channel(32);
    let mut watcher = RecommendedWatcher::new(move |res: notify::Result<notify::Event>| { let _ = tx.blocking_send(res); }, notify::Config::default())?;
    watcher.watch(&root, RecursiveMode::Recursive)?;
    info!(root = %root.display(), "watching artifacts");
    Ok(tokio::spawn(async move {
        let _watcher = watcher;
        while let Some(res) = rx.recv().await {
            let event = match res {
                Ok(ev) => ev,
                Err(e) => { warn!(error = %e, "artifact watch error"); continue; }
            };
            if !matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) { continue; }
            for path in &event.paths {
                let Some(name) = artifact_for_path(registry.store(), path) else { continue };
                debug!(name = %name, path = %path.display(), "artifact changed");
                let registry = Arc::clone(&registry);
                let reloaded = tokio::task::spawn_blocking(move || registry.reload(&name)).await.unwrap_or(false);
                if !reloaded { warn!(path = %path.display(), "changed artifact failed to reload, keeping previous"); }
            }
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::{ArtifactKind, ArtifactSpec};

    #[test]
    fn maps_paths_back_to_names() {
        let store = ArtifactStore::new("/srv/models", [
            ArtifactSpec::new("sentiment", ArtifactKind::Model, "sentiment/model.json"),
            ArtifactSpec::new("medicine", ArtifactKind::Dataset, "medicine/data.json"),
        ]);
        assert_eq!(artifact_for_path(&store, Path::new("/srv/models/medicine/data.json")).as_deref(), Some("medicine"));
        assert_eq!(artifact_for_path(&store, Path::new("/srv/models/other.json")), None);
    }
}
