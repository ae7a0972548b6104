use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use vdoc_core::watch::spawn_artifact_watcher;
use vdoc_core::{ArtifactKind, ArtifactSpec, ArtifactStore, ResourceRegistry};

fn model_json(bias: f32) -> String {
    json!({"input_dim": 2, "labels": ["neg", "pos"], "weights": [[1.0, 0.0], [0.0, 1.0]], "bias": [0.0, bias]}).to_string()
}

fn write(path: &Path, body: &str) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, body).unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn replaced_model_file_is_reloaded() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("models");
    let target = root.join("sentiment/model.json");
    write(&target, &model_json(0.0));
    let store = ArtifactStore::new(&root, vec![ArtifactSpec::new("sentiment", ArtifactKind::Model, "sentiment/model.json")]);
    let registry = Arc::new(ResourceRegistry::new(store));
    assert!(registry.reload("sentiment"));
    let old = registry.get("sentiment").unwrap();

    let task = spawn_artifact_watcher(Arc::clone(&registry)).unwrap();

    let staged = dir.path().join("staged.json");
    write(&staged, &model_json(5.0));
    std::fs::rename(&staged, &target).unwrap();

    let mut swapped = None;
    for _ in 0..100 {
        match registry.get("sentiment") {
            Some(h) if !Arc::ptr_eq(&h, &old) => { swapped = Some(h); break; }
            _ => tokio::time::sleep(Duration::from_millis(100)).await,
        }
    }
    task.abort();

    let fresh = swapped.expect("watcher did not reload the replaced model");
    let before = old.model().unwrap().predict(&[0.0, 0.0]).unwrap();
    let after = fresh.model().unwrap().predict(&[0.0, 0.0]).unwrap();
    assert_ne!(before, after);
}
