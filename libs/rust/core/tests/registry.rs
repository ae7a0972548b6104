use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use vdoc_core::registry::ResourceDetails;
use vdoc_core::{ArtifactKind, ArtifactSpec, ArtifactStore, ResourceRegistry, Table};

fn write(path: &Path, body: &str) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, body).unwrap();
}

fn model_json(bias: f32) -> String {
    json!({"input_dim": 2, "labels": ["neg", "pos"], "weights": [[1.0, 0.0], [0.0, 1.0]], "bias": [0.0, bias]}).to_string()
}

fn catalogue() -> Vec<ArtifactSpec> {
    vec![
        ArtifactSpec::new("sentiment", ArtifactKind::Model, "sentiment/model.json"),
        ArtifactSpec::new("emotion", ArtifactKind::Model, "emotion/model.json"),
        ArtifactSpec::new("medicine", ArtifactKind::Dataset, "medicine/data.json"),
    ]
}

#[test]
fn get_is_absent_until_loaded() {
    let dir = tempfile::tempdir().unwrap();
    write(&dir.path().join("sentiment/model.json"), &model_json(0.0));
    let reg = ResourceRegistry::new(ArtifactStore::new(dir.path(), catalogue()));
    assert!(reg.get("sentiment").is_none());
    assert!(reg.describe("sentiment").is_none());
    assert!(reg.loaded_names().is_empty());
}

#[test]
fn preload_isolates_failures() {
    let dir = tempfile::tempdir().unwrap();
    write(&dir.path().join("sentiment/model.json"), &model_json(0.0));
    write(&dir.path().join("emotion/model.json"), "{ truncated");
    write(&dir.path().join("medicine/data.json"), r#"[{"name":"aspirin","description":"pain relief"}]"#);
    let reg = ResourceRegistry::new(ArtifactStore::new(dir.path(), catalogue()));

    let report = reg.preload_all();
    assert_eq!(report.failed, vec!["emotion".to_string()]);
    assert!(reg.get("sentiment").is_some());
    assert!(reg.get("medicine").is_some());
    assert!(reg.get("emotion").is_none());
    assert_eq!(reg.loaded_names(), vec!["medicine".to_string(), "sentiment".to_string()]);
}

#[test]
fn reload_swaps_without_touching_old_handles() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sentiment/model.json");
    write(&path, &model_json(0.0));
    let reg = ResourceRegistry::new(ArtifactStore::new(dir.path(), catalogue()));
    assert!(reg.reload("sentiment"));
    let old = reg.get("sentiment").unwrap();
    let before = old.model().unwrap().predict(&[0.0, 0.0]).unwrap();

    write(&path, &model_json(5.0));
    assert!(reg.reload("sentiment"));
    let new = reg.get("sentiment").unwrap();

    assert!(!Arc::ptr_eq(&old, &new));
    assert_eq!(old.model().unwrap().predict(&[0.0, 0.0]).unwrap(), before);
    assert!(new.model().unwrap().predict(&[0.0, 0.0]).unwrap()[1] > before[1]);
}

#[test]
fn failed_reload_keeps_previous_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sentiment/model.json");
    write(&path, &model_json(0.0));
    let reg = ResourceRegistry::new(ArtifactStore::new(dir.path(), catalogue()));
    assert!(reg.reload("sentiment"));
    let loaded = reg.get("sentiment").unwrap();
    std::fs::remove_file(&path).unwrap();
    assert!(!reg.reload("sentiment"));
    assert!(Arc::ptr_eq(&loaded, &reg.get("sentiment").unwrap()));
}

#[test]
fn describe_reports_shape() {
    let dir = tempfile::tempdir().unwrap();
    write(&dir.path().join("sentiment/model.json"), &model_json(0.0));
    write(&dir.path().join("medicine/data.json"), r#"[{"name":"a","min_age":1},{"name":"b"}]"#);
    let reg = ResourceRegistry::new(ArtifactStore::new(dir.path(), catalogue()));
    reg.preload_all();

    let Some(ResourceDetails::Model(m)) = reg.describe("sentiment").map(|i| i.details) else { panic!("expected model") };
    assert_eq!((m.input_dim, m.output_dim, m.parameters), (2, 2, 6));

    let info = reg.describe("medicine").unwrap();
    let ResourceDetails::Dataset(t) = &info.details else { panic!("expected dataset") };
    assert_eq!(t.rows, 2);
    assert_eq!(t.missing_values["min_age"], 1);
    let body = serde_json::to_value(&info).unwrap();
    assert_eq!(body["details"]["kind"], "dataset");
}

#[test]
fn update_dataset_persists_and_swaps() {
    let dir = tempfile::tempdir().unwrap();
    let reg = ResourceRegistry::new(ArtifactStore::new(dir.path(), catalogue()));
    let rows = serde_json::from_value(json!([{"name": "paracetamol", "description": "fever"}])).unwrap();
    assert!(reg.update_dataset("medicine", Table::from_records(rows)));
    assert_eq!(reg.get("medicine").unwrap().dataset().unwrap().len(), 1);

    let fresh = ResourceRegistry::new(ArtifactStore::new(dir.path(), catalogue()));
    assert!(fresh.reload("medicine"));
    assert_eq!(fresh.get("medicine").unwrap().dataset().unwrap().len(), 1);
    assert!(!reg.update_dataset("sentiment", Table::default()));
}

#[test]
fn concurrent_require_loads_once() {
    let dir = tempfile::tempdir().unwrap();
    write(&dir.path().join("sentiment/model.json"), &model_json(0.0));
    let reg = Arc::new(ResourceRegistry::new(ArtifactStore::new(dir.path(), catalogue())));
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let reg = Arc::clone(&reg);
            std::thread::spawn(move || reg.require("sentiment").unwrap())
        })
        .collect();
    let loaded: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert!(loaded.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
}
