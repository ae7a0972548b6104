//! Artifact store: where the named model and dataset files live and how they are read.
//!
//! One file per artifact. The store only resolves paths; reading is delegated to an
//! [`ArtifactLoader`] so the registry can be driven by fakes in tests.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

pub mod model;
pub mod table;

pub use model::{Activation, DenseModel, ModelInfo, Predictor};
pub use table::{Table, TableInfo};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind { Model, Dataset }

impl ArtifactKind {
    pub fn as_str(&self) -> &'static str {
        match self { ArtifactKind::Model => "model", ArtifactKind::Dataset => "dataset" }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactSpec {
    pub name: String,
    pub kind: ArtifactKind,
    /// Relative to the store root unless absolute.
    pub path: PathBuf,
}

impl ArtifactSpec {
    pub fn new(name: impl Into<String>, kind: ArtifactKind, path: impl Into<PathBuf>) -> Self {
        Self { name: name.into(), kind, path: path.into() }
    }
}

/// A loaded artifact. Cloning shares the underlying model or table.
#[derive(Clone)]
pub enum Artifact {
    Model(Arc<dyn Predictor>),
    Dataset(Arc<Table>),
}

impl Artifact {
    pub fn kind(&self) -> ArtifactKind {
        match self { Artifact::Model(_) => ArtifactKind::Model, Artifact::Dataset(_) => ArtifactKind::Dataset }
    }
    pub fn as_model(&self) -> Option<&Arc<dyn Predictor>> {
        match self { Artifact::Model(m) => Some(m), Artifact::Dataset(_) => None }
    }
    pub fn as_dataset(&self) -> Option<&Arc<Table>> {
        match self { Artifact::Dataset(t) => Some(t), Artifact::Model(_) => None }
    }
}

impl fmt::Debug for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Artifact::Model(m) => f.debug_tuple("Model").field(&m.info()).finish(),
            Artifact::Dataset(t) => f.debug_tuple("Dataset").field(&format_args!("{} rows", t.len())).finish(),
        }
    }
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("artifact file missing: {}", .0.display())]
    Missing(PathBuf),
    #[error("io error on {}: {source}", .path.display())]
    Io { path: PathBuf, #[source] source: std::io::Error },
    #[error("malformed artifact {}: {reason}", .path.display())]
    Malformed { path: PathBuf, reason: String },
    #[error("unsupported artifact format: {}", .0.display())]
    Unsupported(PathBuf),
    #[error("unknown artifact '{0}'")]
    Unknown(String),
    #[error("artifact '{name}' is a {actual}, expected a {expected}")]
    WrongKind { name: String, expected: &'static str, actual: &'static str },
}

impl LoadError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::NotFound { LoadError::Missing(path.to_path_buf()) } else { LoadError::Io { path: path.to_path_buf(), source } }
    }
    pub(crate) fn malformed(path: &Path, reason: impl fmt::Display) -> Self {
        LoadError::Malformed { path: path.to_path_buf(), reason: reason.to_string() }
    }
}

pub trait ArtifactLoader: Send + Sync {
    fn load(&self, kind: ArtifactKind, path: &Path) -> Result<Artifact, LoadError>;
}

/// Reads artifacts from the local filesystem, picking the format from the extension.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsLoader;

impl ArtifactLoader for FsLoader {
    fn load(&self, kind: ArtifactKind, path: &Path) -> Result<Artifact, LoadError> {
        match kind {
            ArtifactKind::Model => model::load_model(path).map(Artifact::Model),
            ArtifactKind::Dataset => table::load_table(path).map(|t| Artifact::Dataset(Arc::new(t))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
    specs: BTreeMap<String, ArtifactSpec>,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>, specs: impl IntoIterator<Item = ArtifactSpec>) -> Self {
        let specs = specs.into_iter().map(|s| (s.name.clone(), s)).collect();
        Self { root: root.into(), specs }
    }

    pub fn root(&self) -> &Path { &self.root }
    pub fn names(&self) -> impl Iterator<Item = &str> { self.specs.keys().map(String::as_str) }
    pub fn spec(&self, name: &str) -> Option<&ArtifactSpec> { self.specs.get(name) }
    pub fn resolve(&self, name: &str) -> Option<PathBuf> { self.specs.get(name).map(|s| self.root.join(&s.path)) }

    /// Persist a dataset to its configured path. The write goes through a sibling temp
    /// file and a rename so readers of the file never see a torn write.
    pub fn write_dataset(&self, name: &str, table: &Table) -> Result<PathBuf, LoadError> {
        let spec = self.specs.get(name).ok_or_else(|| LoadError::Unknown(name.to_string()))?;
        if spec.kind != ArtifactKind::Dataset {
            return Err(LoadError::WrongKind { name: name.to_string(), expected: "dataset", actual: spec.kind.as_str() });
        }
        let path = self.root.join(&spec.path);
        let bytes = table::encode_table(&path, table)?;
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).map_err(|e| LoadError::io(dir, e))?;
        }
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, bytes).map_err(|e| LoadError::io(&tmp, e))?;
        std::fs::rename(&tmp, &path).map_err(|e| LoadError::io(&path, e))?;
        Ok(path)
    }
}

pub(crate) fn extension(path: &Path) -> String {
    path.extension().and_then(|e| e.to_str()).map(|e| e.to_ascii_lowercase()).unwrap_or_default()
}
