//! Endpoint handlers. Each takes a typed request and returns a typed response or a
//! [`ServiceError`]; the hosting layer maps errors with `status_code` / `to_body`.

use std::sync::Arc;
use tracing::{error, warn};
use vdoc_core::{metrics, Predictor, ResourceRegistry, ServiceError, Table};

pub mod audio;
pub mod emotion;
pub mod medicine;
pub mod sentiment;

/// Boxed computation stored inside a memoizer.
pub type MemoFn<I, R> = Box<dyn Fn(&I) -> Result<R, ServiceError> + Send + Sync>;

/// Run one endpoint call, counting and logging its outcome.
pub fn observe<T>(endpoint: &'static str, call: impl FnOnce() -> Result<T, ServiceError>) -> Result<T, ServiceError> {
    let result = call();
    match &result {
        Ok(_) => metrics::endpoint(endpoint, "ok"),
        Err(e) => {
            match e {
                ServiceError::Computation(inner) => error!(endpoint, error = ?inner, "computation failed"),
                ServiceError::ArtifactUnavailable { name, path } => {
                    error!(endpoint, artifact = %name, path = ?path, "artifact unavailable")
                }
                other => warn!(endpoint, error = %other, "rejected request"),
            }
            metrics::endpoint(endpoint, e.kind());
        }
    }
    result
}

pub(crate) fn unavailable(registry: &ResourceRegistry, name: &str) -> ServiceError {
    ServiceError::ArtifactUnavailable { name: name.to_string(), path: registry.store().resolve(name) }
}

pub(crate) fn model(registry: &ResourceRegistry, name: &str) -> Result<Arc<dyn Predictor>, ServiceError> {
    registry.require(name)?.model().cloned().ok_or_else(|| unavailable(registry, name))
}

pub(crate) fn dataset(registry: &ResourceRegistry, name: &str) -> Result<Arc<Table>, ServiceError> {
    registry.require(name)?.dataset().cloned().ok_or_else(|| unavailable(registry, name))
}

/// Indices of `scores` sorted by descending score; ties keep input order.
pub(crate) fn ranked<T: PartialOrd>(scores: &[T]) -> Vec<usize> {
    let mut idx: Vec<usize> = (0..scores.len()).collect();
    idx.sort_by(|&a, &b| scores[b].partial_cmp(&scores[a]).unwrap_or(std::cmp::Ordering::Equal));
    idx
}
