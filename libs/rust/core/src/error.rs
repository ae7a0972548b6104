//! Errors that cross the endpoint boundary.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceError {
    /// A required request field is absent. Carries the client-facing message.
    #[error("{0}")]
    MissingInput(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("artifact '{name}' unavailable")]
    ArtifactUnavailable { name: String, path: Option<PathBuf> },
    #[error("computation failed: {0:#}")]
    Computation(#[from] anyhow::Error),
}

impl ServiceError {
    pub fn missing(msg: impl Into<String>) -> Self { Self::MissingInput(msg.into()) }
    pub fn invalid(msg: impl Into<String>) -> Self { Self::InvalidInput(msg.into()) }

    pub fn status_code(&self) -> u16 {
        match self {
            ServiceError::MissingInput(_) | ServiceError::InvalidInput(_) => 400,
            ServiceError::ArtifactUnavailable { .. } => 503,
            ServiceError::Computation(_) => 500,
        }
    }

    /// Text safe to hand back to a client. Computation failures stay in the logs.
    pub fn public_message(&self) -> String {
        match self {
            ServiceError::Computation(_) => "internal error".to_string(),
            other => other.to_string(),
        }
    }

    pub fn to_body(&self) -> serde_json::Value { serde_json::json!({ "error": self.public_message() }) }

    pub fn kind(&self) -> &'static str {
        match self {
            ServiceError::MissingInput(_) => "missing_input",
            ServiceError::InvalidInput(_) => "invalid_input",
            ServiceError::ArtifactUnavailable { .. } => "artifact_unavailable",
            ServiceError::Computation(_) => "computation",
        }
    }
}
