use thiserror::Error;

use crate::api::{ApiError, FontWeight};
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum TypeforgeError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("No job selected. Run `typeforge generate` or pass a job id.")]
    NoJob,

    /// Input rejected before any network call.
    #[error("Invalid input: {0}")]
    Validation(String),

    /// Network, HTTP 5xx or unreadable body. Retried on the next cycle.
    #[error("Transient API failure: {0}")]
    Transient(#[source] ApiError),

    /// The server rejected the job identifier. Polling stops.
    #[error("Fatal API failure: {0}")]
    Fatal(#[source] ApiError),

    #[error("Failed to load weight {weight}: {reason}")]
    AssetLoad { weight: FontWeight, reason: String },

    #[error("Regeneration did not finish within {elapsed_secs}s")]
    WorkflowTimeout { elapsed_secs: u64 },

    /// The server ended a regeneration round in the failed state.
    #[error("Regeneration failed on the server: {0}")]
    RegenerationFailed(String),

    #[error("Local store error: {0}")]
    Store(#[from] StoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl From<ApiError> for TypeforgeError {
    fn from(err: ApiError) -> Self {
        if err.is_fatal() {
            TypeforgeError::Fatal(err)
        } else {
            TypeforgeError::Transient(err)
        }
    }
}

impl TypeforgeError {
    /// Whether retrying the same operation later can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TypeforgeError::Transient(_)
                | TypeforgeError::AssetLoad { .. }
                | TypeforgeError::WorkflowTimeout { .. }
        )
    }
}
