//! Error types for restore operations

use salvage_common::FieldError;
use thiserror::Error;

/// Errors from restore operations
#[derive(Debug, Error)]
pub enum RestoreError {
    /// A resource name could not be resolved through discovery
    #[error("discovery failed: {0}")]
    Discovery(String),

    /// The request or an action's filter is malformed
    #[error("validation failed: {0}")]
    Validation(String),

    /// Reading the backup archive failed
    #[error("archive error: {0}")]
    Archive(String),

    /// Object already exists on the target cluster
    #[error("{resource} \"{name}\" already exists")]
    AlreadyExists {
        /// Resource type
        resource: String,
        /// Object name
        name: String,
    },

    /// A dynamic client could not be built or a request failed
    #[error("client error: {0}")]
    Client(String),

    /// Block store operation failed
    #[error("block store error: {0}")]
    BlockStore(String),

    /// Pod volume restore failed
    #[error("pod volume restore failed: {0}")]
    PodVolume(String),

    /// An item action failed
    #[error("action failed: {0}")]
    Action(String),

    /// A document field was missing or mistyped
    #[error(transparent)]
    Field(#[from] FieldError),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// An operation ran out of time
    #[error("timed out after {seconds}s")]
    Timeout {
        /// Timeout in seconds
        seconds: u64,
    },

    /// Kubernetes API error
    #[error("kube error: {0}")]
    Kube(#[from] kube::Error),
}

impl RestoreError {
    /// Whether this error means the object is already present
    pub fn is_already_exists(&self) -> bool {
        match self {
            RestoreError::AlreadyExists { .. } => true,
            RestoreError::Kube(kube::Error::Api(resp)) => resp.code == 409,
            _ => false,
        }
    }
}

impl From<serde_json::Error> for RestoreError {
    fn from(err: serde_json::Error) -> Self {
        RestoreError::Serialization(err.to_string())
    }
}

impl From<salvage_common::Error> for RestoreError {
    fn from(err: salvage_common::Error) -> Self {
        let message = err.to_string();
        match err {
            salvage_common::Error::Kube { source } => RestoreError::Kube(source),
            salvage_common::Error::Validation { .. } => RestoreError::Validation(message),
            salvage_common::Error::Serialization { .. } => RestoreError::Serialization(message),
            salvage_common::Error::Internal { .. } => RestoreError::Client(message),
        }
    }
}
