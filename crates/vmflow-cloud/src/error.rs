//! Management plane error types

use thiserror::Error;

/// Errors returned by the remote management plane and its clients
#[derive(Error, Debug)]
pub enum CloudError {
    #[error("{kind} {name:?} not found")]
    NotFound { kind: String, name: String },

    #[error("{kind} {name:?} resolves to multiple objects")]
    MultipleFound { kind: String, name: String },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("{op} {target}: {message}")]
    Api {
        op: String,
        target: String,
        message: String,
    },

    #[error("Task {task} failed: {message}")]
    TaskFailed { task: String, message: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CloudError {
    /// Wrap a remote failure with the operation name and its target
    pub fn api(op: impl Into<String>, target: impl ToString, message: impl ToString) -> Self {
        CloudError::Api {
            op: op.into(),
            target: target.to_string(),
            message: message.to_string(),
        }
    }

    pub fn not_found(kind: impl ToString, name: impl Into<String>) -> Self {
        CloudError::NotFound {
            kind: kind.to_string(),
            name: name.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, CloudError::NotFound { .. })
    }

    /// Whether the failure is about credentials or an expired session
    pub fn is_auth(&self) -> bool {
        matches!(
            self,
            CloudError::AuthenticationFailed(_) | CloudError::NotAuthenticated
        )
    }
}

pub type Result<T> = std::result::Result<T, CloudError>;
