//! vSphere REST client error types

use thiserror::Error;
use vmflow_cloud::CloudError;

#[derive(Error, Debug)]
pub enum VsphereError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{status}: {message}")]
    Api { status: u16, message: String },

    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
}

impl VsphereError {
    /// Convert into the shared error, naming the operation and its target
    pub fn into_cloud(self, op: &str, target: &str) -> CloudError {
        match self {
            VsphereError::Api { status: 401, message } => CloudError::AuthenticationFailed(message),
            VsphereError::NotAuthenticated => CloudError::NotAuthenticated,
            VsphereError::InvalidConfig(message) => CloudError::InvalidConfig(message),
            other => CloudError::api(op, target, other),
        }
    }
}

pub type Result<T> = std::result::Result<T, VsphereError>;
