//! Session error types

use thiserror::Error;
use vmflow_cloud::CloudError;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Invalid server address {server:?}: {reason}")]
    InvalidServer { server: String, reason: String },

    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("Login to {server} failed: {source}")]
    Login {
        server: String,
        #[source]
        source: CloudError,
    },

    #[error("Unable to find datacenter {name:?}: {source}")]
    Datacenter {
        name: String,
        #[source]
        source: CloudError,
    },

    #[error(transparent)]
    Cloud(#[from] CloudError),
}

impl SessionError {
    /// Errors caused by the caller's parameters rather than the remote side
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            SessionError::InvalidServer { .. } | SessionError::InvalidCredentials(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, SessionError>;
