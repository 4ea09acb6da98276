//! Clone builder error types

use thiserror::Error;
use vmflow_cloud::CloudError;

/// How an error should be handled by whoever drives the builder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The declared resource is wrong; retrying will not help
    Configuration,
    /// No valid placement exists for the declared resource
    Placement,
    /// Remote or network failure; retry later
    Transient,
    /// A bug in request construction
    Internal,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Configuration => write!(f, "configuration"),
            ErrorKind::Placement => write!(f, "placement"),
            ErrorKind::Transient => write!(f, "transient"),
            ErrorKind::Internal => write!(f, "internal"),
        }
    }
}

#[derive(Error, Debug)]
pub enum CloneError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(
        "can't resize template disk down, initial capacity is larger: {template_kib}KiB > {requested_kib}KiB"
    )]
    DiskDownsize { template_kib: i64, requested_kib: i64 },

    #[error("Invalid disk count: {0}")]
    InvalidDiskCount(usize),

    #[error("no compatible datastores found for storage policy: {policy}")]
    NoCompatibleDatastore { policy: String },

    #[error("{op} {target}: {source}")]
    Remote {
        op: &'static str,
        target: String,
        #[source]
        source: CloudError,
    },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CloneError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CloneError::InvalidConfig(_) | CloneError::InvalidDiskCount(_) => {
                ErrorKind::Configuration
            }
            CloneError::DiskDownsize { .. } | CloneError::NoCompatibleDatastore { .. } => {
                ErrorKind::Placement
            }
            CloneError::Remote { source, .. } if source.is_not_found() => ErrorKind::Configuration,
            CloneError::Remote { source, .. } => match source {
                CloudError::InvalidConfig(_) => ErrorKind::Configuration,
                _ => ErrorKind::Transient,
            },
            CloneError::Internal(_) => ErrorKind::Internal,
        }
    }
}

/// Wrap a remote failure with the operation and its target
pub(crate) fn remote(op: &'static str, target: impl ToString) -> impl FnOnce(CloudError) -> CloneError {
    let target = target.to_string();
    move |source| CloneError::Remote { op, target, source }
}

pub type Result<T> = std::result::Result<T, CloneError>;
