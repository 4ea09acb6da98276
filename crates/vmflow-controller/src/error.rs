//! Provisioning error types

use crate::meta::ObjectKey;
use crate::store::StoreError;
use thiserror::Error;
use vmflow_clone::{CloneError, ErrorKind};
use vmflow_cloud::CloudError;
use vmflow_session::SessionError;

#[derive(Error, Debug)]
pub enum ProvisionError {
    #[error("missing kubernetes version for Machine {0}")]
    MissingVersion(ObjectKey),

    #[error("Invalid bootstrap data in secret {secret}: {reason}")]
    InvalidBootstrapData { secret: ObjectKey, reason: String },

    /// The VM service reported a precondition as failed
    #[error("VM {vm} precondition {condition} failed: {reason}: {message}")]
    PreconditionFailed {
        vm: ObjectKey,
        condition: String,
        reason: String,
        message: String,
    },

    #[error("BIOS UUID of {machine} changed from {recorded} to {observed}")]
    BiosUuidChanged {
        machine: ObjectKey,
        recorded: String,
        observed: String,
    },

    #[error("Unable to find VM by BIOS UUID {uuid}; the VM was removed from the hypervisor")]
    VmRemoved { uuid: String },

    #[error("unexpected power state {state} for VM {vm}")]
    UnexpectedPowerState { vm: String, state: String },

    #[error("Network provider {provider} failed: {message}")]
    Network { provider: String, message: String },

    #[error("{op} {target}: {source}")]
    Remote {
        op: &'static str,
        target: String,
        #[source]
        source: CloudError,
    },

    #[error(transparent)]
    Clone(#[from] CloneError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Template error: {0}")]
    Template(#[from] tera::Error),
}

impl ProvisionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProvisionError::MissingVersion(_)
            | ProvisionError::InvalidBootstrapData { .. }
            | ProvisionError::PreconditionFailed { .. }
            | ProvisionError::VmRemoved { .. } => ErrorKind::Configuration,
            ProvisionError::BiosUuidChanged { .. } | ProvisionError::Template(_) => {
                ErrorKind::Internal
            }
            ProvisionError::Clone(e) => e.kind(),
            ProvisionError::Session(e) if e.is_configuration() => ErrorKind::Configuration,
            ProvisionError::Remote {
                source: CloudError::InvalidConfig(_),
                ..
            } => ErrorKind::Configuration,
            ProvisionError::Session(_)
            | ProvisionError::Remote { .. }
            | ProvisionError::Store(_)
            | ProvisionError::Network { .. }
            | ProvisionError::UnexpectedPowerState { .. } => ErrorKind::Transient,
        }
    }
}

/// Wrap a remote failure with the operation and its target
pub(crate) fn remote(
    op: &'static str,
    target: impl ToString,
) -> impl FnOnce(CloudError) -> ProvisionError {
    let target = target.to_string();
    move |source| ProvisionError::Remote { op, target, source }
}

pub type Result<T> = std::result::Result<T, ProvisionError>;
