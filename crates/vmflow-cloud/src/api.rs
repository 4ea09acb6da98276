//! Remote management plane interfaces
//!
//! The controller talks to two APIs on the same endpoint: the SOAP-style
//! management API (inventory, clone, power, tasks) and the REST tagging API.
//! Both are abstracted here so the session, clone and controller crates can be
//! driven by any transport.

use crate::clone_spec::CloneSpec;
use crate::device::{NetworkBacking, VirtualDevice};
use crate::error::{CloudError, Result};
use crate::object::{ObjectKind, ObjectRef, PlacementHub};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use url::Url;

/// Management API of the hypervisor management endpoint
#[async_trait]
pub trait ManagementApi: Send + Sync {
    /// Log in with username and password
    async fn login(&self, username: &str, password: &str) -> Result<()>;

    /// Exchange a client certificate/key pair for a signed security token
    async fn issue_token(&self, certificate: &ClientCertificate) -> Result<SignedToken>;

    /// Log in with a signed security token
    async fn login_by_token(&self, token: &SignedToken) -> Result<()>;

    async fn logout(&self) -> Result<()>;

    /// The current user session, `None` once the session is gone
    async fn user_session(&self) -> Result<Option<UserSession>>;

    /// Lightweight call used as a keepalive probe
    async fn current_time(&self) -> Result<DateTime<Utc>>;

    /// Search by BIOS UUID (`instance_uuid == false`) or instance UUID
    async fn find_by_uuid(
        &self,
        datacenter: Option<&ObjectRef>,
        uuid: &str,
        instance_uuid: bool,
    ) -> Result<Option<ObjectRef>>;

    /// Resolve an inventory object by name or inventory path
    async fn find_by_name(
        &self,
        datacenter: Option<&ObjectRef>,
        kind: ObjectKind,
        name: &str,
    ) -> Result<ObjectRef>;

    /// The default object of a kind (folder, pool, datastore) in the datacenter
    async fn find_default(&self, datacenter: Option<&ObjectRef>, kind: ObjectKind)
    -> Result<ObjectRef>;

    async fn vm_properties(&self, vm: &ObjectRef) -> Result<VmProperties>;

    async fn network_backing(&self, network: &ObjectRef) -> Result<NetworkBacking>;

    /// The compute cluster owning a resource pool
    async fn resource_pool_owner(&self, pool: &ObjectRef) -> Result<ObjectRef>;

    async fn list_datastores(&self, cluster: &ObjectRef) -> Result<Vec<ObjectRef>>;

    /// Start a clone; returns the task reference
    async fn clone_vm(
        &self,
        template: &ObjectRef,
        folder: &ObjectRef,
        name: &str,
        spec: &CloneSpec,
    ) -> Result<ObjectRef>;

    /// Task status; `None` when the task is no longer known to the server
    async fn task_info(&self, task: &ObjectRef) -> Result<Option<TaskInfo>>;

    async fn power_on(&self, vm: &ObjectRef) -> Result<ObjectRef>;

    async fn power_off(&self, vm: &ObjectRef) -> Result<ObjectRef>;

    async fn destroy(&self, vm: &ObjectRef) -> Result<ObjectRef>;

    /// Create a client for the storage policy (compliance) service
    async fn storage_policy_client(&self) -> Result<Arc<dyn StoragePolicyApi>>;
}

/// Storage policy compliance service
#[async_trait]
pub trait StoragePolicyApi: Send + Sync {
    async fn profile_id_by_name(&self, name: &str) -> Result<String>;

    /// Return the subset of `hubs` compatible with the policy
    async fn check_compatibility(
        &self,
        profile_id: &str,
        hubs: &[PlacementHub],
    ) -> Result<Vec<PlacementHub>>;
}

/// REST tagging API
#[async_trait]
pub trait TaggingApi: Send + Sync {
    async fn login(&self, username: &str, password: &str) -> Result<()>;

    async fn login_by_token(&self, token: &SignedToken) -> Result<()>;

    /// The current REST session, `None` once it expired
    async fn session(&self) -> Result<Option<UserSession>>;

    async fn logout(&self) -> Result<()>;
}

/// Establishes unauthenticated management API connections
#[async_trait]
pub trait ManagementConnector: Send + Sync {
    async fn connect(&self, endpoint: &Endpoint) -> Result<Arc<dyn ManagementApi>>;
}

/// Establishes unauthenticated tagging API connections
#[async_trait]
pub trait TaggingConnector: Send + Sync {
    async fn connect(&self, endpoint: &Endpoint) -> Result<Arc<dyn TaggingApi>>;
}

/// Connection target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Parsed endpoint URL, without user info
    pub url: Url,
    /// Pinned TLS thumbprint; `None` means the certificate is not verified
    pub thumbprint: Option<String>,
    pub user_agent: String,
}

impl Endpoint {
    pub fn insecure(&self) -> bool {
        self.thumbprint.is_none()
    }

    pub fn host(&self) -> &str {
        self.url.host_str().unwrap_or_default()
    }
}

/// Client certificate and private key (PEM) used for token login
#[derive(Clone, PartialEq, Eq)]
pub struct ClientCertificate {
    pub certificate_pem: String,
    pub private_key_pem: String,
}

impl ClientCertificate {
    /// Validate both halves of the pair without touching the network
    pub fn from_pem(certificate_pem: &str, private_key_pem: &str) -> Result<Self> {
        if !certificate_pem.contains("-----BEGIN CERTIFICATE-----") {
            return Err(CloudError::InvalidConfig(
                "client certificate is not a PEM encoded certificate".to_string(),
            ));
        }
        if !private_key_pem.contains("PRIVATE KEY-----") {
            return Err(CloudError::InvalidConfig(
                "client key is not a PEM encoded private key".to_string(),
            ));
        }
        Ok(Self {
            certificate_pem: certificate_pem.to_string(),
            private_key_pem: private_key_pem.to_string(),
        })
    }
}

impl std::fmt::Debug for ClientCertificate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientCertificate")
            .field("certificate_pem", &"<redacted>")
            .field("private_key_pem", &"<redacted>")
            .finish()
    }
}

/// Signed security token issued by the token service
#[derive(Clone, PartialEq, Eq)]
pub struct SignedToken {
    pub assertion: String,
    pub expires_at: Option<DateTime<Utc>>,
}

impl std::fmt::Debug for SignedToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignedToken")
            .field("assertion", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// An active login session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSession {
    pub key: String,
    pub user_name: String,
    pub login_time: DateTime<Utc>,
}

/// Result of a credential check against the management endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthStatus {
    pub authenticated: bool,
    /// Logged in user, when authenticated
    pub account_info: Option<String>,
    pub error: Option<String>,
}

impl AuthStatus {
    pub fn ok(account_info: impl Into<String>) -> Self {
        Self {
            authenticated: true,
            account_info: Some(account_info.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            authenticated: false,
            account_info: None,
            error: Some(error.into()),
        }
    }
}

/// Power state of a VM
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PowerState {
    PoweredOn,
    PoweredOff,
    Suspended,
}

impl std::fmt::Display for PowerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PowerState::PoweredOn => write!(f, "poweredOn"),
            PowerState::PoweredOff => write!(f, "poweredOff"),
            PowerState::Suspended => write!(f, "suspended"),
        }
    }
}

/// Snapshot tree node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotTree {
    pub snapshot: ObjectRef,
    pub name: String,
    pub children: Vec<SnapshotTree>,
}

/// Snapshot information of a VM
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SnapshotInfo {
    pub current: Option<ObjectRef>,
    pub root: Vec<SnapshotTree>,
}

impl SnapshotInfo {
    /// Find a snapshot by name anywhere in the tree
    ///
    /// A name matching more than one snapshot is an error.
    pub fn find_by_name(&self, name: &str) -> Result<ObjectRef> {
        fn walk<'a>(nodes: &'a [SnapshotTree], name: &str, found: &mut Vec<&'a ObjectRef>) {
            for node in nodes {
                if node.name == name {
                    found.push(&node.snapshot);
                }
                walk(&node.children, name, found);
            }
        }

        let mut found = Vec::new();
        walk(&self.root, name, &mut found);
        match found.as_slice() {
            [] => Err(CloudError::not_found(ObjectKind::VirtualMachineSnapshot, name)),
            [one] => Ok((*one).clone()),
            _ => Err(CloudError::MultipleFound {
                kind: ObjectKind::VirtualMachineSnapshot.to_string(),
                name: name.to_string(),
            }),
        }
    }
}

/// Guest-reported NIC
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GuestNic {
    pub mac_address: String,
    pub network: Option<String>,
    pub ip_addresses: Vec<String>,
    pub connected: bool,
}

/// Guest-reported information
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GuestInfo {
    pub ip_address: Option<String>,
    pub host_name: Option<String>,
    pub nics: Vec<GuestNic>,
}

/// Properties of a VM or template
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VmProperties {
    pub name: String,
    pub instance_uuid: String,
    pub bios_uuid: Option<String>,
    pub power_state: PowerState,
    pub template: bool,
    pub devices: Vec<VirtualDevice>,
    pub snapshot: Option<SnapshotInfo>,
    pub guest: GuestInfo,
}

/// State of a server-side task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Queued,
    Running,
    Success,
    Error,
}

impl TaskState {
    pub fn is_done(&self) -> bool {
        matches!(self, TaskState::Success | TaskState::Error)
    }
}

/// Server-side task information
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskInfo {
    pub task: ObjectRef,
    pub description_id: String,
    pub state: TaskState,
    pub entity: Option<ObjectRef>,
    pub result: Option<ObjectRef>,
    pub error: Option<String>,
}
