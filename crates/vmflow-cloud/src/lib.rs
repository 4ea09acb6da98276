//! vmflow management plane abstraction
//!
//! This crate models the remote hypervisor management endpoint that vmflow
//! drives: managed object references, the virtual device model, the clone
//! request wire types and the API traits the session, clone and controller
//! crates are written against.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                vmflow-controller                 │
//! │        (provisioning state machine)              │
//! └───────┬─────────────────────────┬───────────────┘
//!         │                         │
//! ┌───────▼───────┐         ┌───────▼───────┐
//! │ vmflow-clone  │────────▶│vmflow-session │
//! └───────┬───────┘         └───────┬───────┘
//!         │                         │
//! ┌───────▼─────────────────────────▼───────────────┐
//! │                  vmflow-cloud                    │
//! │  trait ManagementApi / TaggingApi / ...          │
//! └───────┬─────────────────────────┬───────────────┘
//!         │                         │
//! ┌───────▼───────┐         ┌───────▼───────┐
//! │ vmflow-cloud- │         │  fake (tests) │
//! │    vsphere    │         │               │
//! └───────────────┘         └───────────────┘
//! ```

pub mod api;
pub mod clone_spec;
pub mod device;
pub mod error;
#[cfg(any(test, feature = "test-utils"))]
pub mod fake;
pub mod object;

// Re-exports
pub use api::{
    AuthStatus, ClientCertificate, Endpoint, GuestInfo, GuestNic, ManagementApi, ManagementConnector,
    PowerState, SignedToken, SnapshotInfo, SnapshotTree, StoragePolicyApi, TaggingApi,
    TaggingConnector, TaskInfo, TaskState, UserSession, VmProperties,
};
pub use clone_spec::{CloneSpec, ConfigSpec, DiskLocator, DiskMoveType, OptionValue, RelocateSpec};
pub use device::{
    DeviceChange, DeviceChangeSummary, DeviceOperation, DiskBacking, EthernetCardType,
    MacAddressType, NetworkBacking, VirtualDevice, VirtualDisk, VirtualEthernetCard,
};
pub use error::{CloudError, Result};
pub use object::{ObjectKind, ObjectRef, PlacementHub};
