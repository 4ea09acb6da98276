//! Machine provisioning state machine
//!
//! Tracks a VM through `Pending → Created → PoweredOn → Ready` (plus the
//! `Deleting`/`NotFound`/`Error` phases) in two deployment modes:
//!
//! - [`SupervisorMachineService`]: keeps a VM object of a managed VM service
//!   in line with the declared machine, including bootstrap config, volume
//!   claims, placement-group gating and affinity
//! - [`VimMachineService`]: clones and powers on the VM directly on the
//!   hypervisor, persisting every in-flight task reference eagerly
//!
//! Every reconcile is level-triggered: the phase and conditions are derived
//! from observed state and a reconcile with no remote change is a no-op.

pub mod affinity;
pub mod bootstrap;
pub mod conditions;
pub mod context;
pub mod error;
pub mod meta;
pub mod network;
pub mod provisioner;
pub mod resources;
pub mod store;
pub mod supervisor;
pub mod vim;
pub mod volumes;

pub use conditions::{Condition, Conditions, Severity};
pub use context::{ClusterContext, MachineContext, SupervisorMachineContext, VimMachineContext};
pub use error::{ProvisionError, Result};
pub use meta::{Object, ObjectKey, ObjectMeta};
pub use network::{
    DummyLbNetworkProvider, DummyNetworkProvider, NamedNetworkProvider, NetworkProvider,
};
pub use provisioner::{MACHINE_FINALIZER, Provisioner};
pub use resources::VmPhase;
pub use store::{Client, Patcher, Store, StoreError};
pub use supervisor::SupervisorMachineService;
pub use vim::VimMachineService;

#[cfg(any(test, feature = "test-utils"))]
pub use store::MemoryStore;
