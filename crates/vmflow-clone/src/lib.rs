//! Clone request builder
//!
//! Turns a declared [`VirtualMachineSpec`] plus live template introspection
//! into a [`CloneRequest`]: linked vs full clone, grow-only disk edits, NIC
//! replacement, storage-policy aware datastore selection, sizing defaults and
//! the bootstrap extra-config payload.

pub mod builder;
pub mod devices;
pub mod error;
pub mod extra_config;
pub mod placement;
pub mod spec;
pub mod template;

pub use builder::{CloneRequest, CloneSpecBuilder, issue_clone};
pub use error::{CloneError, ErrorKind, Result};
pub use extra_config::ExtraConfig;
pub use spec::{
    BootstrapData, BootstrapFormat, CloneMode, DiskSpec, NetworkDeviceSpec, PciDeviceSpec,
    VirtualMachineSpec,
};
