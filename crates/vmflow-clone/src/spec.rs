//! Declared virtual machine

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Requested clone mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CloneMode {
    /// Child of a template snapshot
    #[serde(rename = "linkedClone")]
    Linked,
    /// Independent copy of the template disks
    #[serde(rename = "fullClone")]
    Full,
}

impl CloneMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            CloneMode::Linked => "linkedClone",
            CloneMode::Full => "fullClone",
        }
    }
}

impl std::fmt::Display for CloneMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-disk size request, by template disk index
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiskSpec {
    /// Zero keeps the template size
    #[serde(default)]
    pub size_gib: u32,
}

/// One virtual NIC
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkDeviceSpec {
    pub network_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mac_addr: Option<String>,
}

/// PCI passthrough device
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PciDeviceSpec {
    pub device_id: Option<i32>,
    pub vendor_id: Option<i32>,
}

/// Declared virtual machine
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualMachineSpec {
    #[serde(default)]
    pub name: String,
    /// Unique ID of the declared resource; becomes the instance UUID
    #[serde(default)]
    pub uid: String,
    /// Template instance UUID or name/inventory path
    pub template: String,
    #[serde(default)]
    pub clone_mode: Option<CloneMode>,
    #[serde(default)]
    pub snapshot: Option<String>,
    #[serde(default)]
    pub folder: Option<String>,
    #[serde(default)]
    pub resource_pool: Option<String>,
    #[serde(default)]
    pub datastore: Option<String>,
    #[serde(default)]
    pub storage_policy_name: Option<String>,

    /// Legacy primary disk size
    #[serde(default, rename = "diskGiB")]
    pub disk_gib: Option<u32>,
    /// Legacy sizes of the template's additional disks, by index
    #[serde(default, rename = "additionalDisksGiB")]
    pub additional_disks_gib: Vec<u32>,
    /// Per-disk sizes, by template disk index
    #[serde(default)]
    pub disks: Vec<DiskSpec>,

    #[serde(default)]
    pub network: Vec<NetworkDeviceSpec>,

    #[serde(default)]
    pub num_cpus: i32,
    #[serde(default)]
    pub num_cores_per_socket: i32,
    #[serde(default, rename = "memoryMiB")]
    pub memory_mib: i64,
    #[serde(default)]
    pub memory_reservation_locked_to_max: Option<bool>,
    #[serde(default)]
    pub pci_devices: Vec<PciDeviceSpec>,
    #[serde(default)]
    pub custom_vmx_keys: BTreeMap<String, String>,
}

impl VirtualMachineSpec {
    pub fn uses_legacy_disks(&self) -> bool {
        self.disk_gib.is_some() || !self.additional_disks_gib.is_empty()
    }

    /// Requested capacity of template disk `index` in KiB; zero keeps the template size
    pub fn requested_disk_kib(&self, index: usize) -> i64 {
        let gib = if !self.disks.is_empty() {
            self.disks.get(index).map(|d| d.size_gib).unwrap_or(0)
        } else if index == 0 {
            self.disk_gib.unwrap_or(0)
        } else {
            self.additional_disks_gib
                .get(index - 1)
                .copied()
                .unwrap_or(0)
        };
        i64::from(gib) * 1024 * 1024
    }
}

/// Format of the bootstrap payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BootstrapFormat {
    #[serde(rename = "cloud-config")]
    CloudConfig,
    Ignition,
}

/// Bootstrap payload handed to the guest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapData {
    pub value: Vec<u8>,
    pub format: BootstrapFormat,
}
