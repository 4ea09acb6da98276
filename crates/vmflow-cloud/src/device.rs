//! Virtual device model and device-change operations

use crate::object::ObjectRef;
use serde::{Deserialize, Serialize};

/// A virtual device attached to a VM or template
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum VirtualDevice {
    Disk(VirtualDisk),
    EthernetCard(VirtualEthernetCard),
    Other { key: i32, label: String },
}

impl VirtualDevice {
    pub fn key(&self) -> i32 {
        match self {
            VirtualDevice::Disk(d) => d.key,
            VirtualDevice::EthernetCard(n) => n.key,
            VirtualDevice::Other { key, .. } => *key,
        }
    }

    pub fn as_disk(&self) -> Option<&VirtualDisk> {
        match self {
            VirtualDevice::Disk(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_ethernet_card(&self) -> Option<&VirtualEthernetCard> {
        match self {
            VirtualDevice::EthernetCard(n) => Some(n),
            _ => None,
        }
    }
}

/// Virtual disk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VirtualDisk {
    pub key: i32,
    pub label: String,
    pub capacity_kib: i64,
    pub backing: DiskBacking,
}

/// Flat-file backing of a virtual disk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiskBacking {
    pub file_name: String,
    pub datastore: Option<ObjectRef>,
    pub thin_provisioned: bool,
}

/// Virtual NIC
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VirtualEthernetCard {
    pub key: i32,
    pub card_type: EthernetCardType,
    pub backing: NetworkBacking,
    pub mac_address: Option<String>,
    pub address_type: MacAddressType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EthernetCardType {
    Vmxnet3,
    E1000,
    E1000e,
}

impl std::fmt::Display for EthernetCardType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EthernetCardType::Vmxnet3 => write!(f, "vmxnet3"),
            EthernetCardType::E1000 => write!(f, "e1000"),
            EthernetCardType::E1000e => write!(f, "e1000e"),
        }
    }
}

/// How a NIC's MAC address is assigned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MacAddressType {
    /// Generated by the management plane
    Generated,
    /// Set explicitly by the caller
    Manual,
    /// Assigned by the hypervisor host
    Assigned,
}

/// Network backing resolved from a network object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NetworkBacking {
    Standard {
        device_name: String,
        network: ObjectRef,
    },
    DistributedPort {
        switch_uuid: String,
        portgroup_key: String,
    },
    Opaque {
        network_id: String,
        network_type: String,
    },
}

/// Operation applied to a device by a reconfigure/clone request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceOperation {
    Add,
    Edit,
    Remove,
}

impl std::fmt::Display for DeviceOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceOperation::Add => write!(f, "add"),
            DeviceOperation::Edit => write!(f, "edit"),
            DeviceOperation::Remove => write!(f, "remove"),
        }
    }
}

/// A single device change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceChange {
    pub operation: DeviceOperation,
    pub device: VirtualDevice,
}

impl DeviceChange {
    pub fn add(device: VirtualDevice) -> Self {
        Self {
            operation: DeviceOperation::Add,
            device,
        }
    }

    pub fn edit(device: VirtualDevice) -> Self {
        Self {
            operation: DeviceOperation::Edit,
            device,
        }
    }

    pub fn remove(device: VirtualDevice) -> Self {
        Self {
            operation: DeviceOperation::Remove,
            device,
        }
    }
}

/// Count of device changes by operation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceChangeSummary {
    pub add: usize,
    pub edit: usize,
    pub remove: usize,
}

impl DeviceChangeSummary {
    pub fn of(changes: &[DeviceChange]) -> Self {
        let mut summary = Self::default();
        for change in changes {
            match change.operation {
                DeviceOperation::Add => summary.add += 1,
                DeviceOperation::Edit => summary.edit += 1,
                DeviceOperation::Remove => summary.remove += 1,
            }
        }
        summary
    }
}

impl std::fmt::Display for DeviceChangeSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} to add, {} to edit, {} to remove",
            self.add, self.edit, self.remove
        )
    }
}

/// Select every disk of a device list, in device order
pub fn disks(devices: &[VirtualDevice]) -> Vec<&VirtualDisk> {
    devices.iter().filter_map(VirtualDevice::as_disk).collect()
}

/// Select every NIC of a device list, in device order
pub fn ethernet_cards(devices: &[VirtualDevice]) -> Vec<&VirtualEthernetCard> {
    devices
        .iter()
        .filter_map(VirtualDevice::as_ethernet_card)
        .collect()
}
