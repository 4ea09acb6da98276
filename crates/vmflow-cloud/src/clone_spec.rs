//! Clone request wire types
//!
//! A [`CloneSpec`] is the single payload handed to
//! [`ManagementApi::clone_vm`](crate::api::ManagementApi::clone_vm).

use crate::device::{DeviceChange, DiskBacking};
use crate::object::ObjectRef;
use serde::{Deserialize, Serialize};

/// Full clone request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloneSpec {
    pub config: ConfigSpec,
    pub location: RelocateSpec,
    /// Always false: power-on is a separate step so MAC addresses exist
    /// before bootstrap metadata referencing them is injected.
    pub power_on: bool,
    /// Snapshot to clone from; presence means a linked clone
    pub snapshot: Option<ObjectRef>,
}

impl CloneSpec {
    pub fn is_linked_clone(&self) -> bool {
        self.snapshot.is_some()
    }
}

/// Hardware and configuration of the new VM
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigSpec {
    /// Instance UUID assigned up front so the VM can be found before its BIOS UUID exists
    pub instance_uuid: String,
    pub disk_uuid_enabled: bool,
    pub device_change: Vec<DeviceChange>,
    pub extra_config: Vec<OptionValue>,
    pub num_cpus: i32,
    pub num_cores_per_socket: i32,
    pub memory_mib: i64,
    pub memory_reservation_locked_to_max: Option<bool>,
    pub vapp_config_removed: bool,
}

/// Where the clone lands
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelocateSpec {
    pub disk_move_type: DiskMoveType,
    pub folder: ObjectRef,
    pub pool: ObjectRef,
    pub datastore: Option<ObjectRef>,
    pub disks: Vec<DiskLocator>,
}

/// Per-disk placement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiskLocator {
    pub disk_id: i32,
    pub disk_move_type: DiskMoveType,
    pub datastore: ObjectRef,
    pub backing: Option<DiskBacking>,
}

/// How disk backings are treated when relocating
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiskMoveType {
    #[serde(rename = "moveAllDiskBackingsAndConsolidate")]
    MoveAllDiskBackingsAndConsolidate,
    #[serde(rename = "createNewChildDiskBacking")]
    CreateNewChildDiskBacking,
    #[serde(rename = "moveAllDiskBackingsAndDisallowSharing")]
    MoveAllDiskBackingsAndDisallowSharing,
}

impl DiskMoveType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiskMoveType::MoveAllDiskBackingsAndConsolidate => "moveAllDiskBackingsAndConsolidate",
            DiskMoveType::CreateNewChildDiskBacking => "createNewChildDiskBacking",
            DiskMoveType::MoveAllDiskBackingsAndDisallowSharing => {
                "moveAllDiskBackingsAndDisallowSharing"
            }
        }
    }
}

impl std::fmt::Display for DiskMoveType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Key/value pair of the extra-config payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionValue {
    pub key: String,
    pub value: String,
}

impl OptionValue {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disk_move_type_wire_name() {
        let json = serde_json::to_string(&DiskMoveType::CreateNewChildDiskBacking).unwrap();
        assert_eq!(json, "\"createNewChildDiskBacking\"");
        assert_eq!(
            DiskMoveType::MoveAllDiskBackingsAndConsolidate.to_string(),
            "moveAllDiskBackingsAndConsolidate"
        );
    }
}
