//! Managed object references

use serde::{Deserialize, Serialize};

/// Type of a managed object on the management plane
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectKind {
    Datacenter,
    Folder,
    ResourcePool,
    ClusterComputeResource,
    HostSystem,
    Datastore,
    Network,
    VirtualMachine,
    VirtualMachineSnapshot,
    Task,
}

impl ObjectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectKind::Datacenter => "Datacenter",
            ObjectKind::Folder => "Folder",
            ObjectKind::ResourcePool => "ResourcePool",
            ObjectKind::ClusterComputeResource => "ClusterComputeResource",
            ObjectKind::HostSystem => "HostSystem",
            ObjectKind::Datastore => "Datastore",
            ObjectKind::Network => "Network",
            ObjectKind::VirtualMachine => "VirtualMachine",
            ObjectKind::VirtualMachineSnapshot => "VirtualMachineSnapshot",
            ObjectKind::Task => "Task",
        }
    }
}

impl std::fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reference to a managed object (type + server-assigned value such as `vm-42`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectRef {
    pub kind: ObjectKind,
    pub value: String,
}

impl ObjectRef {
    pub fn new(kind: ObjectKind, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
        }
    }

    pub fn is(&self, kind: ObjectKind) -> bool {
        self.kind == kind
    }
}

impl std::fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind, self.value)
    }
}

/// A placement candidate handed to the storage policy service
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlacementHub {
    pub hub_type: String,
    pub hub_id: String,
}

impl From<&ObjectRef> for PlacementHub {
    fn from(r: &ObjectRef) -> Self {
        Self {
            hub_type: r.kind.as_str().to_string(),
            hub_id: r.value.clone(),
        }
    }
}

impl PlacementHub {
    /// Convert back into a datastore reference
    pub fn to_datastore_ref(&self) -> ObjectRef {
        ObjectRef::new(ObjectKind::Datastore, self.hub_id.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let r = ObjectRef::new(ObjectKind::Datastore, "datastore-12");
        assert_eq!(r.to_string(), "Datastore:datastore-12");
        assert!(r.is(ObjectKind::Datastore));
    }

    #[test]
    fn test_placement_hub_from_ref() {
        let r = ObjectRef::new(ObjectKind::Datastore, "datastore-7");
        let hub = PlacementHub::from(&r);
        assert_eq!(hub.hub_type, "Datastore");
        assert_eq!(hub.hub_id, "datastore-7");
        assert_eq!(hub.to_datastore_ref(), r);
    }
}
