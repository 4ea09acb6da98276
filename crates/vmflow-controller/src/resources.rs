//! Declared and observed resources handled by the machine services

use crate::conditions::Conditions;
use crate::meta::{CONTROL_PLANE_LABEL, MACHINE_DEPLOYMENT_NAME_LABEL, ObjectMeta, impl_object};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use vmflow_clone::{CloneMode, VirtualMachineSpec};

/// Lifecycle phase of a managed VM
///
/// `Pending < Created < PoweredOn < Ready` is the forward order; the
/// remaining phases are only entered on request or failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum VmPhase {
    #[default]
    #[serde(rename = "pending")]
    Pending,
    #[serde(rename = "created")]
    Created,
    #[serde(rename = "poweredOn")]
    PoweredOn,
    #[serde(rename = "ready")]
    Ready,
    #[serde(rename = "deleting")]
    Deleting,
    #[serde(rename = "notfound")]
    NotFound,
    #[serde(rename = "error")]
    Error,
}

impl VmPhase {
    /// Phase after observing `observed`
    ///
    /// Forward phases never move backward. A machine parked in one of the
    /// request or failure phases takes whatever is observed next.
    pub fn advance(self, observed: VmPhase) -> VmPhase {
        if self > VmPhase::Ready || observed > self {
            observed
        } else {
            self
        }
    }
}

impl std::fmt::Display for VmPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            VmPhase::Pending => "pending",
            VmPhase::Created => "created",
            VmPhase::PoweredOn => "poweredOn",
            VmPhase::Ready => "ready",
            VmPhase::Deleting => "deleting",
            VmPhase::NotFound => "notfound",
            VmPhase::Error => "error",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Cluster
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiEndpoint {
    pub host: String,
    pub port: u16,
}

impl std::fmt::Display for ApiEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSpec {
    #[serde(default)]
    pub control_plane_endpoint: Option<ApiEndpoint>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterStatus {
    #[serde(default)]
    pub control_plane_ready: bool,
}

/// Workload cluster owning the machines
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: ClusterSpec,
    #[serde(default)]
    pub status: ClusterStatus,
}
impl_object!(Cluster, "Cluster");

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VSphereClusterStatus {
    #[serde(default)]
    pub resource_policy_name: Option<String>,
    /// Failure domains known to the cluster
    #[serde(default)]
    pub failure_domains: Vec<String>,
}

/// Infrastructure side of a cluster
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VSphereCluster {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub status: VSphereClusterStatus,
}
impl_object!(VSphereCluster, "VSphereCluster");

// ---------------------------------------------------------------------------
// Machines
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bootstrap {
    /// Secret holding the bootstrap payload once the bootstrap provider is done
    #[serde(default)]
    pub data_secret_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MachineSpec {
    pub cluster_name: String,
    /// Kubernetes version the node runs
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub bootstrap: Bootstrap,
    #[serde(default)]
    pub failure_domain: Option<String>,
}

/// Cluster-level machine; owner of the infrastructure machine
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Machine {
    pub metadata: ObjectMeta,
    pub spec: MachineSpec,
}
impl_object!(Machine, "Machine");

impl Machine {
    pub fn is_control_plane(&self) -> bool {
        self.metadata.labels.contains_key(CONTROL_PLANE_LABEL)
    }

    pub fn machine_deployment(&self) -> Option<&str> {
        self.metadata.label(MACHINE_DEPLOYMENT_NAME_LABEL)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MachineDeploymentSpec {
    pub cluster_name: String,
    /// Failure domain pinned by the user, if any
    #[serde(default)]
    pub failure_domain: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MachineDeployment {
    pub metadata: ObjectMeta,
    pub spec: MachineDeploymentSpec,
}
impl_object!(MachineDeployment, "MachineDeployment");

/// Opaque key/value payload, e.g. bootstrap data
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Secret {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub data: BTreeMap<String, String>,
}
impl_object!(Secret, "Secret");

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigMap {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub data: BTreeMap<String, String>,
}
impl_object!(ConfigMap, "ConfigMap");

// ---------------------------------------------------------------------------
// Network status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IpAddressStatus {
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DhcpStatus {
    #[serde(default)]
    pub ip4_enabled: bool,
    #[serde(default)]
    pub ip6_enabled: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DnsStatus {
    #[serde(default)]
    pub dhcp: bool,
    #[serde(default)]
    pub host_name: Option<String>,
    #[serde(default)]
    pub domain_name: Option<String>,
    #[serde(default)]
    pub nameservers: Vec<String>,
    #[serde(default)]
    pub search_domains: Vec<String>,
}

/// Observed state of one network interface
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterfaceStatus {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub device_key: i32,
    #[serde(default)]
    pub mac_addr: Option<String>,
    #[serde(default)]
    pub addresses: Vec<IpAddressStatus>,
    #[serde(default)]
    pub dhcp: Option<DhcpStatus>,
    #[serde(default)]
    pub dns: Option<DnsStatus>,
}

// ---------------------------------------------------------------------------
// Managed VM service machine
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MachineVolume {
    pub name: String,
    /// Requested size, e.g. "10Gi"
    pub capacity: String,
    #[serde(default)]
    pub storage_class: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VSphereMachineSpec {
    #[serde(default)]
    pub provider_id: Option<String>,
    #[serde(default)]
    pub failure_domain: Option<String>,
    pub image_name: String,
    pub class_name: String,
    #[serde(default)]
    pub storage_class: String,
    #[serde(default)]
    pub volumes: Vec<MachineVolume>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VSphereMachineStatus {
    #[serde(default)]
    pub ready: bool,
    /// BIOS UUID of the VM
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub ip_addr: Option<String>,
    #[serde(default)]
    pub vm_status: VmPhase,
    #[serde(default)]
    pub network: Vec<InterfaceStatus>,
    #[serde(default)]
    pub conditions: Conditions,
}

/// Infrastructure machine realised through the managed VM service
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VSphereMachine {
    pub metadata: ObjectMeta,
    pub spec: VSphereMachineSpec,
    #[serde(default)]
    pub status: VSphereMachineStatus,
}
impl_object!(VSphereMachine, "VSphereMachine");

// ---------------------------------------------------------------------------
// Direct-hypervisor machine
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VimMachineSpec {
    #[serde(default)]
    pub provider_id: Option<String>,
    #[serde(default)]
    pub failure_domain: Option<String>,
    /// Clone parameters; name and uid are taken from the object metadata
    pub vm: VirtualMachineSpec,
}

/// One guest NIC as reported by the hypervisor
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkStatus {
    #[serde(default)]
    pub connected: bool,
    #[serde(default)]
    pub ip_addrs: Vec<String>,
    pub mac_addr: String,
    #[serde(default)]
    pub network_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VimMachineStatus {
    #[serde(default)]
    pub ready: bool,
    #[serde(default)]
    pub phase: VmPhase,
    /// In-flight task; persisted as soon as the task is issued
    #[serde(default)]
    pub task_ref: Option<String>,
    #[serde(default)]
    pub vm_ref: Option<String>,
    /// Set at clone time, before the VM is known to exist
    #[serde(default)]
    pub instance_uuid: Option<String>,
    #[serde(default)]
    pub bios_uuid: Option<String>,
    #[serde(default)]
    pub clone_mode: Option<CloneMode>,
    #[serde(default)]
    pub snapshot: Option<String>,
    #[serde(default)]
    pub addresses: Vec<String>,
    #[serde(default)]
    pub network: Vec<NetworkStatus>,
    #[serde(default)]
    pub failure_message: Option<String>,
    #[serde(default)]
    pub conditions: Conditions,
}

/// Infrastructure machine cloned directly on the hypervisor
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VimMachine {
    pub metadata: ObjectMeta,
    pub spec: VimMachineSpec,
    #[serde(default)]
    pub status: VimMachineStatus,
}
impl_object!(VimMachine, "VimMachine");

// ---------------------------------------------------------------------------
// Objects owned by the managed VM service
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum VmPowerState {
    #[default]
    PoweredOff,
    PoweredOn,
    Suspended,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VmMetadata {
    pub config_map_name: String,
    pub transport: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadinessProbe {
    pub tcp_port: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VmVolume {
    pub name: String,
    pub claim_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VmNetworkInterface {
    pub name: String,
    pub network_name: String,
    #[serde(default)]
    pub network_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LabelSelectorOperator {
    In,
    NotIn,
    Exists,
    DoesNotExist,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelSelectorRequirement {
    pub key: String,
    pub operator: LabelSelectorOperator,
    #[serde(default)]
    pub values: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelSelector {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub match_labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub match_expressions: Vec<LabelSelectorRequirement>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AffinityTerm {
    pub label_selector: LabelSelector,
    pub topology_key: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VmAffinity {
    #[serde(default)]
    pub required_during_scheduling_preferred_during_execution: Vec<AffinityTerm>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VmAntiAffinity {
    #[serde(default)]
    pub preferred_during_scheduling_preferred_during_execution: Vec<AffinityTerm>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AffinitySpec {
    #[serde(default)]
    pub vm_affinity: Option<VmAffinity>,
    #[serde(default)]
    pub vm_anti_affinity: Option<VmAntiAffinity>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualMachineObjectSpec {
    #[serde(default)]
    pub image_name: String,
    #[serde(default)]
    pub class_name: String,
    #[serde(default)]
    pub storage_class: String,
    #[serde(default)]
    pub power_state: VmPowerState,
    #[serde(default)]
    pub resource_policy_name: Option<String>,
    #[serde(default)]
    pub vm_metadata: Option<VmMetadata>,
    #[serde(default)]
    pub readiness_probe: Option<ReadinessProbe>,
    #[serde(default)]
    pub volumes: Vec<VmVolume>,
    #[serde(default)]
    pub network_interfaces: Vec<VmNetworkInterface>,
    #[serde(default)]
    pub affinity: Option<AffinitySpec>,
    #[serde(default)]
    pub group_name: Option<String>,
}

/// A precondition reported by the managed VM service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VmCondition {
    #[serde(rename = "type")]
    pub type_: String,
    pub status: bool,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualMachineObjectStatus {
    #[serde(default)]
    pub created: bool,
    #[serde(default)]
    pub power_state: Option<VmPowerState>,
    #[serde(default)]
    pub vm_ip: Option<String>,
    #[serde(default)]
    pub bios_uuid: Option<String>,
    #[serde(default)]
    pub zone: Option<String>,
    #[serde(default)]
    pub conditions: Vec<VmCondition>,
    #[serde(default)]
    pub interfaces: Vec<InterfaceStatus>,
}

/// VM object of the managed VM service
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VirtualMachine {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: VirtualMachineObjectSpec,
    #[serde(default)]
    pub status: VirtualMachineObjectStatus,
}
impl_object!(VirtualMachine, "VirtualMachine");

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistentVolumeClaimSpec {
    pub storage_class_name: String,
    pub access_modes: Vec<String>,
    pub capacity: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistentVolumeClaim {
    pub metadata: ObjectMeta,
    pub spec: PersistentVolumeClaimSpec,
}
impl_object!(PersistentVolumeClaim, "PersistentVolumeClaim");

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupMember {
    pub name: String,
    pub kind: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualMachineGroupSpec {
    #[serde(default)]
    pub members: Vec<GroupMember>,
}

/// Placement group shared by the VMs of one cluster
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VirtualMachineGroup {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: VirtualMachineGroupSpec,
}
impl_object!(VirtualMachineGroup, "VirtualMachineGroup");

impl VirtualMachineGroup {
    pub fn has_member(&self, name: &str) -> bool {
        self.spec
            .members
            .iter()
            .any(|m| m.kind == VirtualMachine::KIND_NAME && m.name == name)
    }
}

impl VirtualMachine {
    pub const KIND_NAME: &'static str = "VirtualMachine";
}
