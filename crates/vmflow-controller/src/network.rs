//! Network providers and network status mapping

use crate::context::ClusterContext;
use crate::error::Result;
use crate::resources::{
    InterfaceStatus, NetworkStatus, VirtualMachine, VmNetworkInterface,
};
use async_trait::async_trait;
use vmflow_cloud::GuestInfo;

/// Wires the VMs of a cluster onto its network
#[async_trait]
pub trait NetworkProvider: Send + Sync {
    /// Returns the provider name
    fn name(&self) -> &str;

    fn has_load_balancer(&self) -> bool;

    fn supports_vm_readiness_probe(&self) -> bool;

    /// Idempotently ensure the VM carries the interfaces this provider needs
    async fn configure_virtual_machine(
        &self,
        cluster: &ClusterContext,
        vm: &mut VirtualMachine,
    ) -> Result<()>;
}

/// Leaves VM networking to the defaults of the VM service
#[derive(Debug, Default, Clone)]
pub struct DummyNetworkProvider;

#[async_trait]
impl NetworkProvider for DummyNetworkProvider {
    fn name(&self) -> &str {
        "dummy"
    }

    fn has_load_balancer(&self) -> bool {
        false
    }

    fn supports_vm_readiness_probe(&self) -> bool {
        false
    }

    async fn configure_virtual_machine(
        &self,
        _cluster: &ClusterContext,
        _vm: &mut VirtualMachine,
    ) -> Result<()> {
        Ok(())
    }
}

/// Like [`DummyNetworkProvider`], but an external load balancer fronts the
/// control plane
#[derive(Debug, Default, Clone)]
pub struct DummyLbNetworkProvider;

#[async_trait]
impl NetworkProvider for DummyLbNetworkProvider {
    fn name(&self) -> &str {
        "dummy-lb"
    }

    fn has_load_balancer(&self) -> bool {
        true
    }

    fn supports_vm_readiness_probe(&self) -> bool {
        true
    }

    async fn configure_virtual_machine(
        &self,
        _cluster: &ClusterContext,
        _vm: &mut VirtualMachine,
    ) -> Result<()> {
        Ok(())
    }
}

/// Attaches every VM to one named network of a fixed type
#[derive(Debug, Clone)]
pub struct NamedNetworkProvider {
    network_name: String,
    network_type: String,
}

impl NamedNetworkProvider {
    pub const DISTRIBUTED: &'static str = "vsphere-distributed";

    pub fn new(network_name: impl Into<String>, network_type: impl Into<String>) -> Self {
        Self {
            network_name: network_name.into(),
            network_type: network_type.into(),
        }
    }

    pub fn distributed(network_name: impl Into<String>) -> Self {
        Self::new(network_name, Self::DISTRIBUTED)
    }
}

#[async_trait]
impl NetworkProvider for NamedNetworkProvider {
    fn name(&self) -> &str {
        &self.network_type
    }

    fn has_load_balancer(&self) -> bool {
        true
    }

    fn supports_vm_readiness_probe(&self) -> bool {
        true
    }

    async fn configure_virtual_machine(
        &self,
        _cluster: &ClusterContext,
        vm: &mut VirtualMachine,
    ) -> Result<()> {
        let present = vm.spec.network_interfaces.iter().any(|nic| {
            nic.network_name == self.network_name
                && nic.network_type.as_deref() == Some(self.network_type.as_str())
        });
        if !present {
            let name = format!("eth{}", vm.spec.network_interfaces.len());
            vm.spec.network_interfaces.push(VmNetworkInterface {
                name,
                network_name: self.network_name.clone(),
                network_type: Some(self.network_type.clone()),
            });
        }
        Ok(())
    }
}

/// Interfaces reported by the VM service, as surfaced on the machine status
///
/// Entries are ordered by device key so the status is stable across reconciles.
pub fn machine_interfaces(vm: &VirtualMachine) -> Vec<InterfaceStatus> {
    let mut interfaces = vm.status.interfaces.clone();
    interfaces.sort_by_key(|i| i.device_key);
    interfaces
}

/// Guest NICs of a directly managed VM
pub fn guest_network_status(guest: &GuestInfo) -> Vec<NetworkStatus> {
    guest
        .nics
        .iter()
        .map(|nic| NetworkStatus {
            connected: nic.connected,
            ip_addrs: nic.ip_addresses.clone(),
            mac_addr: nic.mac_address.clone(),
            network_name: nic.network.clone(),
        })
        .collect()
}

/// Every address reported by the guest, primary address first, deduplicated
pub fn guest_addresses(guest: &GuestInfo) -> Vec<String> {
    let mut addresses: Vec<String> = guest.ip_address.iter().cloned().collect();
    for ip in guest.nics.iter().flat_map(|n| n.ip_addresses.iter()) {
        if !addresses.contains(ip) {
            addresses.push(ip.clone());
        }
    }
    addresses
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::ObjectMeta;
    use crate::resources::{Cluster, DnsStatus, IpAddressStatus, VSphereCluster};
    use vmflow_cloud::GuestNic;

    fn cluster() -> ClusterContext {
        ClusterContext {
            cluster: Cluster {
                metadata: ObjectMeta::new("default", "c1"),
                ..Default::default()
            },
            vsphere_cluster: VSphereCluster {
                metadata: ObjectMeta::new("default", "c1"),
                ..Default::default()
            },
        }
    }

    #[tokio::test]
    async fn test_named_provider_is_idempotent() {
        let provider = NamedNetworkProvider::distributed("dvpg-1");
        let mut vm = VirtualMachine::default();
        provider.configure_virtual_machine(&cluster(), &mut vm).await.unwrap();
        provider.configure_virtual_machine(&cluster(), &mut vm).await.unwrap();
        assert_eq!(vm.spec.network_interfaces.len(), 1);
        assert_eq!(vm.spec.network_interfaces[0].name, "eth0");
        assert_eq!(
            vm.spec.network_interfaces[0].network_type.as_deref(),
            Some("vsphere-distributed")
        );
        assert!(provider.supports_vm_readiness_probe());
    }

    #[tokio::test]
    async fn test_dummy_providers() {
        let mut vm = VirtualMachine::default();
        DummyNetworkProvider
            .configure_virtual_machine(&cluster(), &mut vm)
            .await
            .unwrap();
        assert!(vm.spec.network_interfaces.is_empty());
        assert!(!DummyNetworkProvider.has_load_balancer());
        assert!(DummyLbNetworkProvider.has_load_balancer());
    }

    #[test]
    fn test_machine_interfaces_sorted() {
        let mut vm = VirtualMachine::default();
        vm.status.interfaces = vec![
            InterfaceStatus {
                name: "eth1".to_string(),
                device_key: 4001,
                ..Default::default()
            },
            InterfaceStatus {
                name: "eth0".to_string(),
                device_key: 4000,
                addresses: vec![IpAddressStatus {
                    address: "10.0.0.5/24".to_string(),
                    origin: Some("dhcp".to_string()),
                    state: Some("preferred".to_string()),
                }],
                dns: Some(DnsStatus {
                    dhcp: true,
                    nameservers: vec!["10.0.0.1".to_string()],
                    ..Default::default()
                }),
                ..Default::default()
            },
        ];
        let interfaces = machine_interfaces(&vm);
        assert_eq!(interfaces[0].name, "eth0");
        assert_eq!(interfaces[0].addresses[0].address, "10.0.0.5/24");
        assert_eq!(interfaces[1].name, "eth1");
    }

    #[test]
    fn test_guest_addresses_dedup() {
        let guest = GuestInfo {
            ip_address: Some("10.0.0.5".to_string()),
            host_name: None,
            nics: vec![GuestNic {
                mac_address: "00:50:56:aa:00:01".to_string(),
                network: Some("vm-network".to_string()),
                ip_addresses: vec!["10.0.0.5".to_string(), "fe80::1".to_string()],
                connected: true,
            }],
        };
        assert_eq!(guest_addresses(&guest), vec!["10.0.0.5", "fe80::1"]);
        let status = guest_network_status(&guest);
        assert_eq!(status[0].mac_addr, "00:50:56:aa:00:01");
        assert!(status[0].connected);
    }
}
