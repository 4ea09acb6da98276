//! Disk and NIC device changes

use crate::error::{CloneError, Result, remote};
use crate::spec::VirtualMachineSpec;
use tracing::debug;
use vmflow_cloud::device::{disks, ethernet_cards};
use vmflow_cloud::{
    DeviceChange, DiskLocator, DiskMoveType, EthernetCardType, MacAddressType, ObjectKind,
    ObjectRef, VirtualDevice, VirtualDisk, VirtualEthernetCard,
};
use vmflow_session::Session;

/// First temporary key handed to new NICs; keys count down from here
pub const FIRST_NIC_KEY: i32 = -100;

/// Reject declaring the legacy disk sizes together with the per-disk list
pub fn check_disk_fields(vm: &VirtualMachineSpec) -> Result<()> {
    if vm.uses_legacy_disks() && !vm.disks.is_empty() {
        return Err(CloneError::InvalidConfig(
            "diskGiB/additionalDisksGiB and disks are mutually exclusive".to_string(),
        ));
    }
    Ok(())
}

/// Edit every template disk to its requested capacity
///
/// Disks may only grow. A zero request keeps the template capacity.
pub fn disk_changes(devices: &[VirtualDevice], vm: &VirtualMachineSpec) -> Result<Vec<DeviceChange>> {
    check_disk_fields(vm)?;

    let template_disks = disks(devices);
    if template_disks.is_empty() {
        return Err(CloneError::InvalidDiskCount(0));
    }

    template_disks
        .into_iter()
        .enumerate()
        .map(|(index, disk)| {
            let resized = resize_disk(disk, vm.requested_disk_kib(index))?;
            Ok(DeviceChange::edit(VirtualDevice::Disk(resized)))
        })
        .collect()
}

fn resize_disk(disk: &VirtualDisk, requested_kib: i64) -> Result<VirtualDisk> {
    let mut disk = disk.clone();
    if requested_kib > 0 {
        if requested_kib < disk.capacity_kib {
            return Err(CloneError::DiskDownsize {
                template_kib: disk.capacity_kib,
                requested_kib,
            });
        }
        disk.capacity_kib = requested_kib;
    }
    Ok(disk)
}

/// Remove every template NIC, then add one per declared network device
pub async fn network_changes(
    session: &Session,
    devices: &[VirtualDevice],
    vm: &VirtualMachineSpec,
) -> Result<Vec<DeviceChange>> {
    let mut changes: Vec<DeviceChange> = ethernet_cards(devices)
        .into_iter()
        .map(|nic| DeviceChange::remove(VirtualDevice::EthernetCard(nic.clone())))
        .collect();

    let mut key = FIRST_NIC_KEY;
    for device in &vm.network {
        let network = session
            .find_by_name(ObjectKind::Network, &device.network_name)
            .await
            .map_err(remote("find network", &device.network_name))?;
        let backing = session
            .management()
            .network_backing(&network)
            .await
            .map_err(remote("get ethernet card backing for network", &device.network_name))?;

        let mac_address = device.mac_addr.clone().filter(|m| !m.is_empty());
        let address_type = if mac_address.is_some() {
            MacAddressType::Manual
        } else {
            MacAddressType::Generated
        };
        changes.push(DeviceChange::add(VirtualDevice::EthernetCard(VirtualEthernetCard {
            key,
            card_type: EthernetCardType::Vmxnet3,
            backing,
            mac_address,
            address_type,
        })));
        debug!(machine = %vm.name, network = %device.network_name, key, "created network device");
        key -= 1;
    }

    Ok(changes)
}

/// One locator per template disk, all targeting `datastore`
pub fn disk_locators(
    devices: &[VirtualDevice],
    datastore: &ObjectRef,
    linked_clone: bool,
) -> Vec<DiskLocator> {
    let disk_move_type = if linked_clone {
        DiskMoveType::CreateNewChildDiskBacking
    } else {
        DiskMoveType::MoveAllDiskBackingsAndDisallowSharing
    };
    disks(devices)
        .into_iter()
        .map(|disk| DiskLocator {
            disk_id: disk.key,
            disk_move_type,
            datastore: datastore.clone(),
            backing: Some(disk.backing.clone()),
        })
        .collect()
}
