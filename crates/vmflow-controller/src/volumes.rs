//! Extra volumes of managed VMs

use crate::context::SupervisorMachineContext;
use crate::error::Result;
use crate::meta::{ObjectMeta, ZONE_LABEL};
use crate::resources::{
    MachineVolume, PersistentVolumeClaim, PersistentVolumeClaimSpec, VirtualMachine, VmVolume,
};
use crate::store::Client;
use tracing::info;

/// Requested topology hint read by the storage driver
pub const VOLUME_TOPOLOGY_ANNOTATION: &str = "csi.vsphere.volume-requested-topology";

const READ_WRITE_ONCE: &str = "ReadWriteOnce";

pub fn claim_name(machine_name: &str, volume_name: &str) -> String {
    format!("{}-{}", machine_name, volume_name)
}

fn desired_claim(ctx: &SupervisorMachineContext, volume: &MachineVolume) -> PersistentVolumeClaim {
    let machine = &ctx.vsphere_machine;
    let storage_class_name = volume
        .storage_class
        .as_deref()
        .filter(|s| !s.is_empty())
        .unwrap_or(&machine.spec.storage_class)
        .to_string();

    let mut metadata = ObjectMeta::new(
        &machine.metadata.namespace,
        claim_name(&machine.metadata.name, &volume.name),
    );
    // Zonal storage classes need the hint, the others reject it.
    if ctx.cluster.failure_domain_count() > 1 {
        if let Some(zone) = machine.spec.failure_domain.as_deref().filter(|z| !z.is_empty()) {
            let topology = serde_json::json!([{ ZONE_LABEL: zone }]);
            metadata
                .annotations
                .insert(VOLUME_TOPOLOGY_ANNOTATION.to_string(), topology.to_string());
        }
    }

    PersistentVolumeClaim {
        metadata,
        spec: PersistentVolumeClaimSpec {
            storage_class_name,
            access_modes: vec![READ_WRITE_ONCE.to_string()],
            capacity: volume.capacity.clone(),
        },
    }
}

/// Create the claims backing every declared volume
///
/// Returns the claim names in declaration order. Existing claims are left
/// untouched.
pub async fn reconcile_claims(client: &Client, ctx: &SupervisorMachineContext) -> Result<Vec<String>> {
    let mut names = Vec::with_capacity(ctx.vsphere_machine.spec.volumes.len());
    for volume in &ctx.vsphere_machine.spec.volumes {
        let claim = desired_claim(ctx, volume);
        if client.find::<PersistentVolumeClaim>(&claim.metadata.key()).await?.is_none() {
            info!(claim = %claim.metadata.key(), capacity = %volume.capacity, "creating volume claim");
            client.create(&claim).await?;
        }
        names.push(claim.metadata.name);
    }
    Ok(names)
}

/// Reference `claim` from the VM unless it already is
pub fn add_volume(vm: &mut VirtualMachine, claim: &str) {
    if vm.spec.volumes.iter().any(|v| v.claim_name == claim) {
        return;
    }
    vm.spec.volumes.push(VmVolume {
        name: claim.to_string(),
        claim_name: claim.to_string(),
    });
}
