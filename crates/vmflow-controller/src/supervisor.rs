//! Machine service backed by the managed VM service
//!
//! The VM service owns the actual hypervisor calls. This service only keeps
//! a `VirtualMachine` object (plus its bootstrap config and volume claims) in
//! line with the declared machine and mirrors the observed VM state back.

use crate::affinity::{self, AffinityInfo};
use crate::bootstrap::{bootstrap_data, config_map_name, fill_bootstrap_config_map, guest_metadata};
use crate::conditions::{
    Conditions, READY_CONDITION, Severity, VM_CREATION_FAILED_REASON, VM_PROVISIONED_CONDITION,
    VM_PROVISION_STARTED_REASON, POWERING_ON_REASON, WAITING_FOR_BIOS_UUID_REASON,
    WAITING_FOR_BOOTSTRAP_DATA_REASON, WAITING_FOR_GROUP_MEMBERSHIP_REASON,
    WAITING_FOR_NETWORK_ADDRESS_REASON, WAITING_FOR_PLACEMENT_GROUP_REASON,
};
use crate::context::SupervisorMachineContext;
use crate::error::{ProvisionError, Result};
use crate::meta::{ObjectKey, ObjectMeta, ZONE_LABEL};
use crate::network::{NetworkProvider, machine_interfaces};
use crate::resources::{
    ConfigMap, ReadinessProbe, VirtualMachine, VirtualMachineGroup, VmMetadata, VmPhase,
    VmPowerState,
};
use crate::store::Client;
use crate::volumes::{add_volume, reconcile_claims};
use std::sync::Arc;
use tracing::{debug, info};

pub const CLUSTER_SELECTOR_LABEL: &str = "capv.vmware.com/cluster.name";
pub const CLUSTER_ROLE_LABEL: &str = "capv.vmware.com/cluster.role";
pub const CONTROL_PLANE_ROLE: &str = "controlplane";
pub const WORKER_ROLE: &str = "node";

pub const CLUSTER_MODULE_ANNOTATION: &str = "vsphere-cluster-module-group";
pub const PROVIDER_TAGS_ANNOTATION: &str = "vsphere-tag";
pub const CONTROL_PLANE_MODULE_GROUP: &str = "control-plane-group";
pub const CONTROL_PLANE_TAG: &str = "CtrlVmVmAATag";
pub const WORKER_TAG: &str = "WorkerVmVmAATag";

pub const API_SERVER_PORT: u16 = 6443;
const METADATA_TRANSPORT: &str = "ExtraConfig";
const PROVIDER_ID_PREFIX: &str = "vsphere://";

/// Conditions the VM service reports before the VM is created
pub const PRECONDITION_TYPES: &[&str] = &[
    "VirtualMachinePrereqReady",
    "VirtualMachineClassReady",
    "VirtualMachineImageReady",
    "VirtualMachineSetResourcePolicyReady",
    "VirtualMachineBootstrapReady",
    "VirtualMachineStorageReady",
    "VirtualMachineNetworkReady",
    "VirtualMachinePlacementReady",
];

fn mark_provisioning(conditions: &mut Conditions, reason: &str, severity: Severity, message: impl Into<String>) {
    let message = message.into();
    conditions.mark_false(VM_PROVISIONED_CONDITION, reason, severity, message.clone());
    conditions.mark_false(READY_CONDITION, reason, severity, message);
}

pub(crate) fn provider_id(bios_uuid: &str) -> String {
    format!("{}{}", PROVIDER_ID_PREFIX, bios_uuid)
}

pub struct SupervisorMachineService {
    client: Client,
    network: Arc<dyn NetworkProvider>,
    auto_placement: bool,
}

impl SupervisorMachineService {
    pub fn new(client: Client, network: Arc<dyn NetworkProvider>) -> Self {
        Self {
            client,
            network,
            auto_placement: false,
        }
    }

    /// Place workers through a per-cluster VM group with affinity rules
    pub fn with_auto_placement(mut self, enabled: bool) -> Self {
        self.auto_placement = enabled;
        self
    }

    /// Wait for `reason`; the machine is requeued
    fn wait(ctx: &mut SupervisorMachineContext, reason: &str) -> Result<bool> {
        info!(reason, "machine is waiting");
        mark_provisioning(&mut ctx.vsphere_machine.status.conditions, reason, Severity::Info, "");
        Ok(true)
    }

    fn set_phase(ctx: &mut SupervisorMachineContext, observed: VmPhase) {
        let status = &mut ctx.vsphere_machine.status;
        status.vm_status = status.vm_status.advance(observed);
    }

    /// Drop what was observed of a VM that no longer exists
    ///
    /// The VM about to be created is a new one, so its phase starts over.
    fn forget_vm(ctx: &mut SupervisorMachineContext) {
        let status = &mut ctx.vsphere_machine.status;
        if status.vm_status != VmPhase::Pending || status.id.is_some() {
            info!(
                phase = %status.vm_status,
                "VirtualMachine is gone, provisioning a new one"
            );
        }
        status.vm_status = VmPhase::Pending;
        status.ready = false;
        status.id = None;
        status.ip_addr = None;
        status.network.clear();
    }

    /// Drive the VM toward ready; returns whether the machine must be requeued
    pub async fn reconcile_normal(&self, ctx: &mut SupervisorMachineContext) -> Result<bool> {
        ctx.vsphere_machine.spec.failure_domain = ctx.machine.spec.failure_domain.clone();

        if ctx.machine.spec.version.as_deref().is_none_or(str::is_empty) {
            let err = ProvisionError::MissingVersion(ctx.machine.metadata.key());
            mark_provisioning(
                &mut ctx.vsphere_machine.status.conditions,
                VM_CREATION_FAILED_REASON,
                Severity::Warning,
                format!("failed to create or update VirtualMachine: {}", err),
            );
            return Err(err);
        }

        let Some(bootstrap) = bootstrap_data(&self.client, &ctx.machine).await? else {
            return Self::wait(ctx, WAITING_FOR_BOOTSTRAP_DATA_REASON);
        };

        let vm_key = ctx.machine.metadata.key();
        let existing: Option<VirtualMachine> = self.client.find(&vm_key).await?;

        let mut placement = None;
        if self.auto_placement && !ctx.machine.is_control_plane() {
            let group_key = ObjectKey::new(ctx.cluster.namespace(), ctx.cluster.name());
            let group: Option<VirtualMachineGroup> = self.client.find(&group_key).await?;
            if existing.is_none() {
                match &group {
                    None => return Self::wait(ctx, WAITING_FOR_PLACEMENT_GROUP_REASON),
                    Some(group) if !group.has_member(&vm_key.name) => {
                        return Self::wait(ctx, WAITING_FOR_GROUP_MEMBERSHIP_REASON);
                    }
                    Some(_) => {}
                }
            }
            if let Some(group) = &group {
                placement = affinity::affinity_info(&self.client, ctx, group).await?;
            }
        }

        if existing.is_none() {
            Self::forget_vm(ctx);
        }

        let vm = match self.reconcile_vm(ctx, existing, placement.as_ref()).await {
            Ok(vm) => vm,
            Err(err) => {
                mark_provisioning(
                    &mut ctx.vsphere_machine.status.conditions,
                    VM_CREATION_FAILED_REASON,
                    Severity::Warning,
                    format!("failed to create or update VirtualMachine: {}", err),
                );
                return Err(err);
            }
        };

        if let Err(err) = self.reconcile_bootstrap_config(ctx, &bootstrap).await {
            mark_provisioning(
                &mut ctx.vsphere_machine.status.conditions,
                VM_CREATION_FAILED_REASON,
                Severity::Warning,
                format!("failed to create or update bootstrap configmap: {}", err),
            );
            return Err(err);
        }

        Self::set_phase(ctx, VmPhase::Pending);

        if !vm.status.created {
            let failed = vm
                .status
                .conditions
                .iter()
                .find(|c| !c.status && PRECONDITION_TYPES.contains(&c.type_.as_str()));
            if let Some(cond) = failed {
                mark_provisioning(
                    &mut ctx.vsphere_machine.status.conditions,
                    &cond.reason,
                    Severity::Error,
                    cond.message.clone(),
                );
                return Err(ProvisionError::PreconditionFailed {
                    vm: vm_key,
                    condition: cond.type_.clone(),
                    reason: cond.reason.clone(),
                    message: cond.message.clone(),
                });
            }
            return Self::wait(ctx, VM_PROVISION_STARTED_REASON);
        }
        Self::set_phase(ctx, VmPhase::Created);

        if vm.status.power_state != Some(VmPowerState::PoweredOn) {
            return Self::wait(ctx, POWERING_ON_REASON);
        }
        Self::set_phase(ctx, VmPhase::PoweredOn);

        let Some(vm_ip) = vm.status.vm_ip.clone().filter(|ip| !ip.is_empty()) else {
            return Self::wait(ctx, WAITING_FOR_NETWORK_ADDRESS_REASON);
        };
        let Some(bios_uuid) = vm.status.bios_uuid.clone().filter(|id| !id.is_empty()) else {
            return Self::wait(ctx, WAITING_FOR_BIOS_UUID_REASON);
        };
        if let Some(recorded) = ctx.vsphere_machine.status.id.as_deref() {
            if recorded != bios_uuid {
                return Err(ProvisionError::BiosUuidChanged {
                    machine: ctx.vsphere_machine.metadata.key(),
                    recorded: recorded.to_string(),
                    observed: bios_uuid,
                });
            }
        }
        Self::set_phase(ctx, VmPhase::Ready);

        let status = &mut ctx.vsphere_machine.status;
        status.ip_addr = Some(vm_ip);
        status.network = machine_interfaces(&vm);
        let id = provider_id(&bios_uuid);
        if ctx.vsphere_machine.spec.provider_id.as_deref() != Some(id.as_str()) {
            info!(provider_id = %id, "updated provider ID");
            ctx.vsphere_machine.spec.provider_id = Some(id);
        }
        let status = &mut ctx.vsphere_machine.status;
        status.id = Some(bios_uuid);
        status.ready = true;
        status.conditions.mark_true(VM_PROVISIONED_CONDITION);
        status.conditions.mark_true(READY_CONDITION);
        Ok(false)
    }

    /// Create the VM object or patch the fields this service owns
    async fn reconcile_vm(
        &self,
        ctx: &SupervisorMachineContext,
        existing: Option<VirtualMachine>,
        placement: Option<&AffinityInfo>,
    ) -> Result<VirtualMachine> {
        let claims = reconcile_claims(&self.client, ctx).await?;

        let creating = existing.is_none();
        let mut desired = existing.clone().unwrap_or_else(|| VirtualMachine {
            metadata: ObjectMeta::new(&ctx.machine.metadata.namespace, &ctx.machine.metadata.name),
            ..Default::default()
        });

        let machine = &ctx.vsphere_machine;
        desired.spec.image_name = machine.spec.image_name.clone();
        desired.spec.class_name = machine.spec.class_name.clone();
        desired.spec.storage_class = machine.spec.storage_class.clone();
        desired.spec.power_state = VmPowerState::PoweredOn;
        desired.spec.resource_policy_name = ctx.cluster.resource_policy_name().map(str::to_string);
        desired.spec.vm_metadata = Some(VmMetadata {
            config_map_name: config_map_name(&machine.metadata.name),
            transport: METADATA_TRANSPORT.to_string(),
        });

        // No probe until the first control plane node is up, or the VM
        // service would route API traffic to a node still bootstrapping.
        if ctx.machine.is_control_plane()
            && ctx.cluster.cluster.status.control_plane_ready
            && self.network.supports_vm_readiness_probe()
        {
            desired.spec.readiness_probe = Some(ReadinessProbe {
                tcp_port: API_SERVER_PORT,
            });
        }

        self.apply_labels(ctx, &mut desired);
        for claim in &claims {
            add_volume(&mut desired, claim);
        }
        if let Some(info) = placement {
            affinity::apply_affinity(&mut desired, info, creating);
        }
        self.network
            .configure_virtual_machine(&ctx.cluster, &mut desired)
            .await?;

        let vm = match existing {
            Some(live) => self.client.patch(&live, &desired).await?,
            None => {
                info!(vm = %desired.metadata.key(), "creating VirtualMachine");
                self.client.create(&desired).await?
            }
        };
        Ok(vm)
    }

    fn apply_labels(&self, ctx: &SupervisorMachineContext, vm: &mut VirtualMachine) {
        let control_plane = ctx.machine.is_control_plane();
        let labels = &mut vm.metadata.labels;
        labels.insert(CLUSTER_SELECTOR_LABEL.to_string(), ctx.cluster.name().to_string());
        let role = if control_plane { CONTROL_PLANE_ROLE } else { WORKER_ROLE };
        labels.insert(CLUSTER_ROLE_LABEL.to_string(), role.to_string());
        if let Some(zone) = ctx
            .vsphere_machine
            .spec
            .failure_domain
            .as_deref()
            .filter(|fd| !fd.is_empty())
        {
            labels.insert(ZONE_LABEL.to_string(), zone.to_string());
        }

        let annotations = &mut vm.metadata.annotations;
        if control_plane {
            annotations.insert(PROVIDER_TAGS_ANNOTATION.to_string(), CONTROL_PLANE_TAG.to_string());
            annotations.insert(
                CLUSTER_MODULE_ANNOTATION.to_string(),
                CONTROL_PLANE_MODULE_GROUP.to_string(),
            );
        } else {
            let module = ctx
                .machine
                .machine_deployment()
                .map(str::to_string)
                .unwrap_or_else(|| format!("{}-workers-0", ctx.cluster.name()));
            annotations.insert(PROVIDER_TAGS_ANNOTATION.to_string(), WORKER_TAG.to_string());
            annotations.insert(CLUSTER_MODULE_ANNOTATION.to_string(), module);
        }
    }

    async fn reconcile_bootstrap_config(
        &self,
        ctx: &SupervisorMachineContext,
        bootstrap: &vmflow_clone::BootstrapData,
    ) -> Result<()> {
        let metadata = guest_metadata(
            &ctx.machine,
            ctx.cluster.cluster.spec.control_plane_endpoint.as_ref(),
        )?;
        let fresh = ConfigMap {
            metadata: ObjectMeta::new(
                &ctx.vsphere_machine.metadata.namespace,
                config_map_name(&ctx.vsphere_machine.metadata.name),
            ),
            ..Default::default()
        };
        let (_, created) = self
            .client
            .create_or_patch(fresh, |cm| fill_bootstrap_config_map(cm, bootstrap, &metadata))
            .await?;
        if created {
            debug!("created bootstrap config");
        }
        Ok(())
    }

    /// Delete the VM object
    ///
    /// A VM that is already gone leaves the machine in [`VmPhase::NotFound`].
    pub async fn reconcile_delete(&self, ctx: &mut SupervisorMachineContext) -> Result<()> {
        let key = ctx.machine.metadata.key();
        let status = &mut ctx.vsphere_machine.status;

        let vm = match self.client.get::<VirtualMachine>(&key).await {
            Ok(vm) => vm,
            Err(e) if e.is_not_found() => {
                status.vm_status = VmPhase::NotFound;
                return Ok(());
            }
            Err(e) => {
                status.vm_status = VmPhase::Error;
                return Err(e.into());
            }
        };

        if vm.metadata.is_deleting() {
            status.vm_status = VmPhase::Deleting;
            return Ok(());
        }

        info!(vm = %key, "deleting VirtualMachine");
        match self.client.delete::<VirtualMachine>(&key).await {
            Ok(()) => {
                status.vm_status = VmPhase::Deleting;
                Ok(())
            }
            Err(e) if e.is_not_found() => {
                status.vm_status = VmPhase::NotFound;
                Ok(())
            }
            Err(e) => {
                status.vm_status = VmPhase::Error;
                Err(e.into())
            }
        }
    }
}
