//! Clone request builder

use crate::devices::{check_disk_fields, disk_changes, disk_locators, network_changes};
use crate::error::{CloneError, Result, remote};
use crate::extra_config::ExtraConfig;
use crate::placement::{resolve_datastore, resolve_folder, resolve_resource_pool};
use crate::spec::{BootstrapData, BootstrapFormat, CloneMode, VirtualMachineSpec};
use crate::template::{find_template, resolve_snapshot};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Mutex;
use tracing::info;
use vmflow_cloud::{
    CloneSpec, ConfigSpec, DeviceChangeSummary, DiskMoveType, ObjectRef, RelocateSpec,
};
use vmflow_session::Session;

pub const DEFAULT_NUM_CPUS: i32 = 2;
pub const DEFAULT_MEMORY_MIB: i64 = 2048;

/// A fully resolved clone request, ready to be issued
#[derive(Debug, Clone, PartialEq)]
pub struct CloneRequest {
    pub template: ObjectRef,
    pub folder: ObjectRef,
    pub name: String,
    pub spec: CloneSpec,
    /// Clone mode actually used, derived from the resolved snapshot
    pub clone_mode: CloneMode,
    pub snapshot: Option<ObjectRef>,
    pub storage_profile_id: Option<String>,
}

/// Builds [`CloneRequest`]s; the random source picks among policy-compatible datastores
///
/// The random source is locked only for the pick itself, so concurrent
/// builds share nothing else.
pub struct CloneSpecBuilder<R = StdRng> {
    rng: Mutex<R>,
}

impl CloneSpecBuilder<StdRng> {
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }
}

impl Default for CloneSpecBuilder<StdRng> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Rng + Send> CloneSpecBuilder<R> {
    pub fn with_rng(rng: R) -> Self {
        Self {
            rng: Mutex::new(rng),
        }
    }

    fn pick(&self, len: usize) -> usize {
        let mut rng = match self.rng.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        rng.gen_range(0..len)
    }

    /// Build the clone request for `vm`
    ///
    /// Only reads remote state; nothing is created or modified.
    pub async fn build(
        &self,
        session: &Session,
        vm: &VirtualMachineSpec,
        bootstrap: Option<&BootstrapData>,
        metadata: Option<&[u8]>,
    ) -> Result<CloneRequest> {
        if vm.uid.is_empty() {
            return Err(CloneError::InvalidConfig(format!(
                "machine {} has no uid to use as instance uuid",
                vm.name
            )));
        }
        if vm.template.is_empty() {
            return Err(CloneError::InvalidConfig(format!(
                "machine {} has no template",
                vm.name
            )));
        }

        // Checked for every clone mode; linked clones never reach disk_changes.
        check_disk_fields(vm)?;

        let extra_config = extra_config(vm, bootstrap, metadata);

        let template = find_template(session, &vm.template).await?;
        let template_props = session
            .management()
            .vm_properties(&template)
            .await
            .map_err(remote("get properties of template", &vm.template))?;

        let snapshot = resolve_snapshot(vm, &template_props);
        let linked_clone = snapshot.is_some();
        let (clone_mode, disk_move_type) = if linked_clone {
            (CloneMode::Linked, DiskMoveType::CreateNewChildDiskBacking)
        } else {
            (CloneMode::Full, DiskMoveType::MoveAllDiskBackingsAndConsolidate)
        };

        let folder = resolve_folder(session, vm).await?;
        let pool = resolve_resource_pool(session, vm).await?;

        let devices = &template_props.devices;
        let mut device_change = Vec::new();
        // The snapshot backing decides disk sizes of a linked clone.
        if !linked_clone {
            device_change.extend(disk_changes(devices, vm)?);
        }
        device_change.extend(network_changes(session, devices, vm).await?);

        let num_cpus = vm.num_cpus.max(DEFAULT_NUM_CPUS);
        let num_cores_per_socket = if vm.num_cores_per_socket == 0 {
            num_cpus
        } else {
            vm.num_cores_per_socket
        };
        let memory_mib = if vm.memory_mib == 0 {
            DEFAULT_MEMORY_MIB
        } else {
            vm.memory_mib
        };
        // Passthrough devices need all guest memory reserved.
        let memory_reservation_locked_to_max = if vm.pci_devices.is_empty() {
            vm.memory_reservation_locked_to_max
        } else {
            Some(true)
        };

        let (datastore, storage_profile_id) =
            resolve_datastore(session, vm, &pool, |len| self.pick(len)).await?;
        let disks = disk_locators(devices, &datastore, linked_clone);

        let spec = CloneSpec {
            config: ConfigSpec {
                instance_uuid: vm.uid.clone(),
                disk_uuid_enabled: true,
                device_change,
                extra_config: extra_config.into_values(),
                num_cpus,
                num_cores_per_socket,
                memory_mib,
                memory_reservation_locked_to_max,
                vapp_config_removed: true,
            },
            location: RelocateSpec {
                disk_move_type,
                folder: folder.clone(),
                pool,
                datastore: Some(datastore),
                disks,
            },
            power_on: false,
            snapshot: snapshot.clone(),
        };
        check_invariants(&spec)?;

        info!(
            machine = %vm.name,
            clone_mode = %clone_mode,
            devices = %DeviceChangeSummary::of(&spec.config.device_change),
            "built clone spec"
        );

        Ok(CloneRequest {
            template,
            folder,
            name: vm.name.clone(),
            spec,
            clone_mode,
            snapshot,
            storage_profile_id,
        })
    }
}

fn extra_config(
    vm: &VirtualMachineSpec,
    bootstrap: Option<&BootstrapData>,
    metadata: Option<&[u8]>,
) -> ExtraConfig {
    let mut config = ExtraConfig::new();
    if let Some(data) = bootstrap.filter(|b| !b.value.is_empty()) {
        info!(machine = %vm.name, "applied bootstrap data to VM clone spec");
        match data.format {
            BootstrapFormat::CloudConfig => config.set_cloud_init_user_data(&data.value),
            BootstrapFormat::Ignition => config.set_ignition_user_data(&data.value),
        }
    }
    if let Some(metadata) = metadata.filter(|m| !m.is_empty()) {
        config.set_cloud_init_metadata(metadata);
    }
    if !vm.custom_vmx_keys.is_empty() {
        info!(machine = %vm.name, "applied custom vmx keys to VM clone spec");
        config.set_custom_vmx_keys(&vm.custom_vmx_keys);
    }
    config
}

fn check_invariants(spec: &CloneSpec) -> Result<()> {
    if spec.power_on {
        return Err(CloneError::Internal(
            "clone spec must not power the VM on".to_string(),
        ));
    }
    if spec.is_linked_clone()
        && spec
            .config
            .device_change
            .iter()
            .any(|c| c.device.as_disk().is_some())
    {
        return Err(CloneError::Internal(
            "linked clone spec carries disk changes".to_string(),
        ));
    }
    Ok(())
}

/// Issue the clone; returns the task reference to poll
pub async fn issue_clone(session: &Session, request: &CloneRequest) -> Result<ObjectRef> {
    info!(machine = %request.name, clone_mode = %request.clone_mode, "cloning machine");
    session
        .management()
        .clone_vm(&request.template, &request.folder, &request.name, &request.spec)
        .await
        .map_err(remote("clone", &request.name))
}
