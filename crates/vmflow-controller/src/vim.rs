//! Machine service talking to the hypervisor directly
//!
//! Every step that starts a remote task records the task reference on the
//! machine and persists it right away; the next reconcile polls that task
//! instead of issuing the operation again.

use crate::bootstrap::{bootstrap_data, guest_metadata};
use crate::conditions::{
    CLONING_FAILED_REASON, CLONING_REASON, POWERING_ON_FAILED_REASON, POWERING_ON_REASON,
    READY_CONDITION, Severity, VM_PROVISIONED_CONDITION, WAITING_FOR_BIOS_UUID_REASON,
    WAITING_FOR_BOOTSTRAP_DATA_REASON, WAITING_FOR_NETWORK_ADDRESS_REASON,
};
use crate::context::VimMachineContext;
use crate::error::{ProvisionError, Result, remote};
use crate::network::{guest_addresses, guest_network_status};
use crate::resources::{VimMachine, VmPhase};
use crate::store::{Client, Patcher};
use crate::supervisor::provider_id;
use tracing::{debug, info, warn};
use vmflow_clone::{CloneSpecBuilder, issue_clone};
use vmflow_cloud::{ObjectKind, ObjectRef, PowerState, TaskState};

const CLONE_TASK: &str = "VirtualMachine.clone";
const POWER_ON_TASK: &str = "VirtualMachine.powerOn";

/// Outcome of polling the recorded task
enum TaskCheck {
    /// Still queued or running
    InFlight,
    /// No task, or it finished; carry on
    Done,
    /// A clone or power-on task failed; retried on a later reconcile
    Failed,
}

pub struct VimMachineService {
    client: Client,
    builder: CloneSpecBuilder,
}

impl VimMachineService {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            builder: CloneSpecBuilder::new(),
        }
    }

    /// Replace the clone builder, e.g. with one using a seeded random source
    pub fn with_builder(mut self, builder: CloneSpecBuilder) -> Self {
        self.builder = builder;
        self
    }

    fn wait(machine: &mut VimMachine, reason: &str) -> Result<bool> {
        info!(reason, "machine is waiting");
        let conditions = &mut machine.status.conditions;
        conditions.mark_false(VM_PROVISIONED_CONDITION, reason, Severity::Info, "");
        conditions.mark_false(READY_CONDITION, reason, Severity::Info, "");
        Ok(true)
    }

    fn set_phase(machine: &mut VimMachine, observed: VmPhase) {
        machine.status.phase = machine.status.phase.advance(observed);
    }

    /// Poll the task recorded on the machine, clearing it once finished
    async fn check_task(&self, ctx: &mut VimMachineContext) -> Result<TaskCheck> {
        let Some(task_ref) = ctx.vim_machine.status.task_ref.clone() else {
            return Ok(TaskCheck::Done);
        };
        let task = ObjectRef::new(ObjectKind::Task, &task_ref);
        let info = ctx
            .session
            .management()
            .task_info(&task)
            .await
            .map_err(remote("get task", &task_ref))?;

        let status = &mut ctx.vim_machine.status;
        let Some(info) = info else {
            debug!(task = %task_ref, "task is no longer known, clearing it");
            status.task_ref = None;
            return Ok(TaskCheck::Done);
        };
        match info.state {
            TaskState::Queued | TaskState::Running => {
                debug!(task = %task_ref, state = ?info.state, "task in flight");
                Ok(TaskCheck::InFlight)
            }
            TaskState::Success => {
                debug!(task = %task_ref, "task finished");
                status.task_ref = None;
                Ok(TaskCheck::Done)
            }
            TaskState::Error => {
                let message = info.error.unwrap_or_default();
                warn!(task = %task_ref, op = %info.description_id, error = %message, "task failed");
                status.task_ref = None;
                status.failure_message = Some(message.clone());
                let reason = match info.description_id.as_str() {
                    CLONE_TASK => CLONING_FAILED_REASON,
                    POWER_ON_TASK => POWERING_ON_FAILED_REASON,
                    _ => return Ok(TaskCheck::Done),
                };
                status
                    .conditions
                    .mark_false(VM_PROVISIONED_CONDITION, reason, Severity::Warning, message);
                Ok(TaskCheck::Failed)
            }
        }
    }

    /// Look the VM up by BIOS UUID once known, by instance UUID before that
    async fn find_vm(&self, ctx: &VimMachineContext) -> Result<Option<ObjectRef>> {
        let session = &ctx.session;
        match ctx.vim_machine.status.bios_uuid.as_deref() {
            Some(bios_uuid) => session
                .find_by_bios_uuid(bios_uuid)
                .await
                .map_err(remote("find VM by BIOS UUID", bios_uuid)),
            None => {
                let uid = &ctx.vim_machine.metadata.uid;
                session
                    .find_by_instance_uuid(uid)
                    .await
                    .map_err(remote("find VM by instance UUID", uid))
            }
        }
    }

    /// Drive the VM toward ready; returns whether the machine must be requeued
    pub async fn reconcile_normal(
        &self,
        ctx: &mut VimMachineContext,
        patcher: &mut Patcher<VimMachine>,
    ) -> Result<bool> {
        match self.check_task(ctx).await? {
            TaskCheck::InFlight => return Ok(true),
            // Leave the retry to the next reconcile so the caller's backoff applies.
            TaskCheck::Failed => return Ok(true),
            TaskCheck::Done => {}
        }

        let Some(vm) = self.find_vm(ctx).await? else {
            if let Some(uuid) = ctx.vim_machine.status.bios_uuid.clone() {
                let err = ProvisionError::VmRemoved { uuid };
                ctx.vim_machine.status.phase = VmPhase::Error;
                ctx.vim_machine.status.failure_message = Some(err.to_string());
                return Err(err);
            }
            return self.clone_vm(ctx, patcher).await;
        };

        let session = ctx.session.clone();
        let props = session
            .management()
            .vm_properties(&vm)
            .await
            .map_err(remote("get properties of VM", &vm.value))?;
        let machine = &mut ctx.vim_machine;
        machine.status.vm_ref = Some(vm.value.clone());
        Self::set_phase(machine, VmPhase::Created);

        if let Some(observed) = props.bios_uuid.clone().filter(|id| !id.is_empty()) {
            match machine.status.bios_uuid.as_deref() {
                Some(recorded) if recorded != observed => {
                    return Err(ProvisionError::BiosUuidChanged {
                        machine: machine.metadata.key(),
                        recorded: recorded.to_string(),
                        observed,
                    });
                }
                Some(_) => {}
                None => machine.status.bios_uuid = Some(observed),
            }
        }

        match props.power_state {
            PowerState::PoweredOn => {}
            PowerState::PoweredOff => {
                info!(vm = %vm.value, "powering on VM");
                let task = session
                    .management()
                    .power_on(&vm)
                    .await
                    .map_err(remote("power on", &vm.value))?;
                machine.status.task_ref = Some(task.value);
                Self::wait(machine, POWERING_ON_REASON)?;
                patcher.patch(machine).await?;
                return Ok(true);
            }
            state => {
                return Err(ProvisionError::UnexpectedPowerState {
                    vm: vm.value,
                    state: state.to_string(),
                });
            }
        }
        Self::set_phase(machine, VmPhase::PoweredOn);

        machine.status.network = guest_network_status(&props.guest);
        machine.status.addresses = guest_addresses(&props.guest);
        if machine.status.addresses.is_empty() {
            return Self::wait(machine, WAITING_FOR_NETWORK_ADDRESS_REASON);
        }
        let Some(bios_uuid) = machine.status.bios_uuid.clone() else {
            return Self::wait(machine, WAITING_FOR_BIOS_UUID_REASON);
        };

        let id = provider_id(&bios_uuid);
        if machine.spec.provider_id.as_deref() != Some(id.as_str()) {
            info!(provider_id = %id, "updated provider ID");
            machine.spec.provider_id = Some(id);
        }
        Self::set_phase(machine, VmPhase::Ready);
        machine.status.ready = true;
        machine.status.failure_message = None;
        machine.status.conditions.mark_true(VM_PROVISIONED_CONDITION);
        machine.status.conditions.mark_true(READY_CONDITION);
        Ok(false)
    }

    async fn clone_vm(
        &self,
        ctx: &mut VimMachineContext,
        patcher: &mut Patcher<VimMachine>,
    ) -> Result<bool> {
        if !ctx.vim_machine.status.conditions.has(VM_PROVISIONED_CONDITION) {
            ctx.vim_machine.status.conditions.mark_false(
                VM_PROVISIONED_CONDITION,
                CLONING_REASON,
                Severity::Info,
                "",
            );
        }

        let Some(bootstrap) = bootstrap_data(&self.client, &ctx.machine).await? else {
            return Self::wait(&mut ctx.vim_machine, WAITING_FOR_BOOTSTRAP_DATA_REASON);
        };
        let metadata = guest_metadata(&ctx.machine, ctx.cluster.spec.control_plane_endpoint.as_ref())?;

        let mut spec = ctx.vim_machine.spec.vm.clone();
        spec.name = ctx.vim_machine.metadata.name.clone();
        spec.uid = ctx.vim_machine.metadata.uid.clone();

        let issued = async {
            let request = self
                .builder
                .build(&ctx.session, &spec, Some(&bootstrap), Some(metadata.as_bytes()))
                .await?;
            let task = issue_clone(&ctx.session, &request).await?;
            Ok::<_, vmflow_clone::CloneError>((request, task))
        }
        .await;

        let status = &mut ctx.vim_machine.status;
        let (request, task) = match issued {
            Ok(issued) => issued,
            Err(err) => {
                status.conditions.mark_false(
                    VM_PROVISIONED_CONDITION,
                    CLONING_FAILED_REASON,
                    Severity::Warning,
                    err.to_string(),
                );
                return Err(err.into());
            }
        };

        status.task_ref = Some(task.value);
        status.instance_uuid = Some(spec.uid);
        status.clone_mode = Some(request.clone_mode);
        status.snapshot = request.snapshot.map(|s| s.value);
        patcher.patch(&mut ctx.vim_machine).await?;
        Ok(true)
    }

    /// Power off and destroy the VM; returns whether the machine must be requeued
    ///
    /// A VM that is already gone leaves the machine in [`VmPhase::NotFound`].
    pub async fn reconcile_delete(
        &self,
        ctx: &mut VimMachineContext,
        patcher: &mut Patcher<VimMachine>,
    ) -> Result<bool> {
        if let TaskCheck::InFlight = self.check_task(ctx).await? {
            ctx.vim_machine.status.phase = VmPhase::Deleting;
            return Ok(true);
        }

        let Some(vm) = self.find_vm(ctx).await? else {
            ctx.vim_machine.status.phase = VmPhase::NotFound;
            return Ok(false);
        };

        let session = ctx.session.clone();
        let props = session
            .management()
            .vm_properties(&vm)
            .await
            .map_err(remote("get properties of VM", &vm.value))?;
        let task = if props.power_state == PowerState::PoweredOn {
            info!(vm = %vm.value, "powering off VM");
            session
                .management()
                .power_off(&vm)
                .await
                .map_err(remote("power off", &vm.value))?
        } else {
            info!(vm = %vm.value, "destroying VM");
            session
                .management()
                .destroy(&vm)
                .await
                .map_err(remote("destroy", &vm.value))?
        };
        let machine = &mut ctx.vim_machine;
        machine.status.task_ref = Some(task.value);
        machine.status.phase = VmPhase::Deleting;
        patcher.patch(machine).await?;
        Ok(true)
    }
}
