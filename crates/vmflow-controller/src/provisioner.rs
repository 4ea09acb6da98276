//! Entry point of one reconcile

use crate::context::{MachineContext, SupervisorMachineContext, VimMachineContext};
use crate::error::Result;
use crate::meta::ObjectKey;
use crate::network::NetworkProvider;
use crate::resources::VmPhase;
use crate::store::{Client, Patcher};
use crate::supervisor::SupervisorMachineService;
use crate::vim::VimMachineService;
use std::sync::Arc;
use tracing::{Instrument, debug, warn};
use vmflow_clone::CloneSpecBuilder;
use vmflow_session::Session;

/// Finalizer holding a machine until its VM is gone
pub const MACHINE_FINALIZER: &str = "vmflow.io/machine";

/// Dispatches a reconcile to the service of its deployment mode and writes
/// the resulting machine status back
pub struct Provisioner {
    client: Client,
    supervisor: SupervisorMachineService,
    vim: VimMachineService,
}

impl Provisioner {
    pub fn new(client: Client, network: Arc<dyn NetworkProvider>) -> Self {
        Self {
            supervisor: SupervisorMachineService::new(client.clone(), network),
            vim: VimMachineService::new(client.clone()),
            client,
        }
    }

    pub fn with_auto_placement(mut self, enabled: bool) -> Self {
        self.supervisor = self.supervisor.with_auto_placement(enabled);
        self
    }

    pub fn with_clone_builder(mut self, builder: CloneSpecBuilder) -> Self {
        self.vim = self.vim.with_builder(builder);
        self
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub async fn supervisor_context(&self, key: &ObjectKey) -> Result<MachineContext> {
        Ok(MachineContext::Supervisor(
            SupervisorMachineContext::load(&self.client, key).await?,
        ))
    }

    pub async fn vim_context(&self, key: &ObjectKey, session: Arc<Session>) -> Result<MachineContext> {
        Ok(MachineContext::Vim(
            VimMachineContext::load(&self.client, key, session).await?,
        ))
    }

    /// Reconcile one machine; returns whether it must be requeued
    ///
    /// The machine is patched once at the end even when the reconcile fails,
    /// so conditions explaining the failure are persisted.
    pub async fn reconcile(&self, ctx: &mut MachineContext) -> Result<bool> {
        let span = ctx.span();
        async move {
            let deleting = ctx.is_deleting();
            match ctx {
                MachineContext::Supervisor(ctx) => {
                    let mut patcher = Patcher::new(self.client.clone(), &ctx.vsphere_machine);
                    let result = if deleting {
                        self.supervisor.reconcile_delete(ctx).await.map(|()| {
                            ctx.vsphere_machine.status.vm_status == VmPhase::Deleting
                        })
                    } else {
                        add_finalizer(&mut ctx.vsphere_machine.metadata.finalizers);
                        self.supervisor.reconcile_normal(ctx).await
                    };
                    let phase = ctx.vsphere_machine.status.vm_status;
                    if deleting && phase == VmPhase::NotFound {
                        ctx.vsphere_machine.metadata.finalizers.retain(|f| f != MACHINE_FINALIZER);
                    }
                    let patched = patcher.patch(&mut ctx.vsphere_machine).await;
                    finish(result, patched, phase)
                }
                MachineContext::Vim(ctx) => {
                    let mut patcher = Patcher::new(self.client.clone(), &ctx.vim_machine);
                    let result = if deleting {
                        self.vim.reconcile_delete(ctx, &mut patcher).await
                    } else {
                        add_finalizer(&mut ctx.vim_machine.metadata.finalizers);
                        self.vim.reconcile_normal(ctx, &mut patcher).await
                    };
                    let phase = ctx.vim_machine.status.phase;
                    if deleting && phase == VmPhase::NotFound {
                        ctx.vim_machine.metadata.finalizers.retain(|f| f != MACHINE_FINALIZER);
                    }
                    let patched = patcher.patch(&mut ctx.vim_machine).await;
                    finish(result, patched, phase)
                }
            }
        }
        .instrument(span)
        .await
    }
}

fn add_finalizer(finalizers: &mut Vec<String>) {
    if !finalizers.iter().any(|f| f == MACHINE_FINALIZER) {
        finalizers.push(MACHINE_FINALIZER.to_string());
    }
}

fn finish(
    result: Result<bool>,
    patched: crate::store::Result<()>,
    phase: VmPhase,
) -> Result<bool> {
    match (result, patched) {
        (Ok(requeue), Ok(())) => {
            debug!(%phase, requeue, "reconciled machine");
            Ok(requeue)
        }
        (Ok(_), Err(e)) => Err(e.into()),
        (Err(e), patched) => {
            if let Err(patch_err) = patched {
                warn!(error = %patch_err, "failed to persist machine status");
            }
            warn!(%phase, kind = %e.kind(), error = %e, "reconcile failed");
            Err(e)
        }
    }
}
