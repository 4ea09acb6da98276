//! Per-reconcile contexts
//!
//! A reconcile resolves its context once, at the entry point. The two
//! deployment modes carry different capabilities: the managed VM service
//! mode only talks to the orchestration store, the direct-hypervisor mode
//! additionally holds an authenticated [`Session`].

use crate::error::Result;
use crate::meta::{CLUSTER_NAME_LABEL, ObjectKey, ObjectMeta};
use crate::resources::{Cluster, Machine, VSphereCluster, VSphereMachine, VimMachine};
use crate::store::Client;
use std::sync::Arc;
use tracing::info_span;
use vmflow_session::Session;

/// Cluster-scoped state shared by every machine of a cluster
#[derive(Debug, Clone, Default)]
pub struct ClusterContext {
    pub cluster: Cluster,
    pub vsphere_cluster: VSphereCluster,
}

impl ClusterContext {
    pub async fn load(client: &Client, namespace: &str, name: &str) -> Result<Self> {
        let key = ObjectKey::new(namespace, name);
        Ok(Self {
            cluster: client.get(&key).await?,
            vsphere_cluster: client.get(&key).await?,
        })
    }

    pub fn name(&self) -> &str {
        &self.cluster.metadata.name
    }

    pub fn namespace(&self) -> &str {
        &self.cluster.metadata.namespace
    }

    pub fn resource_policy_name(&self) -> Option<&str> {
        self.vsphere_cluster.status.resource_policy_name.as_deref()
    }

    pub fn failure_domain_count(&self) -> usize {
        self.vsphere_cluster.status.failure_domains.len()
    }
}

/// Name of the cluster an infrastructure machine belongs to
fn cluster_name<'a>(meta: &'a ObjectMeta, machine: &'a Machine) -> &'a str {
    meta.label(CLUSTER_NAME_LABEL)
        .unwrap_or(&machine.spec.cluster_name)
}

/// Machine realised through the managed VM service
#[derive(Debug, Clone)]
pub struct SupervisorMachineContext {
    pub cluster: ClusterContext,
    pub machine: Machine,
    pub vsphere_machine: VSphereMachine,
}

impl SupervisorMachineContext {
    /// Load the infrastructure machine `key` with its owning machine and cluster
    ///
    /// The owning machine shares the infrastructure machine's name.
    pub async fn load(client: &Client, key: &ObjectKey) -> Result<Self> {
        let vsphere_machine: VSphereMachine = client.get(key).await?;
        let machine: Machine = client.get(key).await?;
        let cluster = ClusterContext::load(
            client,
            &key.namespace,
            cluster_name(&vsphere_machine.metadata, &machine),
        )
        .await?;
        Ok(Self {
            cluster,
            machine,
            vsphere_machine,
        })
    }
}

/// Machine cloned directly on the hypervisor
#[derive(Clone)]
pub struct VimMachineContext {
    pub cluster: Cluster,
    pub machine: Machine,
    pub vim_machine: VimMachine,
    pub session: Arc<Session>,
}

impl VimMachineContext {
    pub async fn load(client: &Client, key: &ObjectKey, session: Arc<Session>) -> Result<Self> {
        let vim_machine: VimMachine = client.get(key).await?;
        let machine: Machine = client.get(key).await?;
        let cluster_key = ObjectKey::new(
            &key.namespace,
            cluster_name(&vim_machine.metadata, &machine),
        );
        Ok(Self {
            cluster: client.get(&cluster_key).await?,
            machine,
            vim_machine,
            session,
        })
    }
}

/// Context of one reconcile, in either deployment mode
pub enum MachineContext {
    Supervisor(SupervisorMachineContext),
    Vim(VimMachineContext),
}

impl MachineContext {
    pub fn key(&self) -> ObjectKey {
        match self {
            MachineContext::Supervisor(ctx) => ctx.vsphere_machine.metadata.key(),
            MachineContext::Vim(ctx) => ctx.vim_machine.metadata.key(),
        }
    }

    pub fn is_deleting(&self) -> bool {
        match self {
            MachineContext::Supervisor(ctx) => ctx.vsphere_machine.metadata.is_deleting(),
            MachineContext::Vim(ctx) => ctx.vim_machine.metadata.is_deleting(),
        }
    }

    /// Span every log line of the reconcile is recorded under
    pub fn span(&self) -> tracing::Span {
        let mode = match self {
            MachineContext::Supervisor(_) => "supervisor",
            MachineContext::Vim(_) => "vim",
        };
        info_span!("reconcile", machine = %self.key(), mode)
    }
}
