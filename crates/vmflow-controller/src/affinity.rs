//! Placement affinity of worker VMs
//!
//! Workers of one machine deployment are kept in one zone and spread over
//! hosts; different deployments are spread over zones. Only deployments
//! without a pinned failure domain take part.

use crate::context::SupervisorMachineContext;
use crate::error::Result;
use crate::meta::{CLUSTER_NAME_LABEL, HOSTNAME_LABEL, MACHINE_DEPLOYMENT_NAME_LABEL, ZONE_LABEL};
use crate::resources::{
    AffinitySpec, AffinityTerm, LabelSelector, LabelSelectorOperator, LabelSelectorRequirement,
    MachineDeployment, VirtualMachine, VirtualMachineGroup, VmAffinity, VmAntiAffinity,
};
use crate::store::Client;
use std::collections::BTreeMap;

/// Prefix of the group annotations recording the zone chosen per deployment
pub const ZONE_ANNOTATION_PREFIX: &str = "zone.vmware.infrastructure.cluster.x-k8s.io";

/// Placement of one worker VM inside its group
#[derive(Debug, Clone, PartialEq)]
pub struct AffinityInfo {
    pub affinity: AffinitySpec,
    pub group_name: String,
    pub zone: Option<String>,
}

fn deployment_selector(machine_deployment: &str) -> LabelSelector {
    LabelSelector {
        match_labels: BTreeMap::from([(
            MACHINE_DEPLOYMENT_NAME_LABEL.to_string(),
            machine_deployment.to_string(),
        )]),
        match_expressions: Vec::new(),
    }
}

/// Affinity terms for a VM of `machine_deployment`
///
/// `others` are the sibling deployments; they are sorted so equal inputs
/// always produce equal terms.
pub fn compute_affinity(machine_deployment: &str, others: &[String]) -> AffinitySpec {
    let mut others: Vec<String> = others
        .iter()
        .filter(|md| md.as_str() != machine_deployment)
        .cloned()
        .collect();
    others.sort();
    others.dedup();

    let mut preferred = vec![AffinityTerm {
        label_selector: deployment_selector(machine_deployment),
        topology_key: HOSTNAME_LABEL.to_string(),
    }];
    if !others.is_empty() {
        preferred.push(AffinityTerm {
            label_selector: LabelSelector {
                match_labels: BTreeMap::new(),
                match_expressions: vec![LabelSelectorRequirement {
                    key: MACHINE_DEPLOYMENT_NAME_LABEL.to_string(),
                    operator: LabelSelectorOperator::In,
                    values: others,
                }],
            },
            topology_key: ZONE_LABEL.to_string(),
        });
    }

    AffinitySpec {
        vm_affinity: Some(VmAffinity {
            required_during_scheduling_preferred_during_execution: vec![AffinityTerm {
                label_selector: deployment_selector(machine_deployment),
                topology_key: ZONE_LABEL.to_string(),
            }],
        }),
        vm_anti_affinity: Some(VmAntiAffinity {
            preferred_during_scheduling_preferred_during_execution: preferred,
        }),
    }
}

/// Affinity of the machine in `ctx`, or `None` when it is not subject to it
///
/// Control plane machines and machines of a deployment with a pinned failure
/// domain are placed without affinity.
pub async fn affinity_info(
    client: &Client,
    ctx: &SupervisorMachineContext,
    group: &VirtualMachineGroup,
) -> Result<Option<AffinityInfo>> {
    if ctx.machine.is_control_plane() {
        return Ok(None);
    }
    let Some(machine_deployment) = ctx.machine.machine_deployment() else {
        return Ok(None);
    };

    let labels = BTreeMap::from([(CLUSTER_NAME_LABEL.to_string(), ctx.cluster.name().to_string())]);
    let deployments: Vec<MachineDeployment> = client.list(ctx.cluster.namespace(), &labels).await?;
    let pinned = |md: &MachineDeployment| {
        md.spec
            .failure_domain
            .as_deref()
            .is_some_and(|fd| !fd.is_empty())
    };
    if deployments
        .iter()
        .any(|md| md.metadata.name == machine_deployment && pinned(md))
    {
        return Ok(None);
    }
    let others: Vec<String> = deployments
        .iter()
        .filter(|md| !pinned(md))
        .map(|md| md.metadata.name.clone())
        .collect();

    let zone = ctx
        .machine
        .spec
        .failure_domain
        .clone()
        .filter(|fd| !fd.is_empty())
        .or_else(|| {
            group
                .metadata
                .annotations
                .get(&format!("{}/{}", ZONE_ANNOTATION_PREFIX, machine_deployment))
                .cloned()
        });

    Ok(Some(AffinityInfo {
        affinity: compute_affinity(machine_deployment, &others),
        group_name: group.metadata.name.clone(),
        zone,
    }))
}

/// Apply `info` to the VM
///
/// Required terms are immutable once the VM exists and are only written at
/// creation; the preferred terms are refreshed every time.
pub fn apply_affinity(vm: &mut VirtualMachine, info: &AffinityInfo, creating: bool) {
    vm.spec.group_name = Some(info.group_name.clone());
    if let Some(zone) = &info.zone {
        vm.metadata.labels.insert(ZONE_LABEL.to_string(), zone.clone());
    }
    let affinity = vm.spec.affinity.get_or_insert_with(AffinitySpec::default);
    if creating {
        affinity.vm_affinity = info.affinity.vm_affinity.clone();
    }
    affinity.vm_anti_affinity = info.affinity.vm_anti_affinity.clone();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ClusterContext;
    use crate::meta::{CONTROL_PLANE_LABEL, ObjectMeta};
    use crate::resources::{Machine, MachineDeploymentSpec, VSphereMachine};
    use crate::store::MemoryStore;
    use std::sync::Arc;

    fn anti_affinity_values(spec: &AffinitySpec) -> Vec<String> {
        spec.vm_anti_affinity
            .as_ref()
            .and_then(|a| a.preferred_during_scheduling_preferred_during_execution.get(1))
            .map(|t| t.label_selector.match_expressions[0].values.clone())
            .unwrap_or_default()
    }

    #[test]
    fn test_affinity_is_sorted_and_stable() {
        let a = compute_affinity("md-b", &["md-c".into(), "md-a".into(), "md-b".into()]);
        let b = compute_affinity("md-b", &["md-a".into(), "md-b".into(), "md-c".into()]);
        assert_eq!(a, b);
        assert_eq!(anti_affinity_values(&a), vec!["md-a", "md-c"]);

        let required = &a.vm_affinity.as_ref().unwrap()
            .required_during_scheduling_preferred_during_execution[0];
        assert_eq!(required.topology_key, ZONE_LABEL);
        assert_eq!(
            required.label_selector.match_labels[MACHINE_DEPLOYMENT_NAME_LABEL],
            "md-b"
        );
    }

    #[test]
    fn test_single_deployment_only_spreads_hosts() {
        let spec = compute_affinity("md-0", &["md-0".into()]);
        let preferred = &spec
            .vm_anti_affinity
            .unwrap()
            .preferred_during_scheduling_preferred_during_execution;
        assert_eq!(preferred.len(), 1);
        assert_eq!(preferred[0].topology_key, HOSTNAME_LABEL);
    }

    #[test]
    fn test_required_terms_only_on_create() {
        let info = AffinityInfo {
            affinity: compute_affinity("md-0", &["md-1".into()]),
            group_name: "c1".to_string(),
            zone: Some("zone-a".to_string()),
        };
        let mut vm = VirtualMachine::default();
        apply_affinity(&mut vm, &info, false);
        let affinity = vm.spec.affinity.as_ref().unwrap();
        assert!(affinity.vm_affinity.is_none());
        assert!(affinity.vm_anti_affinity.is_some());
        assert_eq!(vm.spec.group_name.as_deref(), Some("c1"));
        assert_eq!(vm.metadata.labels[ZONE_LABEL], "zone-a");

        apply_affinity(&mut vm, &info, true);
        assert!(vm.spec.affinity.as_ref().unwrap().vm_affinity.is_some());
    }

    async fn context(client: &Client, control_plane: bool) -> (SupervisorMachineContext, VirtualMachineGroup) {
        for (name, fd) in [("md-0", None), ("md-1", None), ("md-pinned", Some("zone-c"))] {
            let md = MachineDeployment {
                metadata: ObjectMeta::new("default", name).with_label(CLUSTER_NAME_LABEL, "c1"),
                spec: MachineDeploymentSpec {
                    cluster_name: "c1".to_string(),
                    failure_domain: fd.map(str::to_string),
                },
            };
            client.create(&md).await.unwrap();
        }
        let mut cluster = ClusterContext::default();
        cluster.cluster.metadata = ObjectMeta::new("default", "c1");
        let mut machine = Machine {
            metadata: ObjectMeta::new("default", "worker-0")
                .with_label(MACHINE_DEPLOYMENT_NAME_LABEL, "md-0"),
            ..Default::default()
        };
        if control_plane {
            machine.metadata.labels.insert(CONTROL_PLANE_LABEL.to_string(), String::new());
        }
        let mut group = VirtualMachineGroup {
            metadata: ObjectMeta::new("default", "c1"),
            ..Default::default()
        };
        group
            .metadata
            .annotations
            .insert(format!("{}/md-0", ZONE_ANNOTATION_PREFIX), "zone-b".to_string());
        let ctx = SupervisorMachineContext {
            cluster,
            machine,
            vsphere_machine: VSphereMachine::default(),
        };
        (ctx, group)
    }

    #[tokio::test]
    async fn test_affinity_info_skips_pinned_deployments() {
        let client = Client::new(Arc::new(MemoryStore::new()));
        let (ctx, group) = context(&client, false).await;
        let info = affinity_info(&client, &ctx, &group).await.unwrap().unwrap();
        assert_eq!(info.group_name, "c1");
        assert_eq!(info.zone.as_deref(), Some("zone-b"));
        assert_eq!(anti_affinity_values(&info.affinity), vec!["md-1"]);
    }

    #[tokio::test]
    async fn test_no_affinity_for_control_plane_or_pinned() {
        let client = Client::new(Arc::new(MemoryStore::new()));
        let (ctx, group) = context(&client, true).await;
        assert!(affinity_info(&client, &ctx, &group).await.unwrap().is_none());

        let mut pinned = ctx.clone();
        pinned.machine.metadata.labels.remove(CONTROL_PLANE_LABEL);
        pinned
            .machine
            .metadata
            .labels
            .insert(MACHINE_DEPLOYMENT_NAME_LABEL.to_string(), "md-pinned".to_string());
        assert!(affinity_info(&client, &pinned, &group).await.unwrap().is_none());
    }
}
