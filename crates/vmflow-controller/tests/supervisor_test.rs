mod common;

use common::TestStore;
use std::sync::Arc;
use vmflow_controller::conditions::{
    POWERING_ON_REASON, VM_CREATION_FAILED_REASON, VM_PROVISIONED_CONDITION,
    VM_PROVISION_STARTED_REASON, WAITING_FOR_BIOS_UUID_REASON, WAITING_FOR_BOOTSTRAP_DATA_REASON,
    WAITING_FOR_GROUP_MEMBERSHIP_REASON, WAITING_FOR_NETWORK_ADDRESS_REASON,
    WAITING_FOR_PLACEMENT_GROUP_REASON,
};
use vmflow_controller::meta::{MACHINE_DEPLOYMENT_NAME_LABEL, ZONE_LABEL};
use vmflow_controller::resources::{
    ConfigMap, InterfaceStatus, MachineVolume, VSphereMachine, VirtualMachine, VmCondition,
    VmPowerState,
};
use vmflow_controller::supervisor::{
    CLUSTER_MODULE_ANNOTATION, CLUSTER_ROLE_LABEL, CLUSTER_SELECTOR_LABEL,
    CONTROL_PLANE_MODULE_GROUP, PROVIDER_TAGS_ANNOTATION, WORKER_TAG,
};
use vmflow_controller::{
    DummyLbNetworkProvider, DummyNetworkProvider, MACHINE_FINALIZER, NetworkProvider,
    ProvisionError, Provisioner, VmPhase,
};

fn provisioner(env: &TestStore) -> Provisioner {
    Provisioner::new(env.client.clone(), Arc::new(DummyNetworkProvider))
}

async fn reconcile(
    provisioner: &Provisioner,
    name: &str,
) -> (vmflow_controller::Result<bool>, VSphereMachine) {
    let mut ctx = provisioner
        .supervisor_context(&TestStore::key(name))
        .await
        .unwrap();
    let result = provisioner.reconcile(&mut ctx).await;
    let machine = provisioner
        .client()
        .get(&TestStore::key(name))
        .await
        .unwrap();
    (result, machine)
}

fn reason(machine: &VSphereMachine) -> String {
    machine
        .status
        .conditions
        .get(VM_PROVISIONED_CONDITION)
        .map(|c| c.reason.clone())
        .unwrap_or_default()
}

#[tokio::test]
async fn test_missing_version_fails_without_vm() {
    let env = TestStore::new().await;
    let mut machine = env.add_machine("worker-0", false, true).await;
    let live = machine.clone();
    machine.spec.version = None;
    env.client.patch(&live, &machine).await.unwrap();
    env.add_vsphere_machine("worker-0").await;

    let (result, machine) = reconcile(&provisioner(&env), "worker-0").await;
    let err = result.unwrap_err();
    assert!(matches!(err, ProvisionError::MissingVersion(_)));
    assert_eq!(reason(&machine), VM_CREATION_FAILED_REASON);
    assert!(
        machine.status.conditions.get(VM_PROVISIONED_CONDITION).unwrap().message
            .contains("missing kubernetes version for Machine default/worker-0")
    );
    assert!(env.vm("worker-0").await.is_none());
}

#[tokio::test]
async fn test_waits_for_bootstrap_data() {
    let env = TestStore::new().await;
    env.add_machine("worker-0", false, false).await;
    env.add_vsphere_machine("worker-0").await;

    let (result, machine) = reconcile(&provisioner(&env), "worker-0").await;
    assert!(result.unwrap());
    assert_eq!(reason(&machine), WAITING_FOR_BOOTSTRAP_DATA_REASON);
    assert!(machine.metadata.finalizers.contains(&MACHINE_FINALIZER.to_string()));
    assert!(env.vm("worker-0").await.is_none());
    assert_eq!(env.store.count("ConfigMap"), 0);
}

#[tokio::test]
async fn test_phases_advance_with_observed_state() {
    let env = TestStore::new().await;
    env.add_machine("worker-0", false, true).await;
    env.add_vsphere_machine("worker-0").await;
    let provisioner = provisioner(&env);
    let mut phases = Vec::new();

    let (result, machine) = reconcile(&provisioner, "worker-0").await;
    assert!(result.unwrap());
    assert_eq!(reason(&machine), VM_PROVISION_STARTED_REASON);
    phases.push(machine.status.vm_status);

    let vm = env.vm("worker-0").await.unwrap();
    assert_eq!(vm.spec.image_name, "ubuntu-2204");
    assert_eq!(vm.spec.class_name, "best-effort-small");
    assert_eq!(vm.spec.power_state, VmPowerState::PoweredOn);
    assert_eq!(vm.spec.resource_policy_name.as_deref(), Some("c1-policy"));
    let metadata = vm.spec.vm_metadata.as_ref().unwrap();
    assert_eq!(metadata.config_map_name, "worker-0-bootstrap");
    assert_eq!(metadata.transport, "ExtraConfig");
    assert_eq!(vm.metadata.labels[CLUSTER_SELECTOR_LABEL], "c1");
    assert_eq!(vm.metadata.labels[CLUSTER_ROLE_LABEL], "node");
    assert_eq!(vm.metadata.annotations[PROVIDER_TAGS_ANNOTATION], WORKER_TAG);
    assert_eq!(vm.metadata.annotations[CLUSTER_MODULE_ANNOTATION], "md-0");
    assert!(vm.spec.readiness_probe.is_none());

    let config: ConfigMap = env
        .client
        .get(&TestStore::key("worker-0-bootstrap"))
        .await
        .unwrap();
    assert_eq!(config.data["guestinfo.userdata.encoding"], "base64");
    assert_eq!(config.data["guestinfo.metadata.encoding"], "base64");

    env.observe("worker-0", |vm| vm.status.created = true).await;
    let (result, machine) = reconcile(&provisioner, "worker-0").await;
    assert!(result.unwrap());
    assert_eq!(reason(&machine), POWERING_ON_REASON);
    phases.push(machine.status.vm_status);

    env.observe("worker-0", |vm| vm.status.power_state = Some(VmPowerState::PoweredOn))
        .await;
    let (result, machine) = reconcile(&provisioner, "worker-0").await;
    assert!(result.unwrap());
    assert_eq!(reason(&machine), WAITING_FOR_NETWORK_ADDRESS_REASON);
    phases.push(machine.status.vm_status);

    env.observe("worker-0", |vm| {
        vm.status.vm_ip = Some("10.0.0.21".to_string());
        vm.status.interfaces = vec![InterfaceStatus {
            name: "eth0".to_string(),
            device_key: 4000,
            mac_addr: Some("00:50:56:aa:00:01".to_string()),
            ..Default::default()
        }];
    })
    .await;
    let (result, machine) = reconcile(&provisioner, "worker-0").await;
    assert!(result.unwrap());
    assert_eq!(reason(&machine), WAITING_FOR_BIOS_UUID_REASON);
    phases.push(machine.status.vm_status);

    env.observe("worker-0", |vm| {
        vm.status.bios_uuid = Some("4217-aaaa".to_string())
    })
    .await;
    let (result, machine) = reconcile(&provisioner, "worker-0").await;
    assert!(!result.unwrap());
    phases.push(machine.status.vm_status);
    assert!(machine.status.ready);
    assert!(machine.status.conditions.is_true(VM_PROVISIONED_CONDITION));
    assert_eq!(machine.spec.provider_id.as_deref(), Some("vsphere://4217-aaaa"));
    assert_eq!(machine.status.id.as_deref(), Some("4217-aaaa"));
    assert_eq!(machine.status.ip_addr.as_deref(), Some("10.0.0.21"));
    assert_eq!(machine.status.network[0].name, "eth0");

    assert_eq!(
        phases,
        vec![
            VmPhase::Pending,
            VmPhase::Created,
            VmPhase::PoweredOn,
            VmPhase::PoweredOn,
            VmPhase::Ready
        ]
    );

    // Steady state: nothing left to do, nothing rewritten.
    let generation = machine.metadata.generation;
    let (result, machine) = reconcile(&provisioner, "worker-0").await;
    assert!(!result.unwrap());
    assert_eq!(machine.metadata.generation, generation);
}

#[tokio::test]
async fn test_fields_set_by_others_survive() {
    let env = TestStore::new().await;
    env.add_machine("worker-0", false, true).await;
    env.add_vsphere_machine("worker-0").await;
    let provisioner = provisioner(&env);
    reconcile(&provisioner, "worker-0").await.0.unwrap();

    env.observe("worker-0", |vm| {
        vm.metadata
            .labels
            .insert("cloud-provider/owned".to_string(), "yes".to_string());
        vm.spec.network_interfaces.push(vmflow_controller::resources::VmNetworkInterface {
            name: "eth9".to_string(),
            network_name: "side-network".to_string(),
            network_type: None,
        });
    })
    .await;
    reconcile(&provisioner, "worker-0").await.0.unwrap();

    let vm = env.vm("worker-0").await.unwrap();
    assert_eq!(vm.metadata.labels["cloud-provider/owned"], "yes");
    assert_eq!(vm.spec.network_interfaces.len(), 1);
    assert_eq!(env.store.count("VirtualMachine"), 1);
}

#[tokio::test]
async fn test_failed_precondition_is_an_error() {
    let env = TestStore::new().await;
    env.add_machine("worker-0", false, true).await;
    env.add_vsphere_machine("worker-0").await;
    let provisioner = provisioner(&env);
    reconcile(&provisioner, "worker-0").await.0.unwrap();

    env.observe("worker-0", |vm| {
        vm.status.conditions.push(VmCondition {
            type_: "VirtualMachineImageReady".to_string(),
            status: false,
            reason: "VirtualMachineImageNotFound".to_string(),
            message: "image ubuntu-2204 not found".to_string(),
        });
    })
    .await;
    let (result, machine) = reconcile(&provisioner, "worker-0").await;
    let err = result.unwrap_err();
    assert!(matches!(err, ProvisionError::PreconditionFailed { .. }));
    assert_eq!(reason(&machine), "VirtualMachineImageNotFound");
    let condition = machine.status.conditions.get(VM_PROVISIONED_CONDITION).unwrap();
    assert_eq!(condition.severity, vmflow_controller::Severity::Error);
    assert_eq!(condition.message, "image ubuntu-2204 not found");
}

#[tokio::test]
async fn test_control_plane_probe_and_annotations() {
    let env = TestStore::new().await;
    let cluster: vmflow_controller::resources::Cluster =
        env.client.get(&TestStore::key("c1")).await.unwrap();
    let mut ready = cluster.clone();
    ready.status.control_plane_ready = true;
    env.client.patch(&cluster, &ready).await.unwrap();

    env.add_machine("cp-0", true, true).await;
    env.add_vsphere_machine("cp-0").await;
    let network: Arc<dyn NetworkProvider> = Arc::new(DummyLbNetworkProvider);
    let provisioner = Provisioner::new(env.client.clone(), network);
    reconcile(&provisioner, "cp-0").await.0.unwrap();

    let vm = env.vm("cp-0").await.unwrap();
    assert_eq!(vm.spec.readiness_probe.as_ref().unwrap().tcp_port, 6443);
    assert_eq!(vm.metadata.labels[CLUSTER_ROLE_LABEL], "controlplane");
    assert_eq!(
        vm.metadata.annotations[CLUSTER_MODULE_ANNOTATION],
        CONTROL_PLANE_MODULE_GROUP
    );
    assert!(vm.spec.affinity.is_none());
}

#[tokio::test]
async fn test_volumes_are_claimed_and_attached_once() {
    let env = TestStore::new().await;
    env.add_machine("worker-0", false, true).await;
    let machine = env.add_vsphere_machine("worker-0").await;
    let mut with_volumes = machine.clone();
    with_volumes.spec.volumes = vec![MachineVolume {
        name: "etcd".to_string(),
        capacity: "4Gi".to_string(),
        storage_class: None,
    }];
    env.client.patch(&machine, &with_volumes).await.unwrap();

    let provisioner = provisioner(&env);
    reconcile(&provisioner, "worker-0").await.0.unwrap();
    reconcile(&provisioner, "worker-0").await.0.unwrap();

    let vm = env.vm("worker-0").await.unwrap();
    assert_eq!(vm.spec.volumes.len(), 1);
    assert_eq!(vm.spec.volumes[0].claim_name, "worker-0-etcd");
    assert_eq!(env.store.count("PersistentVolumeClaim"), 1);
}

#[tokio::test]
async fn test_auto_placement_waits_for_group_membership() {
    let env = TestStore::new().await;
    env.add_machine("worker-0", false, true).await;
    env.add_vsphere_machine("worker-0").await;
    env.add_machine_deployment("md-0", None).await;
    env.add_machine_deployment("md-1", None).await;
    env.add_machine_deployment("md-2", Some("zone-b")).await;
    let provisioner = provisioner(&env).with_auto_placement(true);

    let (result, machine) = reconcile(&provisioner, "worker-0").await;
    assert!(result.unwrap());
    assert_eq!(reason(&machine), WAITING_FOR_PLACEMENT_GROUP_REASON);
    assert!(env.vm("worker-0").await.is_none());

    env.add_group(&["worker-1"]).await;
    let (result, machine) = reconcile(&provisioner, "worker-0").await;
    assert!(result.unwrap());
    assert_eq!(reason(&machine), WAITING_FOR_GROUP_MEMBERSHIP_REASON);
    assert!(env.vm("worker-0").await.is_none());

    let group: vmflow_controller::resources::VirtualMachineGroup =
        env.client.get(&TestStore::key("c1")).await.unwrap();
    let mut member = group.clone();
    member.spec.members.push(vmflow_controller::resources::GroupMember {
        name: "worker-0".to_string(),
        kind: VirtualMachine::KIND_NAME.to_string(),
    });
    member.metadata.annotations.insert(
        "zone.vmware.infrastructure.cluster.x-k8s.io/md-0".to_string(),
        "zone-a".to_string(),
    );
    env.client.patch(&group, &member).await.unwrap();

    let (result, machine) = reconcile(&provisioner, "worker-0").await;
    assert!(result.unwrap());
    assert_eq!(reason(&machine), VM_PROVISION_STARTED_REASON);

    let vm = env.vm("worker-0").await.unwrap();
    assert_eq!(vm.spec.group_name.as_deref(), Some("c1"));
    assert_eq!(vm.metadata.labels[ZONE_LABEL], "zone-a");
    let affinity = vm.spec.affinity.as_ref().unwrap();
    let required = &affinity
        .vm_affinity
        .as_ref()
        .unwrap()
        .required_during_scheduling_preferred_during_execution[0];
    assert_eq!(required.label_selector.match_labels[MACHINE_DEPLOYMENT_NAME_LABEL], "md-0");
    let preferred = &affinity
        .vm_anti_affinity
        .as_ref()
        .unwrap()
        .preferred_during_scheduling_preferred_during_execution;
    assert_eq!(preferred.len(), 2);
    assert_eq!(preferred[1].label_selector.match_expressions[0].values, vec!["md-1"]);
}

#[tokio::test]
async fn test_delete_paths() {
    let env = TestStore::new().await;
    env.add_machine("worker-0", false, true).await;
    env.add_vsphere_machine("worker-0").await;
    let provisioner = provisioner(&env);
    reconcile(&provisioner, "worker-0").await.0.unwrap();
    assert!(env.vm("worker-0").await.is_some());

    env.client
        .delete::<VSphereMachine>(&TestStore::key("worker-0"))
        .await
        .unwrap();

    // First pass deletes the VM object.
    let (result, machine) = reconcile(&provisioner, "worker-0").await;
    assert!(result.unwrap());
    assert_eq!(machine.status.vm_status, VmPhase::Deleting);
    assert!(env.vm("worker-0").await.is_none());

    // Second pass sees it gone and releases the machine.
    let mut ctx = provisioner
        .supervisor_context(&TestStore::key("worker-0"))
        .await
        .unwrap();
    assert!(!provisioner.reconcile(&mut ctx).await.unwrap());
    let released: Option<VSphereMachine> =
        env.client.find(&TestStore::key("worker-0")).await.unwrap();
    assert!(released.is_none());
}

#[tokio::test]
async fn test_recreated_vm_starts_over() {
    let env = TestStore::new().await;
    env.add_machine("worker-0", false, true).await;
    env.add_vsphere_machine("worker-0").await;
    let provisioner = provisioner(&env);

    let ready = |uuid: &'static str, ip: &'static str| {
        move |vm: &mut VirtualMachine| {
            vm.status.created = true;
            vm.status.power_state = Some(VmPowerState::PoweredOn);
            vm.status.vm_ip = Some(ip.to_string());
            vm.status.bios_uuid = Some(uuid.to_string());
        }
    };

    let (result, _) = reconcile(&provisioner, "worker-0").await;
    assert!(result.unwrap());
    env.observe("worker-0", ready("4217-aaaa", "10.0.0.21")).await;
    let (result, machine) = reconcile(&provisioner, "worker-0").await;
    assert!(!result.unwrap());
    assert_eq!(machine.status.vm_status, VmPhase::Ready);

    env.client
        .delete::<VirtualMachine>(&TestStore::key("worker-0"))
        .await
        .unwrap();
    assert!(env.vm("worker-0").await.is_none());

    let (result, machine) = reconcile(&provisioner, "worker-0").await;
    assert!(result.unwrap());
    assert!(env.vm("worker-0").await.is_some());
    assert_eq!(machine.status.vm_status, VmPhase::Pending);
    assert!(!machine.status.ready);
    assert_eq!(machine.status.id, None);
    assert_eq!(machine.status.ip_addr, None);
    assert!(machine.status.network.is_empty());
    assert_eq!(reason(&machine), VM_PROVISION_STARTED_REASON);

    env.observe("worker-0", ready("4217-bbbb", "10.0.0.22")).await;
    let (result, machine) = reconcile(&provisioner, "worker-0").await;
    assert!(!result.unwrap());
    assert_eq!(machine.status.vm_status, VmPhase::Ready);
    assert!(machine.status.ready);
    assert_eq!(machine.status.id.as_deref(), Some("4217-bbbb"));
    assert_eq!(machine.status.ip_addr.as_deref(), Some("10.0.0.22"));
    assert_eq!(machine.spec.provider_id.as_deref(), Some("vsphere://4217-bbbb"));
}
