mod common;

use common::{GIB_KIB, TestVcenter};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::collections::HashSet;
use vmflow_clone::extra_config::{
    IGNITION_ENCODING_KEY, IGNITION_KEY, USERDATA_ENCODING_KEY, USERDATA_KEY,
};
use vmflow_clone::{
    BootstrapData, BootstrapFormat, CloneError, CloneMode, CloneSpecBuilder, ErrorKind,
    NetworkDeviceSpec, PciDeviceSpec, VirtualMachineSpec, issue_clone,
};
use vmflow_cloud::{DeviceOperation, DiskMoveType, MacAddressType, ObjectKind, VirtualDevice};

fn vm(template: &str) -> VirtualMachineSpec {
    VirtualMachineSpec {
        name: "worker-0".to_string(),
        uid: "6f1b7c2e-1111-4000-8000-000000000001".to_string(),
        template: template.to_string(),
        network: vec![NetworkDeviceSpec {
            network_name: "vm-network".to_string(),
            mac_addr: None,
        }],
        ..Default::default()
    }
}

fn builder() -> CloneSpecBuilder<StdRng> {
    CloneSpecBuilder::with_rng(StdRng::seed_from_u64(7))
}

fn disk_edits(spec: &vmflow_cloud::CloneSpec) -> Vec<i64> {
    spec.config
        .device_change
        .iter()
        .filter_map(|c| c.device.as_disk())
        .map(|d| d.capacity_kib)
        .collect()
}

#[tokio::test]
async fn test_unset_mode_with_current_snapshot_links_to_default_datastore() {
    let env = TestVcenter::new();
    env.vc.add_template("ubuntu-2204", &[20 * GIB_KIB], 1, &["golden"]);
    let session = env.session().await;

    let request = builder()
        .build(&session, &vm("ubuntu-2204"), None, None)
        .await
        .unwrap();

    assert_eq!(request.clone_mode, CloneMode::Linked);
    assert!(request.snapshot.is_some());
    assert_eq!(request.spec.snapshot, request.snapshot);
    assert!(disk_edits(&request.spec).is_empty());
    assert_eq!(request.spec.location.datastore, Some(env.default_datastore.clone()));
    assert_eq!(request.spec.location.pool, env.pool);
    assert_eq!(request.folder, env.default_folder);
    assert_eq!(
        request.spec.location.disk_move_type,
        DiskMoveType::CreateNewChildDiskBacking
    );
    assert_eq!(request.spec.location.disks.len(), 1);
    assert!(request
        .spec
        .location
        .disks
        .iter()
        .all(|l| l.disk_move_type == DiskMoveType::CreateNewChildDiskBacking
            && l.datastore == env.default_datastore));

    assert!(!request.spec.power_on);
    assert_eq!(request.spec.config.instance_uuid, "6f1b7c2e-1111-4000-8000-000000000001");
    assert!(request.spec.config.disk_uuid_enabled);
    assert!(request.spec.config.vapp_config_removed);
    assert!(request.storage_profile_id.is_none());
}

#[tokio::test]
async fn test_full_clone_grows_disks() {
    let env = TestVcenter::new();
    env.vc.add_template("ubuntu-2204", &[20 * GIB_KIB, 2 * GIB_KIB], 1, &["golden"]);
    let session = env.session().await;

    let mut spec = vm("ubuntu-2204");
    spec.clone_mode = Some(CloneMode::Full);
    spec.disk_gib = Some(40);

    let request = builder().build(&session, &spec, None, None).await.unwrap();
    assert_eq!(request.clone_mode, CloneMode::Full);
    assert!(request.snapshot.is_none());
    assert_eq!(disk_edits(&request.spec), vec![40 * GIB_KIB, 2 * GIB_KIB]);
    assert_eq!(
        request.spec.location.disk_move_type,
        DiskMoveType::MoveAllDiskBackingsAndConsolidate
    );
    assert!(request
        .spec
        .location
        .disks
        .iter()
        .all(|l| l.disk_move_type == DiskMoveType::MoveAllDiskBackingsAndDisallowSharing));
}

#[tokio::test]
async fn test_full_clone_rejects_downsize() {
    let env = TestVcenter::new();
    env.vc.add_template("ubuntu-2204", &[4 * GIB_KIB], 1, &[]);
    let session = env.session().await;

    let mut spec = vm("ubuntu-2204");
    spec.disk_gib = Some(3);

    let err = builder().build(&session, &spec, None, None).await.unwrap_err();
    assert!(matches!(err, CloneError::DiskDownsize { .. }));
    assert_eq!(err.kind(), ErrorKind::Placement);
    assert!(err.to_string().contains("4194304KiB > 3145728KiB"));

    spec.disk_gib = Some(5);
    let request = builder().build(&session, &spec, None, None).await.unwrap();
    assert_eq!(disk_edits(&request.spec), vec![5 * GIB_KIB]);
}

#[tokio::test]
async fn test_linked_clone_never_resizes() {
    let env = TestVcenter::new();
    env.vc.add_template("ubuntu-2204", &[4 * GIB_KIB], 1, &["golden"]);
    let session = env.session().await;

    for gib in [1, 4, 100] {
        let mut spec = vm("ubuntu-2204");
        spec.disk_gib = Some(gib);
        let request = builder().build(&session, &spec, None, None).await.unwrap();
        assert_eq!(request.clone_mode, CloneMode::Linked);
        assert!(disk_edits(&request.spec).is_empty());
    }
}

#[tokio::test]
async fn test_missing_named_snapshot_falls_back_to_full_clone() {
    // Preserved behavior: the lookup failure is logged and the clone becomes full.
    let env = TestVcenter::new();
    env.vc.add_template("ubuntu-2204", &[4 * GIB_KIB], 1, &["golden"]);
    let session = env.session().await;

    let mut spec = vm("ubuntu-2204");
    spec.clone_mode = Some(CloneMode::Linked);
    spec.snapshot = Some("does-not-exist".to_string());

    let request = builder().build(&session, &spec, None, None).await.unwrap();
    assert_eq!(request.clone_mode, CloneMode::Full);
    assert!(request.spec.snapshot.is_none());
    assert_eq!(disk_edits(&request.spec), vec![4 * GIB_KIB]);
}

#[tokio::test]
async fn test_legacy_and_modern_disks_always_conflict() {
    let env = TestVcenter::new();
    env.vc.add_template("ubuntu-2204", &[4 * GIB_KIB], 1, &[]);
    env.vc.add_template("ubuntu-2204-linked", &[4 * GIB_KIB], 1, &["golden"]);
    let session = env.session().await;

    // Full clone, then a template whose current snapshot makes it linked.
    for template in ["ubuntu-2204", "ubuntu-2204-linked"] {
        let mut spec = vm(template);
        spec.disk_gib = Some(10);
        spec.disks = vec![vmflow_clone::DiskSpec { size_gib: 10 }];

        let err = builder().build(&session, &spec, None, None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration, "{}", template);
        assert!(err.to_string().contains("mutually exclusive"), "{}", err);
    }

    let mut spec = vm("ubuntu-2204-linked");
    spec.clone_mode = Some(CloneMode::Linked);
    spec.snapshot = Some("golden".to_string());
    spec.additional_disks_gib = vec![8];
    spec.disks = vec![vmflow_clone::DiskSpec { size_gib: 10 }];
    assert!(builder().build(&session, &spec, None, None).await.is_err());
}

#[tokio::test]
async fn test_nics_are_replaced_not_accumulated() {
    let env = TestVcenter::new();
    env.vc.add_template("ubuntu-2204", &[4 * GIB_KIB], 2, &["golden"]);
    let session = env.session().await;

    let mut spec = vm("ubuntu-2204");
    spec.network.push(NetworkDeviceSpec {
        network_name: "storage-network".to_string(),
        mac_addr: Some("00:50:56:3f:00:01".to_string()),
    });

    let first = builder().build(&session, &spec, None, None).await.unwrap();
    let second = builder().build(&session, &spec, None, None).await.unwrap();
    assert_eq!(first.spec.config.device_change, second.spec.config.device_change);

    let changes = &first.spec.config.device_change;
    let removed: Vec<i32> = changes
        .iter()
        .filter(|c| c.operation == DeviceOperation::Remove)
        .map(|c| c.device.key())
        .collect();
    let added: Vec<_> = changes
        .iter()
        .filter(|c| c.operation == DeviceOperation::Add)
        .filter_map(|c| match &c.device {
            VirtualDevice::EthernetCard(nic) => Some(nic.clone()),
            _ => None,
        })
        .collect();

    assert_eq!(removed, vec![4000, 4001]);
    assert_eq!(added.iter().map(|n| n.key).collect::<Vec<_>>(), vec![-100, -101]);
    assert_eq!(added[0].address_type, MacAddressType::Generated);
    assert_eq!(added[1].address_type, MacAddressType::Manual);
    assert_eq!(added[1].mac_address.as_deref(), Some("00:50:56:3f:00:01"));

    // Removals come before additions.
    let last_remove = changes
        .iter()
        .rposition(|c| c.operation == DeviceOperation::Remove)
        .unwrap();
    let first_add = changes
        .iter()
        .position(|c| c.operation == DeviceOperation::Add)
        .unwrap();
    assert!(last_remove < first_add);
}

#[tokio::test]
async fn test_unknown_network_is_a_configuration_error() {
    let env = TestVcenter::new();
    env.vc.add_template("ubuntu-2204", &[4 * GIB_KIB], 1, &[]);
    let session = env.session().await;

    let mut spec = vm("ubuntu-2204");
    spec.network[0].network_name = "missing".to_string();

    let err = builder().build(&session, &spec, None, None).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert!(err.to_string().starts_with("find network missing"));
}

#[tokio::test]
async fn test_storage_policy_picks_only_compatible_datastores() {
    let env = TestVcenter::new();
    env.vc.add_template("ubuntu-2204", &[4 * GIB_KIB], 1, &["golden"]);
    let compatible = vec![env.cluster_datastores[0].clone(), env.cluster_datastores[2].clone()];
    let profile_id = env.vc.add_storage_policy("gold", &compatible);
    let session = env.session().await;

    let mut spec = vm("ubuntu-2204");
    spec.storage_policy_name = Some("gold".to_string());

    let builder = builder();
    let mut picked = HashSet::new();
    for _ in 0..50 {
        let request = builder.build(&session, &spec, None, None).await.unwrap();
        assert_eq!(request.storage_profile_id.as_deref(), Some(profile_id.as_str()));
        let ds = request.spec.location.datastore.clone().unwrap();
        assert!(compatible.contains(&ds), "picked incompatible datastore {}", ds);
        assert!(request.spec.location.disks.iter().all(|l| l.datastore == ds));
        picked.insert(ds);
    }
    assert_eq!(picked.len(), 2, "both compatible datastores should be picked");
}

#[tokio::test]
async fn test_storage_policy_with_declared_datastore() {
    let env = TestVcenter::new();
    env.vc.add_template("ubuntu-2204", &[4 * GIB_KIB], 1, &[]);
    env.vc
        .add_storage_policy("gold", &[env.cluster_datastores[0].clone()]);
    let session = env.session().await;

    let mut spec = vm("ubuntu-2204");
    spec.storage_policy_name = Some("gold".to_string());
    spec.datastore = Some("ds-a".to_string());
    let request = builder().build(&session, &spec, None, None).await.unwrap();
    assert_eq!(request.spec.location.datastore, Some(env.cluster_datastores[0].clone()));

    spec.datastore = Some("ds-b".to_string());
    let err = builder().build(&session, &spec, None, None).await.unwrap_err();
    assert!(matches!(err, CloneError::NoCompatibleDatastore { ref policy } if policy == "gold"));
    assert_eq!(err.kind(), ErrorKind::Placement);
}

#[tokio::test]
async fn test_storage_policy_without_compatible_datastores() {
    let env = TestVcenter::new();
    env.vc.add_template("ubuntu-2204", &[4 * GIB_KIB], 1, &[]);
    env.vc.add_storage_policy("empty", &[]);
    let session = env.session().await;

    let mut spec = vm("ubuntu-2204");
    spec.storage_policy_name = Some("empty".to_string());
    let err = builder().build(&session, &spec, None, None).await.unwrap_err();
    assert_eq!(
        err.to_string(),
        "no compatible datastores found for storage policy: empty"
    );
}

#[tokio::test]
async fn test_explicit_datastore_without_policy() {
    let env = TestVcenter::new();
    env.vc.add_template("ubuntu-2204", &[4 * GIB_KIB], 1, &[]);
    let session = env.session().await;

    let mut spec = vm("ubuntu-2204");
    spec.datastore = Some("ds-b".to_string());
    let request = builder().build(&session, &spec, None, None).await.unwrap();
    assert_eq!(request.spec.location.datastore, Some(env.cluster_datastores[1].clone()));
}

#[tokio::test]
async fn test_sizing_defaults() {
    let env = TestVcenter::new();
    env.vc.add_template("ubuntu-2204", &[4 * GIB_KIB], 1, &[]);
    let session = env.session().await;

    let mut spec = vm("ubuntu-2204");
    spec.num_cpus = 1;
    let request = builder().build(&session, &spec, None, None).await.unwrap();
    assert_eq!(request.spec.config.num_cpus, 2);
    assert_eq!(request.spec.config.num_cores_per_socket, 2);
    assert_eq!(request.spec.config.memory_mib, 2048);
    assert_eq!(request.spec.config.memory_reservation_locked_to_max, None);

    spec.num_cpus = 8;
    spec.num_cores_per_socket = 4;
    spec.memory_mib = 16384;
    spec.memory_reservation_locked_to_max = Some(false);
    spec.pci_devices = vec![PciDeviceSpec {
        device_id: Some(0x1eb8),
        vendor_id: Some(0x10de),
    }];
    let request = builder().build(&session, &spec, None, None).await.unwrap();
    assert_eq!(request.spec.config.num_cpus, 8);
    assert_eq!(request.spec.config.num_cores_per_socket, 4);
    assert_eq!(request.spec.config.memory_mib, 16384);
    assert_eq!(request.spec.config.memory_reservation_locked_to_max, Some(true));
}

#[tokio::test]
async fn test_template_lookup_by_instance_uuid_then_name() {
    let env = TestVcenter::new();
    let by_uuid = env.vc.add_template("ubuntu-2204", &[4 * GIB_KIB], 1, &[]);
    let instance_uuid = env.vc.vm(&by_uuid).unwrap().instance_uuid;
    let uuid_named = "42a7d3a1-0000-4000-8000-0000000000ff";
    let by_name = env.vc.add_template(uuid_named, &[4 * GIB_KIB], 1, &[]);
    let session = env.session().await;

    let request = builder()
        .build(&session, &vm(&instance_uuid), None, None)
        .await
        .unwrap();
    assert_eq!(request.template, by_uuid);

    // UUID-shaped but unknown as instance uuid: falls through to the name lookup.
    let request = builder().build(&session, &vm(uuid_named), None, None).await.unwrap();
    assert_eq!(request.template, by_name);

    let err = builder().build(&session, &vm("nope"), None, None).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
}

#[tokio::test]
async fn test_bootstrap_payload_in_extra_config() {
    let env = TestVcenter::new();
    env.vc.add_template("ubuntu-2204", &[4 * GIB_KIB], 1, &[]);
    let session = env.session().await;

    let get = |request: &vmflow_clone::CloneRequest, key: &str| {
        request
            .spec
            .config
            .extra_config
            .iter()
            .find(|o| o.key == key)
            .map(|o| o.value.clone())
    };

    let mut spec = vm("ubuntu-2204");
    spec.custom_vmx_keys
        .insert("sched.swap.vmxSwapEnabled".to_string(), "FALSE".to_string());
    let cloud_config = BootstrapData {
        value: b"#cloud-config\nruncmd: []\n".to_vec(),
        format: BootstrapFormat::CloudConfig,
    };
    let request = builder()
        .build(&session, &spec, Some(&cloud_config), Some(&b"instance-id: worker-0"[..]))
        .await
        .unwrap();
    assert!(get(&request, USERDATA_KEY).is_some());
    assert_eq!(get(&request, USERDATA_ENCODING_KEY).as_deref(), Some("base64"));
    assert!(get(&request, "guestinfo.metadata").is_some());
    assert_eq!(get(&request, "sched.swap.vmxSwapEnabled").as_deref(), Some("FALSE"));

    let ignition = BootstrapData {
        value: br#"{"ignition":{"version":"3.2.0"}}"#.to_vec(),
        format: BootstrapFormat::Ignition,
    };
    let request = builder()
        .build(&session, &spec, Some(&ignition), None)
        .await
        .unwrap();
    assert!(get(&request, IGNITION_KEY).is_some());
    assert_eq!(get(&request, IGNITION_ENCODING_KEY).as_deref(), Some("base64"));
    assert!(get(&request, USERDATA_KEY).is_none());
}

#[tokio::test]
async fn test_issue_clone_returns_task() {
    let env = TestVcenter::new();
    let template = env.vc.add_template("ubuntu-2204", &[4 * GIB_KIB], 1, &["golden"]);
    let session = env.session().await;

    let request = builder()
        .build(&session, &vm("ubuntu-2204"), None, None)
        .await
        .unwrap();
    let task = issue_clone(&session, &request).await.unwrap();

    assert!(task.is(ObjectKind::Task));
    let clones = env.vc.clones();
    assert_eq!(clones.len(), 1);
    assert_eq!(clones[0].template, template);
    assert_eq!(clones[0].name, "worker-0");
    assert_eq!(clones[0].spec, request.spec);
}

#[tokio::test]
async fn test_missing_uid_is_rejected() {
    let env = TestVcenter::new();
    env.vc.add_template("ubuntu-2204", &[4 * GIB_KIB], 1, &[]);
    let session = env.session().await;

    let mut spec = vm("ubuntu-2204");
    spec.uid.clear();
    let err = builder().build(&session, &spec, None, None).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
}

#[tokio::test]
async fn test_one_builder_serves_concurrent_builds() {
    let env = TestVcenter::new();
    env.vc.add_template("ubuntu-2204", &[4 * GIB_KIB], 1, &[]);
    let compatible = vec![env.cluster_datastores[1].clone()];
    env.vc.add_storage_policy("gold", &compatible);
    let session = env.session().await;

    let mut spec = vm("ubuntu-2204");
    spec.storage_policy_name = Some("gold".to_string());
    let mut other = spec.clone();
    other.name = "worker-1".to_string();
    other.uid = "6f1b7c2e-1111-4000-8000-000000000002".to_string();

    let builder = builder();
    let (first, second) = tokio::join!(
        builder.build(&session, &spec, None, None),
        builder.build(&session, &other, None, None)
    );
    let (first, second) = (first.unwrap(), second.unwrap());
    assert_eq!(first.spec.location.datastore, Some(compatible[0].clone()));
    assert_eq!(second.spec.location.datastore, Some(compatible[0].clone()));
    assert_eq!(second.spec.config.instance_uuid, other.uid);
}
