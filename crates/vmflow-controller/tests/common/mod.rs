#![allow(dead_code)]

use std::sync::Arc;
use vmflow_cloud::fake::FakeVcenter;
use vmflow_cloud::{ObjectKind, ObjectRef};
use vmflow_controller::meta::{CLUSTER_NAME_LABEL, CONTROL_PLANE_LABEL, MACHINE_DEPLOYMENT_NAME_LABEL};
use vmflow_controller::resources::{
    ApiEndpoint, Bootstrap, Cluster, ClusterSpec, GroupMember, Machine, MachineDeployment,
    MachineDeploymentSpec, MachineSpec, Secret, VSphereCluster, VSphereMachine,
    VSphereMachineSpec, VimMachine, VimMachineSpec, VirtualMachine, VirtualMachineGroup,
    VirtualMachineGroupSpec,
};
use vmflow_controller::{Client, MemoryStore, ObjectKey, ObjectMeta};
use vmflow_clone::{NetworkDeviceSpec, VirtualMachineSpec};
use vmflow_session::{Params, Session, SessionCache};

pub const NAMESPACE: &str = "default";
pub const CLUSTER: &str = "c1";

/// Orchestration store seeded with one cluster
pub struct TestStore {
    pub store: MemoryStore,
    pub client: Client,
}

impl TestStore {
    pub async fn new() -> Self {
        let store = MemoryStore::new();
        let client = Client::new(Arc::new(store.clone()));
        let cluster = Cluster {
            metadata: ObjectMeta::new(NAMESPACE, CLUSTER),
            spec: ClusterSpec {
                control_plane_endpoint: Some(ApiEndpoint {
                    host: "10.0.0.10".to_string(),
                    port: 6443,
                }),
            },
            ..Default::default()
        };
        client.create(&cluster).await.unwrap();
        let mut vsphere_cluster = VSphereCluster {
            metadata: ObjectMeta::new(NAMESPACE, CLUSTER),
            ..Default::default()
        };
        vsphere_cluster.status.resource_policy_name = Some("c1-policy".to_string());
        vsphere_cluster.status.failure_domains = vec!["zone-a".to_string(), "zone-b".to_string()];
        client.create(&vsphere_cluster).await.unwrap();
        Self { store, client }
    }

    pub fn key(name: &str) -> ObjectKey {
        ObjectKey::new(NAMESPACE, name)
    }

    /// Declare a cluster machine; workers belong to `md-0`
    pub async fn add_machine(&self, name: &str, control_plane: bool, with_bootstrap: bool) -> Machine {
        let mut metadata = ObjectMeta::new(NAMESPACE, name).with_label(CLUSTER_NAME_LABEL, CLUSTER);
        metadata.uid = format!("uid-{}", name);
        if control_plane {
            metadata.labels.insert(CONTROL_PLANE_LABEL.to_string(), String::new());
        } else {
            metadata
                .labels
                .insert(MACHINE_DEPLOYMENT_NAME_LABEL.to_string(), "md-0".to_string());
        }
        let machine = Machine {
            metadata,
            spec: MachineSpec {
                cluster_name: CLUSTER.to_string(),
                version: Some("v1.30.0".to_string()),
                bootstrap: Bootstrap {
                    data_secret_name: with_bootstrap.then(|| format!("{}-data", name)),
                },
                failure_domain: None,
            },
        };
        if with_bootstrap {
            self.add_bootstrap_secret(name).await;
        }
        self.client.create(&machine).await.unwrap()
    }

    pub async fn add_bootstrap_secret(&self, name: &str) {
        let secret = Secret {
            metadata: ObjectMeta::new(NAMESPACE, format!("{}-data", name)),
            data: [("value".to_string(), "#cloud-config\nruncmd: []\n".to_string())]
                .into_iter()
                .collect(),
        };
        self.client.create(&secret).await.unwrap();
    }

    pub async fn add_vsphere_machine(&self, name: &str) -> VSphereMachine {
        let machine = VSphereMachine {
            metadata: ObjectMeta::new(NAMESPACE, name).with_label(CLUSTER_NAME_LABEL, CLUSTER),
            spec: VSphereMachineSpec {
                image_name: "ubuntu-2204".to_string(),
                class_name: "best-effort-small".to_string(),
                storage_class: "gold".to_string(),
                ..Default::default()
            },
            ..Default::default()
        };
        self.client.create(&machine).await.unwrap()
    }

    pub async fn add_vim_machine(&self, name: &str, template: &str) -> VimMachine {
        let mut metadata = ObjectMeta::new(NAMESPACE, name).with_label(CLUSTER_NAME_LABEL, CLUSTER);
        metadata.uid = format!("uid-{}", name);
        let machine = VimMachine {
            metadata,
            spec: VimMachineSpec {
                vm: VirtualMachineSpec {
                    template: template.to_string(),
                    network: vec![NetworkDeviceSpec {
                        network_name: "vm-network".to_string(),
                        mac_addr: None,
                    }],
                    ..Default::default()
                },
                ..Default::default()
            },
            ..Default::default()
        };
        self.client.create(&machine).await.unwrap()
    }

    pub async fn add_machine_deployment(&self, name: &str, failure_domain: Option<&str>) {
        let md = MachineDeployment {
            metadata: ObjectMeta::new(NAMESPACE, name).with_label(CLUSTER_NAME_LABEL, CLUSTER),
            spec: MachineDeploymentSpec {
                cluster_name: CLUSTER.to_string(),
                failure_domain: failure_domain.map(str::to_string),
            },
        };
        self.client.create(&md).await.unwrap();
    }

    pub async fn add_group(&self, members: &[&str]) {
        let group = VirtualMachineGroup {
            metadata: ObjectMeta::new(NAMESPACE, CLUSTER),
            spec: VirtualMachineGroupSpec {
                members: members
                    .iter()
                    .map(|m| GroupMember {
                        name: m.to_string(),
                        kind: VirtualMachine::KIND_NAME.to_string(),
                    })
                    .collect(),
            },
        };
        self.client.create(&group).await.unwrap();
    }

    pub async fn vm(&self, name: &str) -> Option<VirtualMachine> {
        self.client.find(&Self::key(name)).await.unwrap()
    }

    /// Play the VM service: update the observed status of a VM object
    pub async fn observe(&self, name: &str, f: impl FnOnce(&mut VirtualMachine)) {
        let live: VirtualMachine = self.client.get(&Self::key(name)).await.unwrap();
        let mut observed = live.clone();
        f(&mut observed);
        self.client.patch(&live, &observed).await.unwrap();
    }
}

/// Fake hypervisor with a template, a default placement and one network
pub struct TestVcenter {
    pub vc: FakeVcenter,
    pub cache: SessionCache,
    pub template: ObjectRef,
}

impl TestVcenter {
    pub fn new() -> Self {
        let vc = FakeVcenter::new();
        vc.add_object(ObjectKind::Datacenter, "dc0");
        let folder = vc.add_object(ObjectKind::Folder, "vm");
        vc.set_default(&folder);
        let (cluster, _) = vc.add_cluster("cluster0", &["ds-a"]);
        let pool = vc.add_resource_pool("pool0", &cluster);
        vc.set_default(&pool);
        let datastore = vc.add_object(ObjectKind::Datastore, "ds-default");
        vc.set_default(&datastore);
        vc.add_network("vm-network");
        let template = vc.add_template("ubuntu-2204", &[20 * 1024 * 1024], 1, &["golden"]);

        let cache = SessionCache::new(Arc::new(vc.clone()), Arc::new(vc.clone()));
        Self { vc, cache, template }
    }

    pub async fn session(&self) -> Arc<Session> {
        let params = Params::new()
            .with_server("vcenter.local")
            .with_datacenter("dc0")
            .with_user_info("administrator@vsphere.local", "pass");
        self.cache.get_or_create(&params).await.unwrap()
    }
}
