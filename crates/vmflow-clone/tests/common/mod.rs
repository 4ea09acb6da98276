use std::sync::Arc;
use vmflow_cloud::fake::FakeVcenter;
use vmflow_cloud::{ObjectKind, ObjectRef};
use vmflow_session::{Params, Session, SessionCache};

pub const GIB_KIB: i64 = 1024 * 1024;

/// A small inventory: one datacenter, a cluster with three datastores, a
/// resource pool, default folder/pool/datastore and two networks.
pub struct TestVcenter {
    pub vc: FakeVcenter,
    pub cache: SessionCache,
    pub cluster_datastores: Vec<ObjectRef>,
    pub default_datastore: ObjectRef,
    pub default_folder: ObjectRef,
    pub pool: ObjectRef,
}

impl TestVcenter {
    pub fn new() -> Self {
        let vc = FakeVcenter::new();
        vc.add_object(ObjectKind::Datacenter, "dc0");

        let default_folder = vc.add_object(ObjectKind::Folder, "vm");
        vc.set_default(&default_folder);

        let (cluster, cluster_datastores) = vc.add_cluster("cluster0", &["ds-a", "ds-b", "ds-c"]);
        let pool = vc.add_resource_pool("pool0", &cluster);
        vc.set_default(&pool);

        let default_datastore = vc.add_object(ObjectKind::Datastore, "ds-default");
        vc.set_default(&default_datastore);

        vc.add_network("vm-network");
        vc.add_network("storage-network");

        let cache = SessionCache::new(Arc::new(vc.clone()), Arc::new(vc.clone()));
        Self {
            vc,
            cache,
            cluster_datastores,
            default_datastore,
            default_folder,
            pool,
        }
    }

    pub async fn session(&self) -> Arc<Session> {
        let params = Params::new()
            .with_server("vcenter.local")
            .with_datacenter("dc0")
            .with_user_info("administrator@vsphere.local", "pass");
        self.cache.get_or_create(&params).await.unwrap()
    }
}
