//! In-memory management plane for tests
//!
//! `FakeVcenter` keeps a small inventory (datacenters, folders, pools,
//! clusters, datastores, networks, templates, storage policies) and a
//! simulated task engine. Clones stay in flight until the test completes
//! the task, so callers can observe the window between "clone issued" and
//! "VM exists".

use crate::api::{
    ClientCertificate, Endpoint, GuestInfo, GuestNic, ManagementApi, ManagementConnector,
    PowerState, SignedToken, SnapshotInfo, SnapshotTree, StoragePolicyApi, TaggingApi,
    TaggingConnector, TaskInfo, TaskState, UserSession, VmProperties,
};
use crate::clone_spec::CloneSpec;
use crate::device::{
    DeviceOperation, DiskBacking, EthernetCardType, MacAddressType, NetworkBacking,
    VirtualDevice, VirtualDisk, VirtualEthernetCard,
};
use crate::error::{CloudError, Result};
use crate::object::{ObjectKind, ObjectRef, PlacementHub};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// Call counters
#[derive(Debug, Default)]
pub struct Counters {
    pub connects: AtomicUsize,
    pub logins: AtomicUsize,
    pub token_logins: AtomicUsize,
    pub tagging_logins: AtomicUsize,
    pub logouts: AtomicUsize,
    pub keepalive_probes: AtomicUsize,
    pub clones: AtomicUsize,
    pub policy_checks: AtomicUsize,
}

impl Counters {
    pub fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

/// A clone issued against the fake
#[derive(Debug, Clone)]
pub struct CloneRecord {
    pub template: ObjectRef,
    pub folder: ObjectRef,
    pub name: String,
    pub spec: CloneSpec,
    pub task: ObjectRef,
    pub vm: ObjectRef,
}

#[derive(Default)]
struct Inventory {
    next_id: u64,
    generation: u64,
    tagging_generation: u64,
    credentials: Option<(String, String)>,
    fail_keepalive: bool,
    fail_tagging_login: bool,
    names: HashMap<(ObjectKind, String), ObjectRef>,
    defaults: HashMap<ObjectKind, ObjectRef>,
    vms: HashMap<String, VmProperties>,
    pending_vms: HashMap<String, (ObjectRef, VmProperties)>,
    networks: HashMap<String, NetworkBacking>,
    pool_owners: HashMap<String, ObjectRef>,
    cluster_datastores: HashMap<String, Vec<ObjectRef>>,
    policies: HashMap<String, (String, Vec<String>)>,
    tasks: HashMap<String, TaskInfo>,
    clones: Vec<CloneRecord>,
}

impl Inventory {
    fn next(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}-{}", prefix, self.next_id)
    }

    fn task(&mut self, description_id: &str, entity: &ObjectRef, state: TaskState) -> ObjectRef {
        let task = ObjectRef::new(ObjectKind::Task, self.next("task"));
        self.tasks.insert(
            task.value.clone(),
            TaskInfo {
                task: task.clone(),
                description_id: description_id.to_string(),
                state,
                entity: Some(entity.clone()),
                result: None,
                error: None,
            },
        );
        task
    }
}

/// In-memory management plane
#[derive(Clone, Default)]
pub struct FakeVcenter {
    inventory: Arc<Mutex<Inventory>>,
    counters: Arc<Counters>,
}

impl FakeVcenter {
    pub fn new() -> Self {
        Self::default()
    }

    fn inv(&self) -> MutexGuard<'_, Inventory> {
        self.inventory.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn counters(&self) -> &Counters {
        &self.counters
    }

    /// Only accept this username/password pair (any pair is accepted otherwise)
    pub fn with_credentials(self, username: &str, password: &str) -> Self {
        self.inv().credentials = Some((username.to_string(), password.to_string()));
        self
    }

    pub fn add_object(&self, kind: ObjectKind, name: &str) -> ObjectRef {
        let mut inv = self.inv();
        let prefix = match kind {
            ObjectKind::Datacenter => "datacenter",
            ObjectKind::Folder => "group",
            ObjectKind::ResourcePool => "resgroup",
            ObjectKind::ClusterComputeResource => "domain-c",
            ObjectKind::HostSystem => "host",
            ObjectKind::Datastore => "datastore",
            ObjectKind::Network => "network",
            ObjectKind::VirtualMachine => "vm",
            ObjectKind::VirtualMachineSnapshot => "snapshot",
            ObjectKind::Task => "task",
        };
        let r = ObjectRef::new(kind, inv.next(prefix));
        inv.names.insert((kind, name.to_string()), r.clone());
        r
    }

    pub fn set_default(&self, r: &ObjectRef) {
        self.inv().defaults.insert(r.kind, r.clone());
    }

    pub fn add_network(&self, name: &str) -> ObjectRef {
        let r = self.add_object(ObjectKind::Network, name);
        self.inv().networks.insert(
            r.value.clone(),
            NetworkBacking::Standard {
                device_name: name.to_string(),
                network: r.clone(),
            },
        );
        r
    }

    /// Add a compute cluster with its datastores
    pub fn add_cluster(&self, name: &str, datastores: &[&str]) -> (ObjectRef, Vec<ObjectRef>) {
        let cluster = self.add_object(ObjectKind::ClusterComputeResource, name);
        let refs: Vec<ObjectRef> = datastores
            .iter()
            .map(|ds| self.add_object(ObjectKind::Datastore, ds))
            .collect();
        self.inv()
            .cluster_datastores
            .insert(cluster.value.clone(), refs.clone());
        (cluster, refs)
    }

    pub fn add_resource_pool(&self, name: &str, cluster: &ObjectRef) -> ObjectRef {
        let pool = self.add_object(ObjectKind::ResourcePool, name);
        self.inv()
            .pool_owners
            .insert(pool.value.clone(), cluster.clone());
        pool
    }

    /// Register a storage policy and the datastores compatible with it
    pub fn add_storage_policy(&self, name: &str, compatible: &[ObjectRef]) -> String {
        let mut inv = self.inv();
        let id = format!("policy-{}", inv.next("id"));
        inv.policies.insert(
            name.to_string(),
            (id.clone(), compatible.iter().map(|d| d.value.clone()).collect()),
        );
        id
    }

    /// Register a template with the given disk capacities, NIC count and
    /// snapshots; the last snapshot becomes the current one.
    pub fn add_template(
        &self,
        name: &str,
        disks_kib: &[i64],
        nics: usize,
        snapshots: &[&str],
    ) -> ObjectRef {
        let template = self.add_object(ObjectKind::VirtualMachine, name);
        let mut inv = self.inv();
        let mut devices = Vec::new();
        for (i, capacity) in disks_kib.iter().enumerate() {
            devices.push(VirtualDevice::Disk(VirtualDisk {
                key: 2000 + i as i32,
                label: format!("Hard disk {}", i + 1),
                capacity_kib: *capacity,
                backing: DiskBacking {
                    file_name: format!("[datastore1] {}/{}_{}.vmdk", name, name, i),
                    datastore: None,
                    thin_provisioned: true,
                },
            }));
        }
        for i in 0..nics {
            devices.push(VirtualDevice::EthernetCard(VirtualEthernetCard {
                key: 4000 + i as i32,
                card_type: EthernetCardType::Vmxnet3,
                backing: NetworkBacking::Standard {
                    device_name: "VM Network".to_string(),
                    network: ObjectRef::new(ObjectKind::Network, "network-template"),
                },
                mac_address: Some(format!("00:50:56:00:00:{:02x}", i)),
                address_type: MacAddressType::Assigned,
            }));
        }
        let snapshot = if snapshots.is_empty() {
            None
        } else {
            let mut root = Vec::new();
            let mut current = None;
            for s in snapshots.iter() {
                let r = ObjectRef::new(ObjectKind::VirtualMachineSnapshot, inv.next("snapshot"));
                current = Some(r.clone());
                root.push(SnapshotTree {
                    snapshot: r,
                    name: s.to_string(),
                    children: Vec::new(),
                });
            }
            Some(SnapshotInfo { current, root })
        };
        let instance_uuid = format!("5000{:028x}", inv.next_id);
        inv.vms.insert(
            template.value.clone(),
            VmProperties {
                name: name.to_string(),
                instance_uuid,
                bios_uuid: None,
                power_state: PowerState::PoweredOff,
                template: true,
                devices,
                snapshot,
                guest: GuestInfo::default(),
            },
        );
        template
    }

    /// Invalidate every management and tagging session
    pub fn expire_sessions(&self) {
        let mut inv = self.inv();
        inv.generation += 1;
        inv.tagging_generation += 1;
    }

    /// Invalidate only the tagging sessions
    pub fn expire_tagging_sessions(&self) {
        self.inv().tagging_generation += 1;
    }

    pub fn fail_keepalive(&self, fail: bool) {
        self.inv().fail_keepalive = fail;
    }

    /// Reject every REST login while the management login keeps working
    pub fn fail_tagging_login(&self, fail: bool) {
        self.inv().fail_tagging_login = fail;
    }

    pub fn clones(&self) -> Vec<CloneRecord> {
        self.inv().clones.clone()
    }

    pub fn vm(&self, vm: &ObjectRef) -> Option<VmProperties> {
        self.inv().vms.get(&vm.value).cloned()
    }

    pub fn task(&self, task: &ObjectRef) -> Option<TaskInfo> {
        self.inv().tasks.get(&task.value).cloned()
    }

    /// Finish a task successfully; a finished clone makes its VM visible
    pub fn complete_task(&self, task: &ObjectRef) {
        let mut inv = self.inv();
        if let Some((vm, props)) = inv.pending_vms.remove(&task.value) {
            inv.names
                .insert((ObjectKind::VirtualMachine, props.name.clone()), vm.clone());
            inv.vms.insert(vm.value.clone(), props);
            if let Some(info) = inv.tasks.get_mut(&task.value) {
                info.result = Some(vm);
            }
        }
        if let Some(info) = inv.tasks.get_mut(&task.value) {
            info.state = TaskState::Success;
        }
    }

    pub fn fail_task(&self, task: &ObjectRef, message: &str) {
        let mut inv = self.inv();
        inv.pending_vms.remove(&task.value);
        if let Some(info) = inv.tasks.get_mut(&task.value) {
            info.state = TaskState::Error;
            info.error = Some(message.to_string());
        }
    }

    pub fn complete_all_tasks(&self) {
        let pending: Vec<ObjectRef> = self
            .inv()
            .tasks
            .values()
            .filter(|t| !t.state.is_done())
            .map(|t| t.task.clone())
            .collect();
        for task in pending {
            self.complete_task(&task);
        }
    }

    /// Forget a task, as the server does some time after completion
    pub fn forget_task(&self, task: &ObjectRef) {
        self.inv().tasks.remove(&task.value);
    }

    pub fn set_guest_ip(&self, vm: &ObjectRef, ip: &str) {
        if let Some(props) = self.inv().vms.get_mut(&vm.value) {
            props.guest.ip_address = Some(ip.to_string());
            let macs: Vec<String> = props
                .devices
                .iter()
                .filter_map(VirtualDevice::as_ethernet_card)
                .filter_map(|n| n.mac_address.clone())
                .collect();
            props.guest.nics = macs
                .into_iter()
                .map(|mac| GuestNic {
                    mac_address: mac,
                    network: None,
                    ip_addresses: vec![ip.to_string()],
                    connected: true,
                })
                .collect();
        }
    }

    pub fn assign_bios_uuid(&self, vm: &ObjectRef, uuid: &str) {
        if let Some(props) = self.inv().vms.get_mut(&vm.value) {
            props.bios_uuid = Some(uuid.to_string());
        }
    }

    pub fn set_power_state(&self, vm: &ObjectRef, state: PowerState) {
        if let Some(props) = self.inv().vms.get_mut(&vm.value) {
            props.power_state = state;
        }
    }

    fn check_credentials(&self, username: &str, password: &str) -> Result<()> {
        match &self.inv().credentials {
            Some((u, p)) if u != username || p != password => Err(
                CloudError::AuthenticationFailed("Cannot complete login due to an incorrect user name or password".to_string()),
            ),
            _ => Ok(()),
        }
    }
}

/// Management API client handed out by [`FakeVcenter`]
pub struct FakeManagementClient {
    vc: FakeVcenter,
    generation: Mutex<Option<u64>>,
}

impl FakeManagementClient {
    fn logged_in(&self) -> bool {
        let current = self.vc.inv().generation;
        *self.generation.lock().unwrap_or_else(|e| e.into_inner()) == Some(current)
    }

    fn require_session(&self) -> Result<()> {
        if self.logged_in() {
            Ok(())
        } else {
            Err(CloudError::NotAuthenticated)
        }
    }

    fn mark_logged_in(&self) {
        let current = self.vc.inv().generation;
        *self.generation.lock().unwrap_or_else(|e| e.into_inner()) = Some(current);
    }
}

#[async_trait]
impl ManagementApi for FakeManagementClient {
    async fn login(&self, username: &str, password: &str) -> Result<()> {
        self.vc.check_credentials(username, password)?;
        self.vc.counters.logins.fetch_add(1, Ordering::SeqCst);
        self.mark_logged_in();
        Ok(())
    }

    async fn issue_token(&self, certificate: &ClientCertificate) -> Result<SignedToken> {
        Ok(SignedToken {
            assertion: format!("<saml:Assertion>{}</saml:Assertion>", certificate.certificate_pem.len()),
            expires_at: None,
        })
    }

    async fn login_by_token(&self, _token: &SignedToken) -> Result<()> {
        self.vc.counters.token_logins.fetch_add(1, Ordering::SeqCst);
        self.mark_logged_in();
        Ok(())
    }

    async fn logout(&self) -> Result<()> {
        self.vc.counters.logouts.fetch_add(1, Ordering::SeqCst);
        *self.generation.lock().unwrap_or_else(|e| e.into_inner()) = None;
        Ok(())
    }

    async fn user_session(&self) -> Result<Option<UserSession>> {
        if !self.logged_in() {
            return Ok(None);
        }
        Ok(Some(UserSession {
            key: "52a1f0d2".to_string(),
            user_name: "administrator@vsphere.local".to_string(),
            login_time: Utc::now(),
        }))
    }

    async fn current_time(&self) -> Result<DateTime<Utc>> {
        self.vc.counters.keepalive_probes.fetch_add(1, Ordering::SeqCst);
        if self.vc.inv().fail_keepalive {
            return Err(CloudError::NotAuthenticated);
        }
        self.require_session()?;
        Ok(Utc::now())
    }

    async fn find_by_uuid(
        &self,
        _datacenter: Option<&ObjectRef>,
        uuid: &str,
        instance_uuid: bool,
    ) -> Result<Option<ObjectRef>> {
        self.require_session()?;
        let inv = self.vc.inv();
        Ok(inv
            .vms
            .iter()
            .find(|(_, p)| {
                if instance_uuid {
                    p.instance_uuid == uuid
                } else {
                    p.bios_uuid.as_deref() == Some(uuid)
                }
            })
            .map(|(id, _)| ObjectRef::new(ObjectKind::VirtualMachine, id.clone())))
    }

    async fn find_by_name(
        &self,
        _datacenter: Option<&ObjectRef>,
        kind: ObjectKind,
        name: &str,
    ) -> Result<ObjectRef> {
        self.require_session()?;
        self.vc
            .inv()
            .names
            .get(&(kind, name.to_string()))
            .cloned()
            .ok_or_else(|| CloudError::not_found(kind, name))
    }

    async fn find_default(
        &self,
        _datacenter: Option<&ObjectRef>,
        kind: ObjectKind,
    ) -> Result<ObjectRef> {
        self.require_session()?;
        self.vc
            .inv()
            .defaults
            .get(&kind)
            .cloned()
            .ok_or_else(|| CloudError::not_found(kind, "default"))
    }

    async fn vm_properties(&self, vm: &ObjectRef) -> Result<VmProperties> {
        self.require_session()?;
        self.vc
            .vm(vm)
            .ok_or_else(|| CloudError::not_found(ObjectKind::VirtualMachine, vm.value.clone()))
    }

    async fn network_backing(&self, network: &ObjectRef) -> Result<NetworkBacking> {
        self.require_session()?;
        self.vc
            .inv()
            .networks
            .get(&network.value)
            .cloned()
            .ok_or_else(|| CloudError::not_found(ObjectKind::Network, network.value.clone()))
    }

    async fn resource_pool_owner(&self, pool: &ObjectRef) -> Result<ObjectRef> {
        self.require_session()?;
        self.vc
            .inv()
            .pool_owners
            .get(&pool.value)
            .cloned()
            .ok_or_else(|| CloudError::not_found(ObjectKind::ResourcePool, pool.value.clone()))
    }

    async fn list_datastores(&self, cluster: &ObjectRef) -> Result<Vec<ObjectRef>> {
        self.require_session()?;
        Ok(self
            .vc
            .inv()
            .cluster_datastores
            .get(&cluster.value)
            .cloned()
            .unwrap_or_default())
    }

    async fn clone_vm(
        &self,
        template: &ObjectRef,
        folder: &ObjectRef,
        name: &str,
        spec: &CloneSpec,
    ) -> Result<ObjectRef> {
        self.require_session()?;
        self.vc.counters.clones.fetch_add(1, Ordering::SeqCst);
        let mut inv = self.vc.inv();
        let source = inv
            .vms
            .get(&template.value)
            .cloned()
            .ok_or_else(|| CloudError::not_found(ObjectKind::VirtualMachine, template.value.clone()))?;

        let mut devices = source.devices.clone();
        let mut next_key = 4100;
        for change in &spec.config.device_change {
            match change.operation {
                DeviceOperation::Remove => devices.retain(|d| d.key() != change.device.key()),
                DeviceOperation::Edit => {
                    if let Some(d) = devices.iter_mut().find(|d| d.key() == change.device.key()) {
                        *d = change.device.clone();
                    }
                }
                DeviceOperation::Add => {
                    let mut device = change.device.clone();
                    if let VirtualDevice::EthernetCard(nic) = &mut device {
                        nic.key = next_key;
                        if nic.mac_address.is_none() {
                            nic.mac_address = Some(format!("00:50:56:aa:{:02x}:{:02x}", inv.next_id % 256, next_key % 256));
                            nic.address_type = MacAddressType::Assigned;
                        }
                    }
                    next_key += 1;
                    devices.push(device);
                }
            }
        }

        let vm = ObjectRef::new(ObjectKind::VirtualMachine, inv.next("vm"));
        let props = VmProperties {
            name: name.to_string(),
            instance_uuid: spec.config.instance_uuid.clone(),
            bios_uuid: None,
            power_state: if spec.power_on {
                PowerState::PoweredOn
            } else {
                PowerState::PoweredOff
            },
            template: false,
            devices,
            snapshot: None,
            guest: GuestInfo::default(),
        };
        let task = inv.task("VirtualMachine.clone", template, TaskState::Running);
        inv.pending_vms.insert(task.value.clone(), (vm.clone(), props));
        inv.clones.push(CloneRecord {
            template: template.clone(),
            folder: folder.clone(),
            name: name.to_string(),
            spec: spec.clone(),
            task: task.clone(),
            vm,
        });
        Ok(task)
    }

    async fn task_info(&self, task: &ObjectRef) -> Result<Option<TaskInfo>> {
        self.require_session()?;
        Ok(self.vc.task(task))
    }

    async fn power_on(&self, vm: &ObjectRef) -> Result<ObjectRef> {
        self.require_session()?;
        let mut inv = self.vc.inv();
        let props = inv
            .vms
            .get_mut(&vm.value)
            .ok_or_else(|| CloudError::not_found(ObjectKind::VirtualMachine, vm.value.clone()))?;
        props.power_state = PowerState::PoweredOn;
        Ok(inv.task("VirtualMachine.powerOn", vm, TaskState::Success))
    }

    async fn power_off(&self, vm: &ObjectRef) -> Result<ObjectRef> {
        self.require_session()?;
        let mut inv = self.vc.inv();
        let props = inv
            .vms
            .get_mut(&vm.value)
            .ok_or_else(|| CloudError::not_found(ObjectKind::VirtualMachine, vm.value.clone()))?;
        props.power_state = PowerState::PoweredOff;
        Ok(inv.task("VirtualMachine.powerOff", vm, TaskState::Success))
    }

    async fn destroy(&self, vm: &ObjectRef) -> Result<ObjectRef> {
        self.require_session()?;
        let mut inv = self.vc.inv();
        let props = inv
            .vms
            .remove(&vm.value)
            .ok_or_else(|| CloudError::not_found(ObjectKind::VirtualMachine, vm.value.clone()))?;
        inv.names.remove(&(ObjectKind::VirtualMachine, props.name));
        Ok(inv.task("VirtualMachine.destroy", vm, TaskState::Success))
    }

    async fn storage_policy_client(&self) -> Result<Arc<dyn StoragePolicyApi>> {
        self.require_session()?;
        Ok(Arc::new(FakeStoragePolicyClient { vc: self.vc.clone() }))
    }
}

/// Storage policy client handed out by [`FakeManagementClient`]
pub struct FakeStoragePolicyClient {
    vc: FakeVcenter,
}

#[async_trait]
impl StoragePolicyApi for FakeStoragePolicyClient {
    async fn profile_id_by_name(&self, name: &str) -> Result<String> {
        self.vc
            .inv()
            .policies
            .get(name)
            .map(|(id, _)| id.clone())
            .ok_or_else(|| CloudError::not_found("StoragePolicy", name))
    }

    async fn check_compatibility(
        &self,
        profile_id: &str,
        hubs: &[PlacementHub],
    ) -> Result<Vec<PlacementHub>> {
        self.vc
            .counters
            .policy_checks
            .fetch_add(1, Ordering::SeqCst);
        let inv = self.vc.inv();
        let compatible = inv
            .policies
            .values()
            .find(|(id, _)| id == profile_id)
            .map(|(_, ds)| ds.clone())
            .ok_or_else(|| CloudError::not_found("StoragePolicy", profile_id))?;
        Ok(hubs
            .iter()
            .filter(|h| compatible.contains(&h.hub_id))
            .cloned()
            .collect())
    }
}

/// Tagging API client handed out by [`FakeVcenter`]
pub struct FakeTaggingClient {
    vc: FakeVcenter,
    generation: Mutex<Option<u64>>,
}

impl FakeTaggingClient {
    fn check_login_allowed(&self) -> Result<()> {
        if self.vc.inv().fail_tagging_login {
            return Err(CloudError::api("login", "rest", "503: Service Unavailable"));
        }
        Ok(())
    }

    fn mark_logged_in(&self) {
        let current = self.vc.inv().tagging_generation;
        *self.generation.lock().unwrap_or_else(|e| e.into_inner()) = Some(current);
    }
}

#[async_trait]
impl TaggingApi for FakeTaggingClient {
    async fn login(&self, username: &str, password: &str) -> Result<()> {
        self.vc.check_credentials(username, password)?;
        self.check_login_allowed()?;
        self.vc
            .counters
            .tagging_logins
            .fetch_add(1, Ordering::SeqCst);
        self.mark_logged_in();
        Ok(())
    }

    async fn login_by_token(&self, _token: &SignedToken) -> Result<()> {
        self.check_login_allowed()?;
        self.vc
            .counters
            .tagging_logins
            .fetch_add(1, Ordering::SeqCst);
        self.mark_logged_in();
        Ok(())
    }

    async fn session(&self) -> Result<Option<UserSession>> {
        let current = self.vc.inv().tagging_generation;
        let logged_in =
            *self.generation.lock().unwrap_or_else(|e| e.into_inner()) == Some(current);
        Ok(logged_in.then(|| UserSession {
            key: "rest-session".to_string(),
            user_name: "administrator@vsphere.local".to_string(),
            login_time: Utc::now(),
        }))
    }

    async fn logout(&self) -> Result<()> {
        *self.generation.lock().unwrap_or_else(|e| e.into_inner()) = None;
        Ok(())
    }
}

#[async_trait]
impl ManagementConnector for FakeVcenter {
    async fn connect(&self, _endpoint: &Endpoint) -> Result<Arc<dyn ManagementApi>> {
        self.counters.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(FakeManagementClient {
            vc: self.clone(),
            generation: Mutex::new(None),
        }))
    }
}

#[async_trait]
impl TaggingConnector for FakeVcenter {
    async fn connect(&self, _endpoint: &Endpoint) -> Result<Arc<dyn TaggingApi>> {
        Ok(Arc::new(FakeTaggingClient {
            vc: self.clone(),
            generation: Mutex::new(None),
        }))
    }
}
