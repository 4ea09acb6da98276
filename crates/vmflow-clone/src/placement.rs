//! Folder, resource pool and datastore selection

use crate::error::{CloneError, Result, remote};
use crate::spec::VirtualMachineSpec;
use tracing::debug;
use vmflow_cloud::{ObjectKind, ObjectRef, PlacementHub};
use vmflow_session::Session;

async fn named_or_default(
    session: &Session,
    kind: ObjectKind,
    name: Option<&str>,
) -> Result<ObjectRef> {
    match name.filter(|n| !n.is_empty()) {
        Some(name) => session
            .find_by_name(kind, name)
            .await
            .map_err(remote("find", format!("{} {}", kind, name))),
        None => session
            .find_default(kind)
            .await
            .map_err(remote("find default", kind)),
    }
}

pub async fn resolve_folder(session: &Session, vm: &VirtualMachineSpec) -> Result<ObjectRef> {
    named_or_default(session, ObjectKind::Folder, vm.folder.as_deref()).await
}

pub async fn resolve_resource_pool(session: &Session, vm: &VirtualMachineSpec) -> Result<ObjectRef> {
    named_or_default(session, ObjectKind::ResourcePool, vm.resource_pool.as_deref()).await
}

/// Pick the datastore for the clone
///
/// With a storage policy, candidates are the declared datastore or every
/// datastore of the pool's owning cluster, filtered by policy compatibility;
/// without a declared datastore one compatible candidate is picked at random.
/// With neither a policy nor a datastore the default datastore is used.
/// `pick` returns an index below the number of compatible candidates.
pub async fn resolve_datastore(
    session: &Session,
    vm: &VirtualMachineSpec,
    pool: &ObjectRef,
    pick: impl FnOnce(usize) -> usize + Send,
) -> Result<(ObjectRef, Option<String>)> {
    let mut datastore = match vm.datastore.as_deref().filter(|d| !d.is_empty()) {
        Some(name) => Some(
            session
                .find_by_name(ObjectKind::Datastore, name)
                .await
                .map_err(remote("find datastore", name))?,
        ),
        None => None,
    };

    let mut storage_profile_id = None;
    if let Some(policy) = vm.storage_policy_name.as_deref().filter(|p| !p.is_empty()) {
        let client = session
            .management()
            .storage_policy_client()
            .await
            .map_err(remote("create storage policy client for", policy))?;
        let profile_id = client
            .profile_id_by_name(policy)
            .await
            .map_err(remote("get storage profile id for", policy))?;

        let hubs: Vec<PlacementHub> = match &datastore {
            Some(ds) => vec![PlacementHub::from(ds)],
            None => {
                let cluster = session
                    .management()
                    .resource_pool_owner(pool)
                    .await
                    .map_err(remote("get owning cluster of resource pool", pool))?;
                session
                    .management()
                    .list_datastores(&cluster)
                    .await
                    .map_err(remote("list datastores of cluster", &cluster))?
                    .iter()
                    .map(PlacementHub::from)
                    .collect()
            }
        };

        let compatible = client
            .check_compatibility(&profile_id, &hubs)
            .await
            .map_err(remote("check storage policy requirements for", policy))?;
        if compatible.is_empty() {
            return Err(CloneError::NoCompatibleDatastore {
                policy: policy.to_string(),
            });
        }
        debug!(
            machine = %vm.name,
            policy = %policy,
            candidates = hubs.len(),
            compatible = compatible.len(),
            "checked storage policy compatibility"
        );

        if datastore.is_none() {
            let index = pick(compatible.len()).min(compatible.len() - 1);
            datastore = Some(compatible[index].to_datastore_ref());
        }
        storage_profile_id = Some(profile_id);
    }

    let datastore = match datastore {
        Some(ds) => ds,
        None => session
            .find_default(ObjectKind::Datastore)
            .await
            .map_err(remote("find default", ObjectKind::Datastore))?,
    };
    Ok((datastore, storage_profile_id))
}
