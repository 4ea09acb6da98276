//! Template and snapshot resolution

use crate::error::{Result, remote};
use crate::spec::{CloneMode, VirtualMachineSpec};
use tracing::{debug, info};
use vmflow_cloud::{ObjectKind, ObjectRef, VmProperties};
use vmflow_session::Session;

/// Locate a template by instance UUID, falling back to name lookup
///
/// A UUID-shaped identifier that matches nothing falls through to the name
/// lookup instead of failing.
pub async fn find_template(session: &Session, template: &str) -> Result<ObjectRef> {
    if uuid::Uuid::parse_str(template).is_ok() {
        let found = session
            .find_by_instance_uuid(template)
            .await
            .map_err(remote("find template by instance uuid", template))?;
        if let Some(r) = found {
            return Ok(r);
        }
        debug!(template = %template, "no template with this instance uuid, trying name lookup");
    }
    session
        .find_by_name(ObjectKind::VirtualMachine, template)
        .await
        .map_err(remote("find template", template))
}

/// Snapshot to link the clone to, if any
///
/// Only consulted when the clone mode is unset or linked. A declared snapshot
/// name that cannot be found degrades to no snapshot, which yields a full
/// clone; an undeclared name uses the template's current snapshot.
pub fn resolve_snapshot(vm: &VirtualMachineSpec, template: &VmProperties) -> Option<ObjectRef> {
    if vm.clone_mode == Some(CloneMode::Full) {
        return None;
    }
    info!(machine = %vm.name, "linked clone requested");

    match vm.snapshot.as_deref().filter(|s| !s.is_empty()) {
        None => {
            debug!(machine = %vm.name, "searching for current snapshot");
            template.snapshot.as_ref().and_then(|s| s.current.clone())
        }
        Some(name) => {
            debug!(machine = %vm.name, snapshot = %name, "searching for snapshot by name");
            let found = template
                .snapshot
                .as_ref()
                .ok_or_else(|| vmflow_cloud::CloudError::not_found(ObjectKind::VirtualMachineSnapshot, name))
                .and_then(|s| s.find_by_name(name));
            match found {
                Ok(r) => Some(r),
                Err(e) => {
                    info!(machine = %vm.name, snapshot = %name, error = %e, "failed to find snapshot");
                    None
                }
            }
        }
    }
}
