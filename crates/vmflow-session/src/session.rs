//! Authenticated handle to the management endpoint

use std::sync::Arc;
use tokio::task::AbortHandle;
use tracing::{debug, warn};
use url::Url;
use vmflow_cloud::{CloudError, ManagementApi, ObjectKind, ObjectRef, TaggingApi};

/// One authenticated connection pair (management API + tagging API)
pub struct Session {
    pub(crate) id: u64,
    pub(crate) key: String,
    pub(crate) url: Url,
    pub(crate) datacenter: Option<ObjectRef>,
    pub(crate) management: Arc<dyn ManagementApi>,
    pub(crate) tagging: Arc<dyn TaggingApi>,
    pub(crate) keepalive: Vec<AbortHandle>,
}

impl Session {
    pub fn server(&self) -> &str {
        self.url.host_str().unwrap_or_default()
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Cache key this session is stored under
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn datacenter(&self) -> Option<&ObjectRef> {
        self.datacenter.as_ref()
    }

    pub fn management(&self) -> &Arc<dyn ManagementApi> {
        &self.management
    }

    pub fn tagging(&self) -> &Arc<dyn TaggingApi> {
        &self.tagging
    }

    pub async fn find_by_bios_uuid(&self, uuid: &str) -> vmflow_cloud::Result<Option<ObjectRef>> {
        self.find_by_uuid(uuid, false).await
    }

    pub async fn find_by_instance_uuid(
        &self,
        uuid: &str,
    ) -> vmflow_cloud::Result<Option<ObjectRef>> {
        self.find_by_uuid(uuid, true).await
    }

    async fn find_by_uuid(
        &self,
        uuid: &str,
        instance_uuid: bool,
    ) -> vmflow_cloud::Result<Option<ObjectRef>> {
        if uuid.is_empty() {
            return Err(CloudError::InvalidConfig("uuid is empty".to_string()));
        }
        self.management
            .find_by_uuid(self.datacenter.as_ref(), uuid, instance_uuid)
            .await
    }

    /// Resolve an inventory object by name within the bound datacenter
    pub async fn find_by_name(
        &self,
        kind: ObjectKind,
        name: &str,
    ) -> vmflow_cloud::Result<ObjectRef> {
        self.management
            .find_by_name(self.datacenter.as_ref(), kind, name)
            .await
    }

    /// The default object of a kind within the bound datacenter
    pub async fn find_default(&self, kind: ObjectKind) -> vmflow_cloud::Result<ObjectRef> {
        self.management
            .find_default(self.datacenter.as_ref(), kind)
            .await
    }

    /// Both the management session and the REST session are still usable
    pub async fn is_active(&self) -> bool {
        match self.management.user_session().await {
            Ok(Some(_)) => {}
            Ok(None) => {
                debug!(server = %self.server(), "management session is gone");
                return false;
            }
            Err(e) => {
                debug!(server = %self.server(), error = %e, "management session check failed");
                return false;
            }
        }
        match self.tagging.session().await {
            Ok(Some(_)) => true,
            Ok(None) => {
                debug!(server = %self.server(), "REST session is gone");
                false
            }
            Err(e) => {
                debug!(server = %self.server(), error = %e, "REST session check failed");
                false
            }
        }
    }

    /// Log out of both APIs; failures are logged, never returned
    pub async fn logout(&self) {
        if let Err(e) = self.management.logout().await {
            warn!(server = %self.server(), error = %e, "failed to log out management session");
        }
        if let Err(e) = self.tagging.logout().await {
            warn!(server = %self.server(), error = %e, "failed to log out REST session");
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        for handle in &self.keepalive {
            handle.abort();
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("url", &self.url.as_str())
            .field("datacenter", &self.datacenter)
            .finish_non_exhaustive()
    }
}
