//! Credential check against a management endpoint

use crate::rest::RestConnector;
use std::sync::Arc;
use vmflow_cloud::{AuthStatus, Endpoint, TaggingConnector};

/// vSphere endpoint plus the credentials to check
pub struct VsphereProvider {
    connector: Arc<dyn TaggingConnector>,
    endpoint: Endpoint,
    username: String,
    password: String,
}

impl VsphereProvider {
    pub fn new(endpoint: Endpoint, username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            connector: Arc::new(RestConnector),
            endpoint,
            username: username.into(),
            password: password.into(),
        }
    }

    /// Use another connector, e.g. the in-memory hypervisor in tests
    pub fn with_connector(mut self, connector: Arc<dyn TaggingConnector>) -> Self {
        self.connector = connector;
        self
    }

    pub fn name(&self) -> &str {
        "vsphere"
    }

    /// Log in, read the session back and log out again
    ///
    /// Failures are reported in the returned status, never as an error.
    pub async fn check_auth(&self) -> AuthStatus {
        match self.login_round_trip().await {
            Ok(Some(user)) => AuthStatus::ok(user),
            Ok(None) => AuthStatus::failed("session was not established"),
            Err(e) => AuthStatus::failed(e.to_string()),
        }
    }

    async fn login_round_trip(&self) -> vmflow_cloud::Result<Option<String>> {
        let client = self.connector.connect(&self.endpoint).await?;
        client.login(&self.username, &self.password).await?;
        let session = client.session().await;
        if let Err(e) = client.logout().await {
            tracing::warn!(server = %self.endpoint.host(), error = %e, "logout failed");
        }
        Ok(session?.map(|s| s.user_name))
    }
}

impl std::fmt::Debug for VsphereProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VsphereProvider")
            .field("endpoint", &self.endpoint)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}
