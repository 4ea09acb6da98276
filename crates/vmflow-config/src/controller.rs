//! Controller configuration file model

use crate::error::{ConfigError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Keepalive interval used when keepalive is enabled without one
pub const DEFAULT_KEEPALIVE_INTERVAL_SECS: u64 = 300;

/// Deployment mode of the machine controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Clone and power VMs directly on the hypervisor
    #[default]
    Vim,
    /// Declare VM objects for a managed VM service
    Supervisor,
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::Vim => write!(f, "vim"),
            Mode::Supervisor => write!(f, "supervisor"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Keepalive {
    pub enabled: bool,
    pub interval_secs: u64,
}

impl Default for Keepalive {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_secs: DEFAULT_KEEPALIVE_INTERVAL_SECS,
        }
    }
}

/// Inventory defaults for clones that name no placement
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Defaults {
    pub folder: Option<String>,
    pub resource_pool: Option<String>,
    pub datastore: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Placement {
    /// Gate worker VMs on a placement group and compute zone affinity
    pub auto_placement: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    pub server: String,
    pub datacenter: String,
    pub username: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub password: String,
    pub certificate_file: Option<PathBuf>,
    pub private_key_file: Option<PathBuf>,
    pub thumbprint: Option<String>,
    pub keepalive: Keepalive,
    pub defaults: Defaults,
    pub placement: Placement,
    pub mode: Mode,
}

impl ControllerConfig {
    pub fn from_yaml(content: &str, path: &Path) -> Result<Self> {
        serde_yaml::from_str(content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content, path)
    }

    /// Override credentials from `VMFLOW_USERNAME` / `VMFLOW_PASSWORD`
    pub fn apply_env(&mut self) {
        if let Ok(username) = std::env::var("VMFLOW_USERNAME") {
            self.username = username;
        }
        if let Ok(password) = std::env::var("VMFLOW_PASSWORD") {
            self.password = password;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.server.trim().is_empty() {
            return Err(ConfigError::Invalid("server must not be empty".to_string()));
        }
        if self.certificate_file.is_some() != self.private_key_file.is_some() {
            return Err(ConfigError::Invalid(
                "certificate_file and private_key_file must be set together".to_string(),
            ));
        }
        if self.keepalive.enabled && self.keepalive.interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "keepalive.interval_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Keepalive interval, or `None` when keepalive is off
    pub fn keepalive_interval(&self) -> Option<std::time::Duration> {
        self.keepalive
            .enabled
            .then(|| std::time::Duration::from_secs(self.keepalive.interval_secs))
    }

    pub fn uses_certificate(&self) -> bool {
        self.certificate_file.is_some()
    }
}
