pub mod controller;
pub mod error;

pub use controller::{ControllerConfig, Defaults, Keepalive, Mode, Placement};
pub use error::*;

use std::path::PathBuf;

const APP_DIR: &str = "vmflow";
const CANDIDATES: [&str; 2] = ["vmflow.local.yaml", "vmflow.yaml"];

/// Directory of the user-wide vmflow config (`~/.config/vmflow`)
pub fn config_dir() -> Result<PathBuf> {
    Ok(dirs::config_dir()
        .ok_or(ConfigError::ConfigDirNotFound)?
        .join(APP_DIR))
}

/// Locate the controller config file
///
/// Search order:
/// 1. `VMFLOW_CONFIG_PATH` (direct path)
/// 2. current directory: vmflow.local.yaml, vmflow.yaml
/// 3. `./.vmflow/` with the same names
/// 4. `~/.config/vmflow/vmflow.yaml`
pub fn find_config_file() -> Result<PathBuf> {
    if let Ok(config_path) = std::env::var("VMFLOW_CONFIG_PATH") {
        let path = PathBuf::from(config_path);
        if path.exists() {
            return Ok(path);
        }
    }

    let current_dir = std::env::current_dir()?;
    for filename in &CANDIDATES {
        let path = current_dir.join(filename);
        if path.exists() {
            return Ok(path);
        }
    }

    let local_dir = current_dir.join(".vmflow");
    if local_dir.is_dir() {
        for filename in &CANDIDATES {
            let path = local_dir.join(filename);
            if path.exists() {
                return Ok(path);
            }
        }
    }

    if let Ok(dir) = config_dir() {
        let global_config = dir.join("vmflow.yaml");
        if global_config.exists() {
            return Ok(global_config);
        }
    }

    Err(ConfigError::ConfigFileNotFound)
}

/// Find, parse and validate the controller config, applying env overrides
pub fn load() -> Result<ControllerConfig> {
    let path = find_config_file()?;
    let mut config = ControllerConfig::from_file(&path)?;
    config.apply_env();
    config.validate()?;
    Ok(config)
}
