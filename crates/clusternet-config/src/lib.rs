//! clusternet configuration
//!
//! Datacenter registry loading and discovery of the datacenters file.

pub mod datacenter;
pub mod error;

pub use datacenter::{
    BackendKind, DatacenterMeta, DatacenterRegistry, DatacenterSpec, OpenstackDatacenter,
};
pub use error::*;

use std::path::PathBuf;

/// Environment variable pointing directly at a datacenters file
pub const DATACENTERS_PATH_ENV: &str = "CLUSTERNET_DATACENTERS";

const CANDIDATES: [&str; 2] = ["datacenters.yaml", "datacenters.yml"];

/// Locate the datacenters file
///
/// Search order:
/// 1. `CLUSTERNET_DATACENTERS` environment variable
/// 2. current directory: datacenters.yaml, datacenters.yml
/// 3. ./.clusternet/ with the same names
/// 4. ~/.config/clusternet/datacenters.yaml
pub fn find_datacenters_file() -> Result<PathBuf> {
    if let Ok(config_path) = std::env::var(DATACENTERS_PATH_ENV) {
        let path = PathBuf::from(&config_path);
        if path.exists() {
            return Ok(path);
        }
        tracing::warn!(
            env_path = %config_path,
            "{} is set but file does not exist",
            DATACENTERS_PATH_ENV
        );
    }

    let current_dir = std::env::current_dir()?;

    for filename in &CANDIDATES {
        let path = current_dir.join(filename);
        if path.exists() {
            return Ok(path);
        }
    }

    let local_dir = current_dir.join(".clusternet");
    if local_dir.is_dir() {
        for filename in &CANDIDATES {
            let path = local_dir.join(filename);
            if path.exists() {
                return Ok(path);
            }
        }
    }

    if let Some(config_dir) = dirs::config_dir() {
        let global_config = config_dir.join("clusternet").join(CANDIDATES[0]);
        if global_config.exists() {
            return Ok(global_config);
        }
    }

    Err(ConfigError::DatacentersFileNotFound)
}

/// Find and load the datacenter registry
pub fn load_registry() -> Result<DatacenterRegistry> {
    let path = find_datacenters_file()?;
    DatacenterRegistry::load(path)
}
