//! Datacenter registry
//!
//! Maps a datacenter name to its immutable backend configuration. The registry
//! is built once from the datacenters file and shared read-only afterwards.

use crate::error::{ConfigError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::IpAddr;
use std::path::Path;

/// Cloud backend a datacenter is served by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    Openstack,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::Openstack => write!(f, "openstack"),
        }
    }
}

/// One datacenter entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatacenterMeta {
    /// Human readable location (e.g. "Hamburg")
    #[serde(default)]
    pub location: String,

    /// ISO country code
    #[serde(default)]
    pub country: String,

    /// Backend specific configuration
    #[serde(default)]
    pub spec: DatacenterSpec,
}

impl DatacenterMeta {
    pub fn backend(&self) -> Option<BackendKind> {
        self.spec.backend()
    }
}

/// Backend configuration. At most one backend section is expected to be set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatacenterSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub openstack: Option<OpenstackDatacenter>,
}

impl DatacenterSpec {
    pub fn backend(&self) -> Option<BackendKind> {
        self.openstack.as_ref().map(|_| BackendKind::Openstack)
    }

    /// DNS servers handed to newly created subnets
    pub fn dns_servers(&self) -> &[String] {
        self.openstack
            .as_ref()
            .map(|os| os.dns_servers.as_slice())
            .unwrap_or_default()
    }
}

/// OpenStack datacenter settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenstackDatacenter {
    /// Keystone identity endpoint (e.g. https://keystone.example.com:5000/v3)
    pub auth_url: String,

    /// Region used for the service catalog lookup
    pub region: String,

    #[serde(default)]
    pub dns_servers: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct DatacentersFile {
    #[serde(default)]
    datacenters: BTreeMap<String, DatacenterMeta>,
}

/// Read-only lookup from datacenter name to [`DatacenterMeta`]
#[derive(Debug, Clone, Default)]
pub struct DatacenterRegistry {
    datacenters: BTreeMap<String, DatacenterMeta>,
}

impl DatacenterRegistry {
    /// Build a registry, validating every entry
    pub fn new(datacenters: BTreeMap<String, DatacenterMeta>) -> Result<Self> {
        for (name, meta) in &datacenters {
            validate_datacenter(name, meta)?;
        }
        Ok(Self { datacenters })
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let file: DatacentersFile = serde_yaml::from_str(content)?;
        Self::new(file.datacenters)
    }

    /// Load the registry from a datacenters YAML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let file: DatacentersFile =
            serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        let registry = Self::new(file.datacenters)?;
        tracing::debug!(
            path = %path.display(),
            datacenters = registry.len(),
            "Loaded datacenter registry"
        );
        Ok(registry)
    }

    pub fn get(&self, name: &str) -> Option<&DatacenterMeta> {
        self.datacenters.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.datacenters.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &DatacenterMeta)> {
        self.datacenters.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.datacenters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.datacenters.is_empty()
    }
}

fn validate_datacenter(name: &str, meta: &DatacenterMeta) -> Result<()> {
    let invalid = |message: String| ConfigError::InvalidDatacenter {
        name: name.to_string(),
        message,
    };

    if name.trim().is_empty() {
        return Err(invalid("datacenter name must not be empty".to_string()));
    }

    if let Some(os) = &meta.spec.openstack {
        if !(os.auth_url.starts_with("https://") || os.auth_url.starts_with("http://")) {
            return Err(invalid(format!(
                "auth_url {:?} must be an http(s) URL",
                os.auth_url
            )));
        }
        if os.region.trim().is_empty() {
            return Err(invalid("region must not be empty".to_string()));
        }
        for server in &os.dns_servers {
            if server.parse::<IpAddr>().is_err() {
                return Err(invalid(format!("dns server {:?} is not an IP address", server)));
            }
        }
    }

    Ok(())
}
