//! Per-cluster cloud spec
//!
//! [`CloudSpec`] is both the declarative input (externally supplied network,
//! security groups, floating IP pool) and the ledger of what the provider
//! created. Fields are private so that the ownership invariants hold by
//! construction:
//!
//! - `network_created` implies network, subnet and router are all recorded
//! - `security_group_created` implies at least one security group is recorded

use crate::error::{CloudError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Backend specific credentials
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum Credentials {
    Openstack(OpenstackCredentials),
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credentials::Openstack(os) => f
                .debug_struct("Openstack")
                .field("username", &os.username)
                .field("password", &"<redacted>")
                .field("domain", &os.domain)
                .field("tenant", &os.tenant)
                .finish(),
        }
    }
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenstackCredentials {
    pub username: String,
    pub password: String,
    pub domain: String,
    pub tenant: String,
}

impl OpenstackCredentials {
    pub fn new(
        username: impl Into<String>,
        password: impl Into<String>,
        domain: impl Into<String>,
        tenant: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            domain: domain.into(),
            tenant: tenant.into(),
        }
    }
}

/// Identifiers of a network the provider created as one unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagedNetwork {
    pub network: String,
    pub subnet_id: String,
    pub router_id: String,
}

/// Per-cluster infrastructure descriptor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "CloudSpecRecord", into = "CloudSpecRecord")]
pub struct CloudSpec {
    datacenter_name: String,
    credentials: Credentials,
    network: Option<String>,
    subnet_id: Option<String>,
    router_id: Option<String>,
    security_groups: BTreeSet<String>,
    floating_ip_pool: Option<String>,
    network_created: bool,
    security_group_created: bool,
}

fn non_empty(value: impl Into<String>) -> Option<String> {
    let value = value.into();
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

impl CloudSpec {
    /// A spec with nothing realized yet
    pub fn new(datacenter_name: impl Into<String>, credentials: Credentials) -> Self {
        Self {
            datacenter_name: datacenter_name.into(),
            credentials,
            network: None,
            subnet_id: None,
            router_id: None,
            security_groups: BTreeSet::new(),
            floating_ip_pool: None,
            network_created: false,
            security_group_created: false,
        }
    }

    /// Use an existing network; it is never deleted by cleanup
    pub fn with_network(mut self, network: impl Into<String>) -> Self {
        self.network = non_empty(network);
        self
    }

    /// Use existing security groups; they are never deleted by cleanup
    pub fn with_security_groups<I, S>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.security_groups = groups.into_iter().filter_map(non_empty).collect();
        self
    }

    pub fn with_floating_ip_pool(mut self, pool: impl Into<String>) -> Self {
        self.floating_ip_pool = non_empty(pool);
        self
    }

    pub fn datacenter_name(&self) -> &str {
        &self.datacenter_name
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn network(&self) -> Option<&str> {
        self.network.as_deref()
    }

    pub fn subnet_id(&self) -> Option<&str> {
        self.subnet_id.as_deref()
    }

    pub fn router_id(&self) -> Option<&str> {
        self.router_id.as_deref()
    }

    pub fn security_groups(&self) -> &BTreeSet<String> {
        &self.security_groups
    }

    pub fn floating_ip_pool(&self) -> Option<&str> {
        self.floating_ip_pool.as_deref()
    }

    pub fn network_created(&self) -> bool {
        self.network_created
    }

    pub fn security_group_created(&self) -> bool {
        self.security_group_created
    }

    /// Whether every field needed by a running cluster is populated
    pub fn is_initialized(&self) -> bool {
        !self.security_groups.is_empty()
            && self.network.is_some()
            && self.floating_ip_pool.is_some()
    }

    /// Whether cleanup has anything to delete
    pub fn owns_resources(&self) -> bool {
        self.network_created || self.security_group_created
    }

    pub(crate) fn record_floating_ip_pool(&mut self, pool: impl Into<String>) {
        self.floating_ip_pool = non_empty(pool);
    }

    pub(crate) fn record_created_security_group(&mut self, name: impl Into<String>) {
        if let Some(name) = non_empty(name) {
            self.security_groups.insert(name);
            self.security_group_created = true;
        }
    }

    pub(crate) fn record_created_network(&mut self, managed: ManagedNetwork) -> Result<()> {
        let (Some(network), Some(subnet_id), Some(router_id)) = (
            non_empty(managed.network),
            non_empty(managed.subnet_id),
            non_empty(managed.router_id),
        ) else {
            return Err(CloudError::InvalidSpec(
                "a created network needs network, subnet and router identifiers".to_string(),
            ));
        };

        self.network = Some(network);
        self.subnet_id = Some(subnet_id);
        self.router_id = Some(router_id);
        self.network_created = true;
        Ok(())
    }

    pub(crate) fn forget_security_group(&mut self, name: &str) {
        self.security_groups.remove(name);
        if self.security_groups.is_empty() {
            self.security_group_created = false;
        }
    }

    pub(crate) fn forget_network(&mut self) {
        self.network = None;
        self.subnet_id = None;
        self.router_id = None;
        self.network_created = false;
    }
}

/// Serialized form of [`CloudSpec`]; checked on the way in
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CloudSpecRecord {
    datacenter_name: String,
    credentials: Credentials,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    network: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    subnet_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    router_id: Option<String>,
    #[serde(default)]
    security_groups: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    floating_ip_pool: Option<String>,
    #[serde(default)]
    network_created: bool,
    #[serde(default)]
    security_group_created: bool,
}

impl TryFrom<CloudSpecRecord> for CloudSpec {
    type Error = CloudError;

    fn try_from(record: CloudSpecRecord) -> Result<Self> {
        if record.datacenter_name.trim().is_empty() {
            return Err(CloudError::InvalidSpec(
                "datacenter_name must not be empty".to_string(),
            ));
        }

        let spec = CloudSpec {
            datacenter_name: record.datacenter_name,
            credentials: record.credentials,
            network: record.network.and_then(non_empty),
            subnet_id: record.subnet_id.and_then(non_empty),
            router_id: record.router_id.and_then(non_empty),
            security_groups: record
                .security_groups
                .into_iter()
                .filter_map(non_empty)
                .collect(),
            floating_ip_pool: record.floating_ip_pool.and_then(non_empty),
            network_created: record.network_created,
            security_group_created: record.security_group_created,
        };

        if spec.network_created
            && (spec.network.is_none() || spec.subnet_id.is_none() || spec.router_id.is_none())
        {
            return Err(CloudError::InvalidSpec(
                "network_created requires network, subnet_id and router_id".to_string(),
            ));
        }

        if spec.security_group_created && spec.security_groups.is_empty() {
            return Err(CloudError::InvalidSpec(
                "security_group_created requires at least one security group".to_string(),
            ));
        }

        Ok(spec)
    }
}

impl From<CloudSpec> for CloudSpecRecord {
    fn from(spec: CloudSpec) -> Self {
        Self {
            datacenter_name: spec.datacenter_name,
            credentials: spec.credentials,
            network: spec.network,
            subnet_id: spec.subnet_id,
            router_id: spec.router_id,
            security_groups: spec.security_groups,
            floating_ip_pool: spec.floating_ip_pool,
            network_created: spec.network_created,
            security_group_created: spec.security_group_created,
        }
    }
}
