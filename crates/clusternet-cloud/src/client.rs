//! Cloud network API capability surface
//!
//! One [`CloudClient`] implementation exists per backend. The provisioning
//! algorithm in [`crate::provider`] is written against this trait only.

use crate::error::Result;
use crate::naming;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkRef {
    pub id: String,
    pub name: String,
    /// Internet facing network usable as floating IP pool
    pub external: bool,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubnetRef {
    pub id: String,
    pub name: String,
    pub network_id: String,
    pub cidr: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouterRef {
    pub id: String,
    pub name: String,
    /// Network ID of the external gateway, if one is set
    pub gateway_network_id: Option<String>,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityGroupRef {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// Parameters for a new subnet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubnetSpec {
    pub name: String,
    pub description: String,
    pub network_id: String,
    pub cidr: String,
    pub gateway_ip: Option<String>,
    pub ip_version: u8,
    pub dns_nameservers: Vec<String>,
}

pub const DEFAULT_SUBNET_CIDR: &str = "192.168.1.0/24";
pub const DEFAULT_SUBNET_GATEWAY: &str = "192.168.1.1";

impl SubnetSpec {
    /// The subnet layout used for every cluster network
    pub fn for_cluster(cluster_name: &str, network_id: &str, dns_nameservers: &[String]) -> Self {
        Self {
            name: naming::resource_name(cluster_name),
            description: naming::ownership_marker(cluster_name),
            network_id: network_id.to_string(),
            cidr: DEFAULT_SUBNET_CIDR.to_string(),
            gateway_ip: Some(DEFAULT_SUBNET_GATEWAY.to_string()),
            ip_version: 4,
            dns_nameservers: dns_nameservers.to_vec(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Ingress,
    Egress,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EtherType {
    IPv4,
    IPv6,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Udp,
    Icmp,
}

/// Where traffic matched by a rule may come from (or go to)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RuleRemote {
    Any,
    /// Members of the group the rule belongs to
    SameGroup,
    Cidr(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityGroupRule {
    pub direction: Direction,
    pub ether_type: EtherType,
    pub protocol: Option<Protocol>,
    pub port_range: Option<(u16, u16)>,
    pub remote: RuleRemote,
}

impl SecurityGroupRule {
    fn any(direction: Direction, ether_type: EtherType, remote: RuleRemote) -> Self {
        Self {
            direction,
            ether_type,
            protocol: None,
            port_range: None,
            remote,
        }
    }

    fn tcp(min: u16, max: u16) -> Self {
        Self {
            direction: Direction::Ingress,
            ether_type: EtherType::IPv4,
            protocol: Some(Protocol::Tcp),
            port_range: Some((min, max)),
            remote: RuleRemote::Any,
        }
    }
}

/// A cluster's security group and the rules it must carry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityGroupSpec {
    pub name: String,
    pub description: String,
    pub rules: Vec<SecurityGroupRule>,
}

pub const NODE_PORT_RANGE: (u16, u16) = (30000, 32767);

impl SecurityGroupSpec {
    /// Group allowing intra-cluster traffic, SSH, NodePorts and ICMP
    pub fn for_cluster(cluster_name: &str) -> Self {
        let rules = vec![
            SecurityGroupRule::any(Direction::Egress, EtherType::IPv4, RuleRemote::Any),
            SecurityGroupRule::any(Direction::Egress, EtherType::IPv6, RuleRemote::Any),
            SecurityGroupRule::any(Direction::Ingress, EtherType::IPv4, RuleRemote::SameGroup),
            SecurityGroupRule::any(Direction::Ingress, EtherType::IPv6, RuleRemote::SameGroup),
            SecurityGroupRule::tcp(22, 22),
            SecurityGroupRule::tcp(NODE_PORT_RANGE.0, NODE_PORT_RANGE.1),
            SecurityGroupRule {
                protocol: Some(Protocol::Icmp),
                port_range: None,
                ..SecurityGroupRule::tcp(0, 0)
            },
        ];

        Self {
            name: naming::resource_name(cluster_name),
            description: naming::ownership_marker(cluster_name),
            rules,
        }
    }
}

/// Network operations a backend must provide
///
/// Lookups that return `Result<Option<_>>` report absence as `Ok(None)`;
/// lookups returning a bare value fail with `ResourceNotFound`. Deletions of
/// resources that no longer exist fail with `ResourceNotFound`, which the
/// cleanup path treats as success.
///
/// Created resources carry the given description and every lookup reports
/// it back, so the provider can tell its own resources from foreign ones.
#[async_trait]
pub trait CloudClient: Send + Sync {
    /// Resolve a network by name. With `external_only`, a network that is not
    /// internet facing is rejected with `NotExternal`.
    async fn find_network_by_name(&self, name: &str, external_only: bool) -> Result<NetworkRef>;

    /// The single external network. Zero or several fail with
    /// `AmbiguousResource`.
    async fn find_external_network(&self) -> Result<NetworkRef>;

    async fn find_security_group(&self, name: &str) -> Result<Option<SecurityGroupRef>>;

    async fn find_subnet(&self, network_id: &str, name: &str) -> Result<Option<SubnetRef>>;

    async fn find_router(&self, name: &str) -> Result<Option<RouterRef>>;

    async fn router_has_subnet(&self, router_id: &str, subnet_id: &str) -> Result<bool>;

    async fn create_network(&self, name: &str, description: &str) -> Result<NetworkRef>;

    async fn create_subnet(&self, spec: &SubnetSpec) -> Result<SubnetRef>;

    async fn create_router(&self, name: &str, description: &str) -> Result<RouterRef>;

    async fn set_router_gateway(&self, router_id: &str, external_network_id: &str) -> Result<()>;

    /// Create an empty group; rules are added with `add_security_group_rules`
    async fn create_security_group(&self, name: &str, description: &str)
    -> Result<SecurityGroupRef>;

    /// Add the rules the group does not carry yet, leaving existing ones alone
    async fn add_security_group_rules(
        &self,
        group_id: &str,
        rules: &[SecurityGroupRule],
    ) -> Result<()>;

    async fn attach_subnet_to_router(&self, subnet_id: &str, router_id: &str) -> Result<()>;

    async fn detach_subnet_from_router(&self, subnet_id: &str, router_id: &str) -> Result<()>;

    /// Delete a network by name; its subnets go with it
    async fn delete_network(&self, name: &str) -> Result<()>;

    async fn delete_router(&self, router_id: &str) -> Result<()>;

    async fn delete_security_group(&self, name: &str) -> Result<()>;
}
