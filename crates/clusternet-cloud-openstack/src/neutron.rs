//! Neutron v2.0 networking client

use crate::error::{OpenstackError, Result, check_status};
use crate::keystone::Session;
use async_trait::async_trait;
use clusternet_cloud::{
    CloudClient, CloudError, Direction, EtherType, NetworkRef, Protocol, ResourceKind, RouterRef,
    RuleRemote, SecurityGroupRef, SecurityGroupRule, SubnetRef, SubnetSpec,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;

const AUTH_TOKEN_HEADER: &str = "X-Auth-Token";

/// Neutron REST client bound to one authenticated session
pub struct NeutronClient {
    http: reqwest::Client,
    session: Session,
}

#[derive(Debug, Deserialize)]
struct NetworkWire {
    id: String,
    name: String,
    #[serde(rename = "router:external", default)]
    external: bool,
    #[serde(default)]
    description: Option<String>,
}

impl From<NetworkWire> for NetworkRef {
    fn from(n: NetworkWire) -> Self {
        NetworkRef {
            id: n.id,
            name: n.name,
            external: n.external,
            description: n.description.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SubnetWire {
    id: String,
    name: String,
    network_id: String,
    cidr: String,
    #[serde(default)]
    description: Option<String>,
}

impl From<SubnetWire> for SubnetRef {
    fn from(s: SubnetWire) -> Self {
        SubnetRef {
            id: s.id,
            name: s.name,
            network_id: s.network_id,
            cidr: s.cidr,
            description: s.description.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct GatewayInfo {
    network_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RouterWire {
    id: String,
    name: String,
    #[serde(default)]
    external_gateway_info: Option<GatewayInfo>,
    #[serde(default)]
    description: Option<String>,
}

impl From<RouterWire> for RouterRef {
    fn from(r: RouterWire) -> Self {
        RouterRef {
            id: r.id,
            name: r.name,
            gateway_network_id: r.external_gateway_info.and_then(|g| g.network_id),
            description: r.description.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SecurityGroupWire {
    id: String,
    name: String,
    #[serde(default)]
    description: Option<String>,
}

impl From<SecurityGroupWire> for SecurityGroupRef {
    fn from(g: SecurityGroupWire) -> Self {
        SecurityGroupRef {
            id: g.id,
            name: g.name,
            description: g.description.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct FixedIp {
    subnet_id: String,
}

#[derive(Debug, Deserialize)]
struct PortWire {
    #[serde(default)]
    fixed_ips: Vec<FixedIp>,
}

#[derive(Debug, Deserialize)]
struct Networks {
    networks: Vec<NetworkWire>,
}

#[derive(Debug, Deserialize)]
struct NetworkEnvelope {
    network: NetworkWire,
}

#[derive(Debug, Deserialize)]
struct Subnets {
    subnets: Vec<SubnetWire>,
}

#[derive(Debug, Deserialize)]
struct SubnetEnvelope {
    subnet: SubnetWire,
}

#[derive(Debug, Deserialize)]
struct Routers {
    routers: Vec<RouterWire>,
}

#[derive(Debug, Deserialize)]
struct RouterEnvelope {
    router: RouterWire,
}

#[derive(Debug, Deserialize)]
struct SecurityGroups {
    security_groups: Vec<SecurityGroupWire>,
}

#[derive(Debug, Deserialize)]
struct SecurityGroupEnvelope {
    security_group: SecurityGroupWire,
}

#[derive(Debug, Deserialize)]
struct Ports {
    ports: Vec<PortWire>,
}

#[derive(Debug, Serialize)]
struct RuleWire<'a> {
    security_group_id: &'a str,
    direction: &'static str,
    ethertype: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    protocol: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    port_range_min: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    port_range_max: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    remote_group_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    remote_ip_prefix: Option<&'a str>,
}

impl<'a> RuleWire<'a> {
    fn new(group_id: &'a str, rule: &'a SecurityGroupRule) -> Self {
        let (remote_group_id, remote_ip_prefix) = match &rule.remote {
            RuleRemote::Any => (None, None),
            RuleRemote::SameGroup => (Some(group_id), None),
            RuleRemote::Cidr(cidr) => (None, Some(cidr.as_str())),
        };

        Self {
            security_group_id: group_id,
            direction: match rule.direction {
                Direction::Ingress => "ingress",
                Direction::Egress => "egress",
            },
            ethertype: match rule.ether_type {
                EtherType::IPv4 => "IPv4",
                EtherType::IPv6 => "IPv6",
            },
            protocol: rule.protocol.map(|p| match p {
                Protocol::Tcp => "tcp",
                Protocol::Udp => "udp",
                Protocol::Icmp => "icmp",
            }),
            port_range_min: rule.port_range.map(|(min, _)| min),
            port_range_max: rule.port_range.map(|(_, max)| max),
            remote_group_id,
            remote_ip_prefix,
        }
    }
}

/// Exactly one match, or `ResourceNotFound` / `AmbiguousResource`
fn single<T>(mut items: Vec<T>, kind: ResourceKind, name: &str) -> clusternet_cloud::Result<T> {
    match items.len() {
        0 => Err(CloudError::not_found(kind, name)),
        1 => Ok(items.remove(0)),
        n => Err(CloudError::AmbiguousResource(format!(
            "{} {} resolves to {} resources",
            kind, name, n
        ))),
    }
}

/// Zero or one match
fn optional<T>(
    mut items: Vec<T>,
    kind: ResourceKind,
    name: &str,
) -> clusternet_cloud::Result<Option<T>> {
    match items.len() {
        0 => Ok(None),
        1 => Ok(Some(items.remove(0))),
        n => Err(CloudError::AmbiguousResource(format!(
            "{} {} resolves to {} resources",
            kind, name, n
        ))),
    }
}

impl NeutronClient {
    pub fn new(http: reqwest::Client, session: Session) -> Self {
        Self { http, session }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v2.0/{}", self.session.network_endpoint, path)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<T> {
        let response = self
            .http
            .get(self.url(path))
            .header(AUTH_TOKEN_HEADER, &self.session.token)
            .query(query)
            .send()
            .await?;
        Ok(check_status(response).await?.json().await?)
    }

    async fn post<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self
            .http
            .post(self.url(path))
            .header(AUTH_TOKEN_HEADER, &self.session.token)
            .json(body)
            .send()
            .await?;
        Ok(check_status(response).await?.json().await?)
    }

    async fn put<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<()> {
        let response = self
            .http
            .put(self.url(path))
            .header(AUTH_TOKEN_HEADER, &self.session.token)
            .json(body)
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let response = self
            .http
            .delete(self.url(path))
            .header(AUTH_TOKEN_HEADER, &self.session.token)
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }

    async fn networks_named(&self, name: &str) -> clusternet_cloud::Result<Vec<NetworkWire>> {
        let found: Networks = self
            .get("networks", &[("name", name)])
            .await
            .map_err(|e| e.into_cloud_error(ResourceKind::Network, name))?;
        Ok(found.networks)
    }

    async fn security_groups_named(
        &self,
        name: &str,
    ) -> clusternet_cloud::Result<Vec<SecurityGroupWire>> {
        let found: SecurityGroups = self
            .get("security-groups", &[("name", name)])
            .await
            .map_err(|e| e.into_cloud_error(ResourceKind::SecurityGroup, name))?;
        Ok(found.security_groups)
    }

    async fn create_rule(
        &self,
        group_id: &str,
        rule: &SecurityGroupRule,
    ) -> clusternet_cloud::Result<()> {
        let body = json!({ "security_group_rule": RuleWire::new(group_id, rule) });
        match self
            .post::<_, serde_json::Value>("security-group-rules", &body)
            .await
        {
            Ok(_) => Ok(()),
            // New groups come with default egress rules, retried ones with more
            Err(OpenstackError::Status { status: 409, .. }) => {
                tracing::debug!(group_id, "Security group rule already exists");
                Ok(())
            }
            Err(e) => Err(e.into_cloud_error(ResourceKind::SecurityGroup, group_id)),
        }
    }
}

#[async_trait]
impl CloudClient for NeutronClient {
    async fn find_network_by_name(
        &self,
        name: &str,
        external_only: bool,
    ) -> clusternet_cloud::Result<NetworkRef> {
        let network = single(self.networks_named(name).await?, ResourceKind::Network, name)?;
        if external_only && !network.external {
            return Err(CloudError::NotExternal(name.to_string()));
        }
        Ok(network.into())
    }

    async fn find_external_network(&self) -> clusternet_cloud::Result<NetworkRef> {
        let found: Networks = self
            .get("networks", &[("router:external", "true")])
            .await?;
        let mut networks = found.networks;
        match networks.len() {
            1 => Ok(networks.remove(0).into()),
            0 => Err(CloudError::AmbiguousResource(
                "no external network found".to_string(),
            )),
            n => Err(CloudError::AmbiguousResource(format!(
                "found {} external networks: {}",
                n,
                networks
                    .iter()
                    .map(|net| net.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            ))),
        }
    }

    async fn find_security_group(
        &self,
        name: &str,
    ) -> clusternet_cloud::Result<Option<SecurityGroupRef>> {
        let groups = self.security_groups_named(name).await?;
        Ok(optional(groups, ResourceKind::SecurityGroup, name)?.map(Into::into))
    }

    async fn find_subnet(
        &self,
        network_id: &str,
        name: &str,
    ) -> clusternet_cloud::Result<Option<SubnetRef>> {
        let found: Subnets = self
            .get("subnets", &[("network_id", network_id), ("name", name)])
            .await
            .map_err(|e| e.into_cloud_error(ResourceKind::Subnet, name))?;
        Ok(optional(found.subnets, ResourceKind::Subnet, name)?.map(Into::into))
    }

    async fn find_router(&self, name: &str) -> clusternet_cloud::Result<Option<RouterRef>> {
        let found: Routers = self
            .get("routers", &[("name", name)])
            .await
            .map_err(|e| e.into_cloud_error(ResourceKind::Router, name))?;
        Ok(optional(found.routers, ResourceKind::Router, name)?.map(Into::into))
    }

    async fn router_has_subnet(
        &self,
        router_id: &str,
        subnet_id: &str,
    ) -> clusternet_cloud::Result<bool> {
        let found: Ports = self
            .get("ports", &[("device_id", router_id)])
            .await
            .map_err(|e| e.into_cloud_error(ResourceKind::Router, router_id))?;
        Ok(found
            .ports
            .iter()
            .flat_map(|p| p.fixed_ips.iter())
            .any(|ip| ip.subnet_id == subnet_id))
    }

    async fn create_network(
        &self,
        name: &str,
        description: &str,
    ) -> clusternet_cloud::Result<NetworkRef> {
        let body = json!({
            "network": { "name": name, "description": description, "admin_state_up": true }
        });
        let created: NetworkEnvelope = self
            .post("networks", &body)
            .await
            .map_err(|e| e.into_cloud_error(ResourceKind::Network, name))?;
        Ok(created.network.into())
    }

    async fn create_subnet(&self, spec: &SubnetSpec) -> clusternet_cloud::Result<SubnetRef> {
        let body = json!({
            "subnet": {
                "name": spec.name,
                "description": spec.description,
                "network_id": spec.network_id,
                "cidr": spec.cidr,
                "gateway_ip": spec.gateway_ip,
                "ip_version": spec.ip_version,
                "dns_nameservers": spec.dns_nameservers,
            }
        });
        let created: SubnetEnvelope = self
            .post("subnets", &body)
            .await
            .map_err(|e| e.into_cloud_error(ResourceKind::Network, &spec.network_id))?;
        Ok(created.subnet.into())
    }

    async fn create_router(
        &self,
        name: &str,
        description: &str,
    ) -> clusternet_cloud::Result<RouterRef> {
        let body = json!({
            "router": { "name": name, "description": description, "admin_state_up": true }
        });
        let created: RouterEnvelope = self
            .post("routers", &body)
            .await
            .map_err(|e| e.into_cloud_error(ResourceKind::Router, name))?;
        Ok(created.router.into())
    }

    async fn set_router_gateway(
        &self,
        router_id: &str,
        external_network_id: &str,
    ) -> clusternet_cloud::Result<()> {
        let body = json!({
            "router": { "external_gateway_info": { "network_id": external_network_id } }
        });
        self.put(&format!("routers/{}", router_id), &body)
            .await
            .map_err(|e| e.into_cloud_error(ResourceKind::Router, router_id))
    }

    async fn create_security_group(
        &self,
        name: &str,
        description: &str,
    ) -> clusternet_cloud::Result<SecurityGroupRef> {
        let body = json!({
            "security_group": { "name": name, "description": description }
        });
        let created: SecurityGroupEnvelope = self
            .post("security-groups", &body)
            .await
            .map_err(|e| e.into_cloud_error(ResourceKind::SecurityGroup, name))?;
        Ok(created.security_group.into())
    }

    /// One request per rule; Neutron answers 409 for rules the group has
    async fn add_security_group_rules(
        &self,
        group_id: &str,
        rules: &[SecurityGroupRule],
    ) -> clusternet_cloud::Result<()> {
        for rule in rules {
            self.create_rule(group_id, rule).await?;
        }
        Ok(())
    }

    async fn attach_subnet_to_router(
        &self,
        subnet_id: &str,
        router_id: &str,
    ) -> clusternet_cloud::Result<()> {
        let body = json!({ "subnet_id": subnet_id });
        self.put(&format!("routers/{}/add_router_interface", router_id), &body)
            .await
            .map_err(|e| e.into_cloud_error(ResourceKind::Router, router_id))
    }

    async fn detach_subnet_from_router(
        &self,
        subnet_id: &str,
        router_id: &str,
    ) -> clusternet_cloud::Result<()> {
        let body = json!({ "subnet_id": subnet_id });
        self.put(&format!("routers/{}/remove_router_interface", router_id), &body)
            .await
            .map_err(|e| e.into_cloud_error(ResourceKind::Subnet, subnet_id))
    }

    async fn delete_network(&self, name: &str) -> clusternet_cloud::Result<()> {
        let network = single(self.networks_named(name).await?, ResourceKind::Network, name)?;
        self.delete(&format!("networks/{}", network.id))
            .await
            .map_err(|e| e.into_cloud_error(ResourceKind::Network, name))
    }

    async fn delete_router(&self, router_id: &str) -> clusternet_cloud::Result<()> {
        self.delete(&format!("routers/{}", router_id))
            .await
            .map_err(|e| e.into_cloud_error(ResourceKind::Router, router_id))
    }

    async fn delete_security_group(&self, name: &str) -> clusternet_cloud::Result<()> {
        let groups = self.security_groups_named(name).await?;
        let group = single(groups, ResourceKind::SecurityGroup, name)?;
        self.delete(&format!("security-groups/{}", group.id))
            .await
            .map_err(|e| e.into_cloud_error(ResourceKind::SecurityGroup, name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clusternet_cloud::{ErrorKind, SecurityGroupSpec};

    #[test]
    fn test_network_external_flag() {
        let body = r#"{"networks": [
            {"id": "n1", "name": "ext-net", "router:external": true, "status": "ACTIVE"},
            {"id": "n2", "name": "tenant"}
        ]}"#;
        let parsed: Networks = serde_json::from_str(body).unwrap();
        let refs: Vec<NetworkRef> = parsed.networks.into_iter().map(Into::into).collect();

        assert!(refs[0].external);
        assert!(!refs[1].external);
    }

    #[test]
    fn test_router_gateway_parsing() {
        let body = r#"{"routers": [
            {"id": "r1", "name": "a", "external_gateway_info": {"network_id": "n1", "enable_snat": true}},
            {"id": "r2", "name": "b", "external_gateway_info": null},
            {"id": "r3", "name": "c"}
        ]}"#;
        let parsed: Routers = serde_json::from_str(body).unwrap();
        let refs: Vec<RouterRef> = parsed.routers.into_iter().map(Into::into).collect();

        assert_eq!(refs[0].gateway_network_id.as_deref(), Some("n1"));
        assert!(refs[1].gateway_network_id.is_none());
        assert!(refs[2].gateway_network_id.is_none());
    }

    #[test]
    fn test_rule_wire_format() {
        let spec = SecurityGroupSpec::for_cluster("demo");
        let wires: Vec<serde_json::Value> = spec
            .rules
            .iter()
            .map(|r| serde_json::to_value(RuleWire::new("sg-1", r)).unwrap())
            .collect();

        let same_group = wires
            .iter()
            .filter(|w| w["remote_group_id"] == "sg-1")
            .count();
        assert_eq!(same_group, 2);

        let ssh = wires
            .iter()
            .find(|w| w["port_range_min"] == 22)
            .unwrap();
        assert_eq!(ssh["protocol"], "tcp");
        assert_eq!(ssh["direction"], "ingress");
        assert_eq!(ssh["ethertype"], "IPv4");
        assert!(ssh.get("remote_group_id").is_none());

        let icmp = wires.iter().find(|w| w["protocol"] == "icmp").unwrap();
        assert!(icmp.get("port_range_min").is_none());
    }

    #[test]
    fn test_rule_with_cidr_remote() {
        let rule = SecurityGroupRule {
            direction: Direction::Ingress,
            ether_type: EtherType::IPv4,
            protocol: Some(Protocol::Udp),
            port_range: Some((53, 53)),
            remote: RuleRemote::Cidr("10.0.0.0/8".to_string()),
        };
        let wire = serde_json::to_value(RuleWire::new("sg-1", &rule)).unwrap();
        assert_eq!(wire["remote_ip_prefix"], "10.0.0.0/8");
        assert_eq!(wire["protocol"], "udp");
    }

    #[test]
    fn test_single_and_optional() {
        assert_eq!(single(vec![1], ResourceKind::Network, "n").unwrap(), 1);
        assert_eq!(
            single(Vec::<u8>::new(), ResourceKind::Network, "n").unwrap_err().kind(),
            ErrorKind::ResourceNotFound
        );
        assert_eq!(
            single(vec![1, 2], ResourceKind::Network, "n").unwrap_err().kind(),
            ErrorKind::AmbiguousResource
        );
        assert_eq!(optional(Vec::<u8>::new(), ResourceKind::Router, "r").unwrap(), None);
    }

    #[test]
    fn test_router_ports_parsing() {
        let body = r#"{"ports": [
            {"id": "p1", "fixed_ips": [{"subnet_id": "s1", "ip_address": "192.168.1.1"}]},
            {"id": "p2", "fixed_ips": []}
        ]}"#;
        let parsed: Ports = serde_json::from_str(body).unwrap();
        assert!(
            parsed
                .ports
                .iter()
                .flat_map(|p| p.fixed_ips.iter())
                .any(|ip| ip.subnet_id == "s1")
        );
    }
}
