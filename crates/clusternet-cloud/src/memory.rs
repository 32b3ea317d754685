//! In-memory cloud backend
//!
//! A complete [`CloudClient`] over a shared in-process model of networks,
//! subnets, routers and security groups. It enforces the same ordering
//! constraints as a real network API (a router with interfaces cannot be
//! deleted, nor can a network whose subnet is still attached), records every
//! call, and can be told to fail the next call of a given kind.

use crate::client::{
    CloudClient, NetworkRef, RouterRef, SecurityGroupRef, SecurityGroupRule, SubnetRef,
    SubnetSpec,
};
use crate::error::{CloudError, ResourceKind, Result};
use crate::provider::Connector;
use crate::spec::Credentials;
use async_trait::async_trait;
use clusternet_config::DatacenterMeta;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Kind of call, used for failure injection and filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    Connect,
    FindNetworkByName,
    FindExternalNetwork,
    FindSecurityGroup,
    FindSubnet,
    FindRouter,
    RouterHasSubnet,
    CreateNetwork,
    CreateSubnet,
    CreateRouter,
    SetRouterGateway,
    CreateSecurityGroup,
    AddSecurityGroupRules,
    AttachSubnet,
    DetachSubnet,
    DeleteNetwork,
    DeleteRouter,
    DeleteSecurityGroup,
}

impl CallKind {
    /// Whether the call changes cloud state
    pub fn is_mutation(self) -> bool {
        matches!(
            self,
            CallKind::CreateNetwork
                | CallKind::CreateSubnet
                | CallKind::CreateRouter
                | CallKind::SetRouterGateway
                | CallKind::CreateSecurityGroup
                | CallKind::AddSecurityGroupRules
                | CallKind::AttachSubnet
                | CallKind::DetachSubnet
                | CallKind::DeleteNetwork
                | CallKind::DeleteRouter
                | CallKind::DeleteSecurityGroup
        )
    }

    fn resource_kind(self) -> ResourceKind {
        match self {
            CallKind::FindSubnet | CallKind::CreateSubnet | CallKind::DetachSubnet => {
                ResourceKind::Subnet
            }
            CallKind::FindRouter
            | CallKind::RouterHasSubnet
            | CallKind::CreateRouter
            | CallKind::SetRouterGateway
            | CallKind::AttachSubnet
            | CallKind::DeleteRouter => ResourceKind::Router,
            CallKind::FindSecurityGroup
            | CallKind::CreateSecurityGroup
            | CallKind::AddSecurityGroupRules
            | CallKind::DeleteSecurityGroup => ResourceKind::SecurityGroup,
            CallKind::Connect
            | CallKind::FindNetworkByName
            | CallKind::FindExternalNetwork
            | CallKind::CreateNetwork
            | CallKind::DeleteNetwork => ResourceKind::Network,
        }
    }
}

/// A recorded call and its main argument
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub kind: CallKind,
    pub target: String,
}

/// Failure to inject into the next matching call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Failure {
    Transient,
    Authentication,
    NotFound,
    Api(String),
    /// Never answer; only a deadline ends the call
    Hang,
}

#[derive(Debug, Clone)]
struct MemNetwork {
    id: String,
    name: String,
    external: bool,
    description: String,
}

#[derive(Debug, Clone)]
struct MemSubnet {
    id: String,
    name: String,
    network_id: String,
    cidr: String,
    dns_nameservers: Vec<String>,
    description: String,
}

#[derive(Debug, Clone)]
struct MemRouter {
    id: String,
    name: String,
    gateway_network_id: Option<String>,
    interfaces: BTreeSet<String>,
    description: String,
}

#[derive(Debug, Clone)]
struct MemSecurityGroup {
    id: String,
    name: String,
    rules: Vec<SecurityGroupRule>,
    description: String,
}

#[derive(Debug, Default)]
struct Model {
    networks: BTreeMap<String, MemNetwork>,
    subnets: BTreeMap<String, MemSubnet>,
    routers: BTreeMap<String, MemRouter>,
    security_groups: BTreeMap<String, MemSecurityGroup>,
    next_id: u64,
    calls: Vec<Call>,
    failures: Vec<(CallKind, Failure)>,
    rejected_passwords: BTreeSet<String>,
}

impl Model {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}-{}", prefix, self.next_id)
    }

    fn network_by_name(&self, name: &str) -> Option<&MemNetwork> {
        self.networks.values().find(|n| n.name == name)
    }

    fn network_ref(network: &MemNetwork) -> NetworkRef {
        NetworkRef {
            id: network.id.clone(),
            name: network.name.clone(),
            external: network.external,
            description: network.description.clone(),
        }
    }

    fn router_ref(router: &MemRouter) -> RouterRef {
        RouterRef {
            id: router.id.clone(),
            name: router.name.clone(),
            gateway_network_id: router.gateway_network_id.clone(),
            description: router.description.clone(),
        }
    }

    fn subnet_ref(subnet: &MemSubnet) -> SubnetRef {
        SubnetRef {
            id: subnet.id.clone(),
            name: subnet.name.clone(),
            network_id: subnet.network_id.clone(),
            cidr: subnet.cidr.clone(),
            description: subnet.description.clone(),
        }
    }

    fn security_group_ref(group: &MemSecurityGroup) -> SecurityGroupRef {
        SecurityGroupRef {
            id: group.id.clone(),
            name: group.name.clone(),
            description: group.description.clone(),
        }
    }

    fn insert_network(&mut self, name: &str, external: bool, description: &str) -> NetworkRef {
        let id = self.next_id("net");
        let network = MemNetwork {
            id: id.clone(),
            name: name.to_string(),
            external,
            description: description.to_string(),
        };
        let reference = Model::network_ref(&network);
        self.networks.insert(id, network);
        reference
    }

    fn insert_security_group(&mut self, name: &str, description: &str) -> SecurityGroupRef {
        let id = self.next_id("sg");
        let group = MemSecurityGroup {
            id: id.clone(),
            name: name.to_string(),
            rules: Vec::new(),
            description: description.to_string(),
        };
        let reference = Model::security_group_ref(&group);
        self.security_groups.insert(id, group);
        reference
    }
}

/// Shared in-memory cloud; clones see the same state
#[derive(Debug, Clone, Default)]
pub struct InMemoryCloud {
    model: Arc<Mutex<Model>>,
}

impl InMemoryCloud {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Model> {
        self.model.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Add an internet facing network
    pub fn add_external_network(&self, name: &str) -> NetworkRef {
        self.lock().insert_network(name, true, "")
    }

    /// Add a tenant network that already exists before any cluster
    pub fn add_network(&self, name: &str) -> NetworkRef {
        self.lock().insert_network(name, false, "")
    }

    /// Add a security group that already exists before any cluster
    pub fn add_security_group(&self, name: &str) -> SecurityGroupRef {
        self.lock().insert_security_group(name, "")
    }

    /// Make `connect` reject this password
    pub fn reject_password(&self, password: &str) {
        self.lock().rejected_passwords.insert(password.to_string());
    }

    /// Fail the next call of `kind`
    pub fn fail_next(&self, kind: CallKind, failure: Failure) {
        self.lock().failures.push((kind, failure));
    }

    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    /// Calls that changed (or tried to change) cloud state
    pub fn mutations(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| c.kind.is_mutation())
            .collect()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    pub fn has_network(&self, name: &str) -> bool {
        self.lock().network_by_name(name).is_some()
    }

    pub fn network_count(&self) -> usize {
        self.lock().networks.len()
    }

    pub fn subnet_count(&self) -> usize {
        self.lock().subnets.len()
    }

    pub fn router_count(&self) -> usize {
        self.lock().routers.len()
    }

    pub fn security_group_count(&self) -> usize {
        self.lock().security_groups.len()
    }

    pub fn security_group_rules(&self, name: &str) -> Option<Vec<SecurityGroupRule>> {
        self.lock()
            .security_groups
            .values()
            .find(|g| g.name == name)
            .map(|g| g.rules.clone())
    }

    pub fn subnet_dns_nameservers(&self, subnet_id: &str) -> Option<Vec<String>> {
        self.lock()
            .subnets
            .get(subnet_id)
            .map(|s| s.dns_nameservers.clone())
    }

    pub fn router(&self, router_id: &str) -> Option<RouterRef> {
        self.lock().routers.get(router_id).map(Model::router_ref)
    }

    pub fn router_interfaces(&self, router_id: &str) -> Vec<String> {
        self.lock()
            .routers
            .get(router_id)
            .map(|r| r.interfaces.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Record the call and fire a pending injected failure
    async fn enter(&self, kind: CallKind, target: &str) -> Result<()> {
        let failure = {
            let mut model = self.lock();
            model.calls.push(Call {
                kind,
                target: target.to_string(),
            });
            let pending = model.failures.iter().position(|(k, _)| *k == kind);
            pending.map(|idx| model.failures.remove(idx).1)
        };

        match failure {
            None => Ok(()),
            Some(Failure::Transient) => Err(CloudError::Transient(
                "503 Service Unavailable".to_string(),
            )),
            Some(Failure::Authentication) => Err(CloudError::Authentication(
                "401 Unauthorized".to_string(),
            )),
            Some(Failure::NotFound) => Err(CloudError::not_found(kind.resource_kind(), target)),
            Some(Failure::Api(message)) => Err(CloudError::Api(message)),
            Some(Failure::Hang) => {
                tokio::time::sleep(Duration::from_secs(24 * 60 * 60)).await;
                Err(CloudError::Transient("hung call returned".to_string()))
            }
        }
    }
}

#[async_trait]
impl CloudClient for InMemoryCloud {
    async fn find_network_by_name(&self, name: &str, external_only: bool) -> Result<NetworkRef> {
        self.enter(CallKind::FindNetworkByName, name).await?;
        let model = self.lock();
        let network = model
            .network_by_name(name)
            .ok_or_else(|| CloudError::not_found(ResourceKind::Network, name))?;
        if external_only && !network.external {
            return Err(CloudError::NotExternal(name.to_string()));
        }
        Ok(Model::network_ref(network))
    }

    async fn find_external_network(&self) -> Result<NetworkRef> {
        self.enter(CallKind::FindExternalNetwork, "*").await?;
        let model = self.lock();
        let external: Vec<&MemNetwork> = model.networks.values().filter(|n| n.external).collect();
        match external.as_slice() {
            [network] => Ok(Model::network_ref(network)),
            [] => Err(CloudError::AmbiguousResource(
                "no external network found".to_string(),
            )),
            many => Err(CloudError::AmbiguousResource(format!(
                "found {} external networks: {}",
                many.len(),
                many.iter()
                    .map(|n| n.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            ))),
        }
    }

    async fn find_security_group(&self, name: &str) -> Result<Option<SecurityGroupRef>> {
        self.enter(CallKind::FindSecurityGroup, name).await?;
        Ok(self
            .lock()
            .security_groups
            .values()
            .find(|g| g.name == name)
            .map(Model::security_group_ref))
    }

    async fn find_subnet(&self, network_id: &str, name: &str) -> Result<Option<SubnetRef>> {
        self.enter(CallKind::FindSubnet, name).await?;
        Ok(self
            .lock()
            .subnets
            .values()
            .find(|s| s.network_id == network_id && s.name == name)
            .map(Model::subnet_ref))
    }

    async fn find_router(&self, name: &str) -> Result<Option<RouterRef>> {
        self.enter(CallKind::FindRouter, name).await?;
        Ok(self
            .lock()
            .routers
            .values()
            .find(|r| r.name == name)
            .map(Model::router_ref))
    }

    async fn router_has_subnet(&self, router_id: &str, subnet_id: &str) -> Result<bool> {
        self.enter(CallKind::RouterHasSubnet, router_id).await?;
        let model = self.lock();
        let router = model
            .routers
            .get(router_id)
            .ok_or_else(|| CloudError::not_found(ResourceKind::Router, router_id))?;
        Ok(router.interfaces.contains(subnet_id))
    }

    async fn create_network(&self, name: &str, description: &str) -> Result<NetworkRef> {
        self.enter(CallKind::CreateNetwork, name).await?;
        Ok(self.lock().insert_network(name, false, description))
    }

    async fn create_subnet(&self, spec: &SubnetSpec) -> Result<SubnetRef> {
        self.enter(CallKind::CreateSubnet, &spec.name).await?;
        let mut model = self.lock();
        if !model.networks.contains_key(&spec.network_id) {
            return Err(CloudError::not_found(ResourceKind::Network, &spec.network_id));
        }
        let id = model.next_id("subnet");
        let subnet = MemSubnet {
            id: id.clone(),
            name: spec.name.clone(),
            network_id: spec.network_id.clone(),
            cidr: spec.cidr.clone(),
            dns_nameservers: spec.dns_nameservers.clone(),
            description: spec.description.clone(),
        };
        let reference = Model::subnet_ref(&subnet);
        model.subnets.insert(id, subnet);
        Ok(reference)
    }

    async fn create_router(&self, name: &str, description: &str) -> Result<RouterRef> {
        self.enter(CallKind::CreateRouter, name).await?;
        let mut model = self.lock();
        let id = model.next_id("router");
        let router = MemRouter {
            id: id.clone(),
            name: name.to_string(),
            gateway_network_id: None,
            interfaces: BTreeSet::new(),
            description: description.to_string(),
        };
        let reference = Model::router_ref(&router);
        model.routers.insert(id, router);
        Ok(reference)
    }

    async fn set_router_gateway(&self, router_id: &str, external_network_id: &str) -> Result<()> {
        self.enter(CallKind::SetRouterGateway, router_id).await?;
        let mut model = self.lock();
        let external = model
            .networks
            .get(external_network_id)
            .map(|n| n.external)
            .ok_or_else(|| CloudError::not_found(ResourceKind::Network, external_network_id))?;
        if !external {
            return Err(CloudError::NotExternal(external_network_id.to_string()));
        }
        let router = model
            .routers
            .get_mut(router_id)
            .ok_or_else(|| CloudError::not_found(ResourceKind::Router, router_id))?;
        router.gateway_network_id = Some(external_network_id.to_string());
        Ok(())
    }

    async fn create_security_group(
        &self,
        name: &str,
        description: &str,
    ) -> Result<SecurityGroupRef> {
        self.enter(CallKind::CreateSecurityGroup, name).await?;
        Ok(self.lock().insert_security_group(name, description))
    }

    async fn add_security_group_rules(
        &self,
        group_id: &str,
        rules: &[SecurityGroupRule],
    ) -> Result<()> {
        self.enter(CallKind::AddSecurityGroupRules, group_id).await?;
        let mut model = self.lock();
        let group = model
            .security_groups
            .get_mut(group_id)
            .ok_or_else(|| CloudError::not_found(ResourceKind::SecurityGroup, group_id))?;
        for rule in rules {
            if !group.rules.contains(rule) {
                group.rules.push(rule.clone());
            }
        }
        Ok(())
    }

    async fn attach_subnet_to_router(&self, subnet_id: &str, router_id: &str) -> Result<()> {
        self.enter(CallKind::AttachSubnet, subnet_id).await?;
        let mut model = self.lock();
        if !model.subnets.contains_key(subnet_id) {
            return Err(CloudError::not_found(ResourceKind::Subnet, subnet_id));
        }
        let router = model
            .routers
            .get_mut(router_id)
            .ok_or_else(|| CloudError::not_found(ResourceKind::Router, router_id))?;
        if !router.interfaces.insert(subnet_id.to_string()) {
            return Err(CloudError::Api(format!(
                "router {} already has an interface on subnet {}",
                router_id, subnet_id
            )));
        }
        Ok(())
    }

    async fn detach_subnet_from_router(&self, subnet_id: &str, router_id: &str) -> Result<()> {
        self.enter(CallKind::DetachSubnet, subnet_id).await?;
        let mut model = self.lock();
        let router = model
            .routers
            .get_mut(router_id)
            .ok_or_else(|| CloudError::not_found(ResourceKind::Router, router_id))?;
        if !router.interfaces.remove(subnet_id) {
            return Err(CloudError::not_found(ResourceKind::Subnet, subnet_id));
        }
        Ok(())
    }

    async fn delete_network(&self, name: &str) -> Result<()> {
        self.enter(CallKind::DeleteNetwork, name).await?;
        let mut model = self.lock();
        let network_id = model
            .network_by_name(name)
            .map(|n| n.id.clone())
            .ok_or_else(|| CloudError::not_found(ResourceKind::Network, name))?;

        let subnet_ids: Vec<String> = model
            .subnets
            .values()
            .filter(|s| s.network_id == network_id)
            .map(|s| s.id.clone())
            .collect();

        let in_use = model
            .routers
            .values()
            .any(|r| subnet_ids.iter().any(|s| r.interfaces.contains(s)));
        if in_use {
            return Err(CloudError::Api(format!(
                "network {} has subnets attached to a router",
                name
            )));
        }

        for id in &subnet_ids {
            model.subnets.remove(id);
        }
        model.networks.remove(&network_id);
        Ok(())
    }

    async fn delete_router(&self, router_id: &str) -> Result<()> {
        self.enter(CallKind::DeleteRouter, router_id).await?;
        let mut model = self.lock();
        let router = model
            .routers
            .get(router_id)
            .ok_or_else(|| CloudError::not_found(ResourceKind::Router, router_id))?;
        if !router.interfaces.is_empty() {
            return Err(CloudError::Api(format!(
                "router {} still has interfaces attached",
                router_id
            )));
        }
        model.routers.remove(router_id);
        Ok(())
    }

    async fn delete_security_group(&self, name: &str) -> Result<()> {
        self.enter(CallKind::DeleteSecurityGroup, name).await?;
        let mut model = self.lock();
        let id = model
            .security_groups
            .values()
            .find(|g| g.name == name)
            .map(|g| g.id.clone())
            .ok_or_else(|| CloudError::not_found(ResourceKind::SecurityGroup, name))?;
        model.security_groups.remove(&id);
        Ok(())
    }
}

/// Connector handing out clients of one [`InMemoryCloud`]
#[derive(Debug, Clone, Default)]
pub struct MemoryConnector {
    cloud: InMemoryCloud,
}

impl MemoryConnector {
    pub fn new(cloud: InMemoryCloud) -> Self {
        Self { cloud }
    }

    pub fn cloud(&self) -> &InMemoryCloud {
        &self.cloud
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    fn name(&self) -> &str {
        "memory"
    }

    async fn connect(
        &self,
        datacenter: &DatacenterMeta,
        credentials: &Credentials,
    ) -> Result<Box<dyn CloudClient>> {
        self.cloud.enter(CallKind::Connect, &datacenter.location).await?;

        if datacenter.backend().is_none() {
            return Err(CloudError::Configuration(
                "datacenter has no backend configuration".to_string(),
            ));
        }

        let Credentials::Openstack(os) = credentials;
        if self.cloud.lock().rejected_passwords.contains(&os.password) {
            return Err(CloudError::Authentication(format!(
                "credentials for user {} were rejected",
                os.username
            )));
        }

        Ok(Box::new(self.cloud.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::SecurityGroupSpec;

    #[tokio::test]
    async fn test_router_with_interface_cannot_be_deleted() {
        let cloud = InMemoryCloud::new();
        let network = cloud
            .create_network("clusternet-demo", "clusternet:demo")
            .await
            .unwrap();
        let subnet = cloud
            .create_subnet(&SubnetSpec::for_cluster("demo", &network.id, &[]))
            .await
            .unwrap();
        let router = cloud.create_router("router", "").await.unwrap();
        cloud
            .attach_subnet_to_router(&subnet.id, &router.id)
            .await
            .unwrap();

        let err = cloud.delete_router(&router.id).await.unwrap_err();
        assert!(matches!(err, CloudError::Api(_)));
        let err = cloud.delete_network("clusternet-demo").await.unwrap_err();
        assert!(matches!(err, CloudError::Api(_)));

        cloud
            .detach_subnet_from_router(&subnet.id, &router.id)
            .await
            .unwrap();
        cloud.delete_network("clusternet-demo").await.unwrap();
        cloud.delete_router(&router.id).await.unwrap();
        assert_eq!(cloud.subnet_count(), 0);
    }

    #[tokio::test]
    async fn test_failure_fires_once() {
        let cloud = InMemoryCloud::new();
        cloud.fail_next(CallKind::CreateRouter, Failure::Transient);

        let err = cloud.create_router("r", "").await.unwrap_err();
        assert!(err.is_retriable());
        cloud.create_router("r", "").await.unwrap();

        let kinds: Vec<CallKind> = cloud.calls().into_iter().map(|c| c.kind).collect();
        assert_eq!(kinds, vec![CallKind::CreateRouter, CallKind::CreateRouter]);
    }

    #[tokio::test]
    async fn test_external_only_lookup() {
        let cloud = InMemoryCloud::new();
        cloud.add_external_network("ext-net");
        cloud.add_network("tenant");

        assert!(cloud.find_network_by_name("ext-net", true).await.unwrap().external);
        let err = cloud.find_network_by_name("tenant", true).await.unwrap_err();
        assert!(matches!(err, CloudError::NotExternal(_)));
        assert!(cloud.find_network_by_name("gone", false).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_lookups_report_description() {
        let cloud = InMemoryCloud::new();
        cloud.add_network("customer");
        cloud
            .create_network("clusternet-demo", "clusternet:demo")
            .await
            .unwrap();

        let customer = cloud.find_network_by_name("customer", false).await.unwrap();
        assert_eq!(customer.description, "");
        let owned = cloud
            .find_network_by_name("clusternet-demo", false)
            .await
            .unwrap();
        assert_eq!(owned.description, "clusternet:demo");
    }

    #[tokio::test]
    async fn test_adding_rules_skips_present_ones() {
        let cloud = InMemoryCloud::new();
        let group = cloud
            .create_security_group("clusternet-demo", "clusternet:demo")
            .await
            .unwrap();
        let rules = SecurityGroupSpec::for_cluster("demo").rules;

        cloud
            .add_security_group_rules(&group.id, &rules[..3])
            .await
            .unwrap();
        cloud.add_security_group_rules(&group.id, &rules).await.unwrap();

        assert_eq!(
            cloud.security_group_rules("clusternet-demo").unwrap(),
            rules
        );
        assert!(CallKind::AddSecurityGroupRules.is_mutation());
        assert!(!CallKind::FindSecurityGroup.is_mutation());
    }
}
