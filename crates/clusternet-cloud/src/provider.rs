//! Cloud provider trait definition and the network lifecycle algorithm

use crate::client::{CloudClient, NetworkRef, SecurityGroupRef, SecurityGroupSpec, SubnetSpec};
use crate::error::{CloudError, ResourceKind, Result, StepContext};
use crate::naming;
use crate::spec::{CloudSpec, Credentials, ManagedNetwork};
use async_trait::async_trait;
use clusternet_config::{DatacenterMeta, DatacenterRegistry};
use rand::RngCore;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Cloud provider abstraction trait
///
/// Every backend exposes the same lifecycle: validate a spec, initialize the
/// cluster network infrastructure, clean up what was created.
#[async_trait]
pub trait CloudProvider: Send + Sync {
    /// Returns the provider name (e.g., "openstack")
    fn name(&self) -> &str;

    /// Check that every referenced resource exists. Never mutates anything.
    async fn validate(&self, spec: &CloudSpec) -> Result<()>;

    /// Provision whatever the spec does not reference yet and record it.
    ///
    /// On failure the spec keeps every step that completed, so the caller can
    /// persist it and retry.
    async fn initialize(
        &self,
        spec: &mut CloudSpec,
        cluster_name: &str,
        checkpoint: &dyn Checkpoint,
    ) -> Result<()>;

    /// Delete the resources the spec owns. Externally supplied resources are
    /// never touched.
    async fn clean_up(&self, spec: &mut CloudSpec, checkpoint: &dyn Checkpoint) -> Result<()>;

    /// Unique name for a downstream node class
    fn node_class_name(&self, rng: &mut dyn RngCore) -> String;
}

/// Persists the spec while an operation is still running
///
/// Called after every recorded provisioning step and after every successful
/// deletion, so an interrupted operation resumes from where it stopped.
#[async_trait]
pub trait Checkpoint: Send + Sync {
    async fn save(&self, spec: &CloudSpec) -> Result<()>;
}

/// Checkpoint for callers that persist only the final spec
pub struct NoCheckpoint;

#[async_trait]
impl Checkpoint for NoCheckpoint {
    async fn save(&self, _spec: &CloudSpec) -> Result<()> {
        Ok(())
    }
}

/// Builds an authenticated [`CloudClient`] for one backend
#[async_trait]
pub trait Connector: Send + Sync {
    fn name(&self) -> &str;

    /// Fails with `Configuration` when the datacenter carries no config for
    /// this backend, `Authentication` when the credentials are rejected.
    async fn connect(
        &self,
        datacenter: &DatacenterMeta,
        credentials: &Credentials,
    ) -> Result<Box<dyn CloudClient>>;
}

/// Provider tuning
#[derive(Debug, Clone)]
pub struct ProviderOptions {
    /// Deadline for each individual cloud API call
    pub call_timeout: Duration,
}

impl Default for ProviderOptions {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(60),
        }
    }
}

/// The network lifecycle, written once for every backend
pub struct NetworkProvider<C> {
    connector: C,
    datacenters: Arc<DatacenterRegistry>,
    options: ProviderOptions,
}

impl<C: Connector> NetworkProvider<C> {
    pub fn new(connector: C, datacenters: Arc<DatacenterRegistry>) -> Self {
        Self {
            connector,
            datacenters,
            options: ProviderOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ProviderOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &ProviderOptions {
        &self.options
    }

    fn datacenter(&self, spec: &CloudSpec) -> Result<&DatacenterMeta> {
        let name = spec.datacenter_name();
        let dc = self
            .datacenters
            .get(name)
            .ok_or_else(|| CloudError::Configuration(format!("invalid datacenter {:?}", name)))?;

        if dc.backend().is_none() {
            return Err(CloudError::Configuration(format!(
                "datacenter {:?} has no backend configuration",
                name
            )));
        }
        Ok(dc)
    }

    async fn connect(&self, spec: &CloudSpec) -> Result<(&DatacenterMeta, Box<dyn CloudClient>)> {
        let dc = self.datacenter(spec)?;
        let client = self
            .call(
                "authenticate against",
                spec.datacenter_name(),
                self.connector.connect(dc, spec.credentials()),
            )
            .await?;
        Ok((dc, client))
    }

    /// Run one cloud call under the per-call deadline
    async fn call<T, F>(&self, operation: &'static str, resource: &str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>> + Send,
    {
        match tokio::time::timeout(self.options.call_timeout, fut).await {
            Ok(result) => result.step(operation, resource),
            Err(_) => {
                let timeout = self.options.call_timeout;
                warn!(operation, resource, ?timeout, "Cloud call timed out");
                Err::<T, _>(CloudError::Timeout(timeout)).step(operation, resource)
            }
        }
    }

    /// Deletion where an already missing resource counts as done
    async fn delete<F>(&self, operation: &'static str, resource: &str, fut: F) -> Result<()>
    where
        F: Future<Output = Result<()>> + Send,
    {
        match self.call(operation, resource, fut).await {
            Err(e) if e.is_not_found() => {
                debug!(operation, resource, "Resource already gone");
                Ok(())
            }
            other => other,
        }
    }

    async fn lookup_network(
        &self,
        client: &dyn CloudClient,
        name: &str,
    ) -> Result<Option<NetworkRef>> {
        match self
            .call("look up network", name, client.find_network_by_name(name, false))
            .await
        {
            Ok(network) => Ok(Some(network)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn ensure_security_group(
        &self,
        client: &dyn CloudClient,
        cluster_name: &str,
    ) -> Result<SecurityGroupRef> {
        let spec = SecurityGroupSpec::for_cluster(cluster_name);
        let name = spec.name.as_str();

        let group = match self
            .call("look up security group", name, client.find_security_group(name))
            .await?
        {
            Some(existing) => {
                claim(ResourceKind::SecurityGroup, name, &existing.description, cluster_name)?;
                info!(security_group = %existing.name, "Reusing security group");
                existing
            }
            None => {
                let group = self
                    .call(
                        "create security group",
                        name,
                        client.create_security_group(name, &spec.description),
                    )
                    .await?;
                info!(security_group = %group.name, "Created security group");
                group
            }
        };

        // An earlier attempt may have stopped between creating the group and
        // adding its rules
        self.call(
            "add rules to security group",
            name,
            client.add_security_group_rules(&group.id, &spec.rules),
        )
        .await?;
        debug!(security_group = %group.name, rules = spec.rules.len(), "Rules in place");
        Ok(group)
    }

    /// network → subnet → router → subnet interface → router gateway
    ///
    /// Each sub-step first looks for what a failed earlier attempt may have
    /// left behind under the deterministic name. Only resources carrying this
    /// cluster's ownership marker are reused.
    async fn ensure_network(
        &self,
        client: &dyn CloudClient,
        cluster_name: &str,
        floating_ip_pool: &str,
        dns_servers: &[String],
    ) -> Result<ManagedNetwork> {
        let name = naming::resource_name(cluster_name);
        let marker = naming::ownership_marker(cluster_name);

        let external = self
            .call(
                "look up floating ip pool",
                floating_ip_pool,
                client.find_network_by_name(floating_ip_pool, true),
            )
            .await?;

        let network = match self.lookup_network(client, &name).await? {
            Some(network) => {
                claim(ResourceKind::Network, &name, &network.description, cluster_name)?;
                info!(network = %network.name, "Reusing network from an earlier attempt");
                network
            }
            None => {
                let network = self
                    .call("create network", &name, client.create_network(&name, &marker))
                    .await?;
                info!(network = %network.name, id = %network.id, "Created network");
                network
            }
        };

        let subnet = match self
            .call("look up subnet", &name, client.find_subnet(&network.id, &name))
            .await?
        {
            Some(subnet) => {
                claim(ResourceKind::Subnet, &name, &subnet.description, cluster_name)?;
                subnet
            }
            None => {
                let spec = SubnetSpec::for_cluster(cluster_name, &network.id, dns_servers);
                let subnet = self
                    .call("create subnet", &name, client.create_subnet(&spec))
                    .await?;
                info!(subnet = %subnet.id, cidr = %subnet.cidr, "Created subnet");
                subnet
            }
        };

        let router = match self
            .call("look up router", &name, client.find_router(&name))
            .await?
        {
            Some(router) => {
                claim(ResourceKind::Router, &name, &router.description, cluster_name)?;
                router
            }
            None => {
                let router = self
                    .call("create router", &name, client.create_router(&name, &marker))
                    .await?;
                info!(router = %router.id, "Created router");
                router
            }
        };

        let attached = self
            .call(
                "inspect router",
                &router.id,
                client.router_has_subnet(&router.id, &subnet.id),
            )
            .await?;
        if !attached {
            self.call(
                "attach subnet to router",
                &subnet.id,
                client.attach_subnet_to_router(&subnet.id, &router.id),
            )
            .await?;
            debug!(subnet = %subnet.id, router = %router.id, "Attached subnet to router");
        }

        if router.gateway_network_id.as_deref() != Some(external.id.as_str()) {
            self.call(
                "set router gateway",
                &router.id,
                client.set_router_gateway(&router.id, &external.id),
            )
            .await?;
            debug!(router = %router.id, external_network = %external.name, "Set router gateway");
        }

        Ok(ManagedNetwork {
            network: network.name,
            subnet_id: subnet.id,
            router_id: router.id,
        })
    }

    async fn tear_down(
        &self,
        client: &dyn CloudClient,
        spec: &mut CloudSpec,
        checkpoint: &dyn Checkpoint,
        deleted: &mut Vec<String>,
    ) -> Result<()> {
        if spec.security_group_created() {
            let groups: Vec<String> = spec.security_groups().iter().cloned().collect();
            for group in groups {
                self.delete(
                    "delete security group",
                    &group,
                    client.delete_security_group(&group),
                )
                .await?;
                info!(security_group = %group, "Deleted security group");

                spec.forget_security_group(&group);
                deleted.push(format!("security group {}", group));
                checkpoint.save(spec).await?;
            }
        }

        if spec.network_created() {
            let (Some(network), Some(subnet_id), Some(router_id)) = (
                spec.network().map(str::to_string),
                spec.subnet_id().map(str::to_string),
                spec.router_id().map(str::to_string),
            ) else {
                return Err(CloudError::InvalidSpec(
                    "network_created is set but identifiers are missing".to_string(),
                ));
            };

            // The router refuses deletion while the subnet interface exists
            self.delete(
                "detach subnet from router",
                &subnet_id,
                client.detach_subnet_from_router(&subnet_id, &router_id),
            )
            .await?;

            self.delete("delete network", &network, client.delete_network(&network))
                .await?;
            info!(network = %network, "Deleted network");
            deleted.push(format!("network {}", network));

            self.delete("delete router", &router_id, client.delete_router(&router_id))
                .await?;
            info!(router = %router_id, "Deleted router");
            deleted.push(format!("router {}", router_id));

            spec.forget_network();
            checkpoint.save(spec).await?;
        }

        Ok(())
    }
}

/// Refuse to adopt a same-named resource some other party created
fn claim(kind: ResourceKind, name: &str, description: &str, cluster_name: &str) -> Result<()> {
    if description == naming::ownership_marker(cluster_name) {
        Ok(())
    } else {
        warn!(%kind, name, "Name is taken by a resource clusternet did not create");
        Err(CloudError::NameTaken {
            kind,
            name: name.to_string(),
        })
    }
}

#[async_trait]
impl<C: Connector> CloudProvider for NetworkProvider<C> {
    fn name(&self) -> &str {
        self.connector.name()
    }

    #[tracing::instrument(skip_all, fields(datacenter = %spec.datacenter_name()))]
    async fn validate(&self, spec: &CloudSpec) -> Result<()> {
        let (_, client) = self.connect(spec).await?;

        for group in spec.security_groups() {
            let found = self
                .call("look up security group", group, client.find_security_group(group))
                .await?;
            if found.is_none() {
                return Err::<(), _>(CloudError::not_found(ResourceKind::SecurityGroup, group))
                    .step("look up security group", group);
            }
        }

        if let Some(network) = spec.network() {
            self.call(
                "look up network",
                network,
                client.find_network_by_name(network, false),
            )
            .await?;
        }

        if let Some(pool) = spec.floating_ip_pool() {
            let resolved = self
                .call(
                    "look up floating ip pool",
                    pool,
                    client.find_network_by_name(pool, true),
                )
                .await;
            match resolved {
                Ok(_) => {}
                Err(e) if e.is_not_found() => {
                    return Err::<(), _>(CloudError::not_found(ResourceKind::FloatingIpPool, pool))
                        .step("look up floating ip pool", pool);
                }
                Err(e) => return Err(e),
            }
        }

        debug!("Cloud spec is valid");
        Ok(())
    }

    #[tracing::instrument(
        skip_all,
        fields(cluster = %cluster_name, datacenter = %spec.datacenter_name())
    )]
    async fn initialize(
        &self,
        spec: &mut CloudSpec,
        cluster_name: &str,
        checkpoint: &dyn Checkpoint,
    ) -> Result<()> {
        if spec.is_initialized() {
            debug!("Cloud spec already initialized");
            return Ok(());
        }

        naming::validate_cluster_name(cluster_name)?;
        let (dc, client) = self.connect(spec).await?;

        if spec.floating_ip_pool().is_none() {
            let external = self
                .call("find external network", "*", client.find_external_network())
                .await?;
            info!(floating_ip_pool = %external.name, "Selected floating ip pool");
            spec.record_floating_ip_pool(external.name);
            checkpoint.save(spec).await?;
        }

        if spec.security_groups().is_empty() {
            let group = self.ensure_security_group(client.as_ref(), cluster_name).await?;
            spec.record_created_security_group(group.name);
            checkpoint.save(spec).await?;
        }

        if spec.network().is_none() {
            let pool = spec
                .floating_ip_pool()
                .map(str::to_string)
                .ok_or_else(|| CloudError::InvalidSpec("floating ip pool is not set".to_string()))?;

            let managed = self
                .ensure_network(client.as_ref(), cluster_name, &pool, dc.spec.dns_servers())
                .await?;
            spec.record_created_network(managed)?;
            checkpoint.save(spec).await?;
        }

        info!("Cloud infrastructure initialized");
        Ok(())
    }

    #[tracing::instrument(skip_all, fields(datacenter = %spec.datacenter_name()))]
    async fn clean_up(&self, spec: &mut CloudSpec, checkpoint: &dyn Checkpoint) -> Result<()> {
        if !spec.owns_resources() {
            debug!("No owned resources, nothing to clean up");
            return Ok(());
        }

        let (_, client) = self.connect(spec).await?;

        let mut deleted = Vec::new();
        match self
            .tear_down(client.as_ref(), spec, checkpoint, &mut deleted)
            .await
        {
            Ok(()) => {
                info!(deleted = deleted.len(), "Cloud infrastructure cleaned up");
                Ok(())
            }
            Err(e) if deleted.is_empty() => Err(e),
            Err(e) => {
                warn!(deleted = ?deleted, error = %e, "Cleanup stopped part way");
                Err(CloudError::PartialCleanup {
                    deleted,
                    source: Box::new(e),
                })
            }
        }
    }

    fn node_class_name(&self, rng: &mut dyn RngCore) -> String {
        naming::node_class_name(rng)
    }
}
