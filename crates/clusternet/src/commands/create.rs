use crate::utils::{self, Context};
use anyhow::bail;
use clusternet_cloud::{CloudSpec, Credentials, OpenstackCredentials, naming};
use colored::Colorize;

pub struct CreateOptions {
    pub datacenter: String,
    pub username: String,
    pub password: String,
    pub domain: String,
    pub tenant: String,
    pub network: Option<String>,
    pub security_groups: Vec<String>,
    pub floating_ip_pool: Option<String>,
    pub force: bool,
}

pub async fn handle(ctx: &Context, cluster: &str, options: CreateOptions) -> anyhow::Result<()> {
    naming::validate_cluster_name(cluster)?;

    let registry = utils::load_registry()?;
    if registry.get(&options.datacenter).is_none() {
        bail!(
            "unknown datacenter {}; available: {}",
            options.datacenter,
            registry.names().collect::<Vec<_>>().join(", ")
        );
    }

    let store = ctx.store();
    let lock = store.acquire_lock(cluster).await?;

    if !options.force && store.load(cluster).await?.is_some() {
        bail!("cluster {} already has a spec (use --force to overwrite)", cluster);
    }

    let credentials = Credentials::Openstack(OpenstackCredentials::new(
        options.username,
        options.password,
        options.domain,
        options.tenant,
    ));

    let mut spec = CloudSpec::new(options.datacenter, credentials)
        .with_security_groups(options.security_groups);
    if let Some(network) = options.network {
        spec = spec.with_network(network);
    }
    if let Some(pool) = options.floating_ip_pool {
        spec = spec.with_floating_ip_pool(pool);
    }

    store.save(cluster, &spec).await?;
    lock.release().await?;

    println!("{} {}", "✓ Created spec for".green(), cluster.cyan());
    utils::print_spec(cluster, &spec);
    Ok(())
}
