use anyhow::Context as _;
use clusternet_cloud::{CloudSpec, ProviderOptions, SpecStore};
use clusternet_cloud_openstack::{OpenstackProvider, openstack_provider};
use clusternet_config::DatacenterRegistry;
use colored::Colorize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Settings shared by every subcommand
pub struct Context {
    root: PathBuf,
    timeout: Duration,
}

impl Context {
    pub fn new(root: PathBuf, timeout_secs: u64) -> Self {
        Self {
            root,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    pub fn store(&self) -> SpecStore {
        SpecStore::new(&self.root)
    }

    pub fn provider(&self) -> anyhow::Result<OpenstackProvider> {
        let registry = load_registry()?;
        Ok(openstack_provider(
            Arc::new(registry),
            ProviderOptions {
                call_timeout: self.timeout,
            },
        ))
    }

    /// Load a cluster's spec, failing when it was never created
    pub async fn load_spec(&self, cluster: &str) -> anyhow::Result<CloudSpec> {
        self.store()
            .load(cluster)
            .await?
            .with_context(|| {
                format!(
                    "no spec for cluster {}; run `clusternet create {}` first",
                    cluster, cluster
                )
            })
    }
}

pub fn load_registry() -> anyhow::Result<DatacenterRegistry> {
    let path = clusternet_config::find_datacenters_file()?;
    tracing::debug!(path = %path.display(), "Loading datacenters");
    Ok(DatacenterRegistry::load(&path)?)
}

/// Print the spec without credentials
pub fn print_spec(cluster: &str, spec: &CloudSpec) {
    let unset = || "(unset)".dimmed().to_string();
    let owned = |created: bool| {
        if created {
            "created".yellow().to_string()
        } else {
            "external".dimmed().to_string()
        }
    };

    println!("{} {}", "Cluster:".bold(), cluster.cyan());
    println!("  datacenter:       {}", spec.datacenter_name());
    println!(
        "  network:          {} [{}]",
        spec.network().map(str::to_string).unwrap_or_else(unset),
        owned(spec.network_created())
    );
    println!(
        "  subnet:           {}",
        spec.subnet_id().map(str::to_string).unwrap_or_else(unset)
    );
    println!(
        "  router:           {}",
        spec.router_id().map(str::to_string).unwrap_or_else(unset)
    );
    let groups = if spec.security_groups().is_empty() {
        unset()
    } else {
        spec.security_groups()
            .iter()
            .cloned()
            .collect::<Vec<_>>()
            .join(", ")
    };
    println!(
        "  security groups:  {} [{}]",
        groups,
        owned(spec.security_group_created())
    );
    println!(
        "  floating ip pool: {}",
        spec.floating_ip_pool().map(str::to_string).unwrap_or_else(unset)
    );

    let status = if spec.is_initialized() {
        "initialized".green()
    } else {
        "not initialized".yellow()
    };
    println!("  status:           {}", status);
}
