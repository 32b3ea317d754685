mod commands;
mod utils;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "clusternet")]
#[command(about = "Cluster network infrastructure on OpenStack", long_about = None)]
struct Cli {
    /// Project directory holding .clusternet/
    #[arg(long, global = true, env = "CLUSTERNET_ROOT", default_value = ".")]
    root: PathBuf,

    /// Deadline in seconds for each cloud API call
    #[arg(long, global = true, default_value_t = 60)]
    timeout: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the configured datacenters
    Datacenters,
    /// List clusters with a saved spec
    List,
    /// Write a new cloud spec for a cluster
    Create {
        /// Cluster name
        cluster: String,
        /// Datacenter from the registry
        #[arg(long)]
        datacenter: String,
        #[arg(long, env = "OS_USERNAME")]
        username: String,
        #[arg(long, env = "OS_PASSWORD", hide_env_values = true)]
        password: String,
        #[arg(long, env = "OS_USER_DOMAIN_NAME", default_value = "Default")]
        domain: String,
        /// Project the resources are created in
        #[arg(long, env = "OS_PROJECT_NAME")]
        tenant: String,
        /// Existing network to use instead of creating one
        #[arg(long)]
        network: Option<String>,
        /// Existing security group (repeatable)
        #[arg(long = "security-group")]
        security_groups: Vec<String>,
        /// External network to allocate floating IPs from
        #[arg(long)]
        floating_ip_pool: Option<String>,
        /// Overwrite an existing spec
        #[arg(short, long)]
        force: bool,
    },
    /// Show a cluster's spec
    Show {
        cluster: String,
    },
    /// Check that every referenced resource exists
    Validate {
        cluster: String,
    },
    /// Create the missing network infrastructure
    Init {
        cluster: String,
    },
    /// Delete the infrastructure created by init
    Cleanup {
        cluster: String,
        /// Remove the spec file once nothing is owned anymore
        #[arg(long)]
        purge: bool,
    },
    /// Print a fresh node class name
    NodeClassName,
    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let ctx = utils::Context::new(cli.root, cli.timeout);

    match cli.command {
        Commands::Version => {
            println!("clusternet {}", env!("CARGO_PKG_VERSION"));
        }
        Commands::NodeClassName => {
            commands::node_class::handle();
        }
        Commands::Datacenters => {
            commands::datacenters::handle()?;
        }
        Commands::List => {
            commands::show::handle_list(&ctx).await?;
        }
        Commands::Create {
            cluster,
            datacenter,
            username,
            password,
            domain,
            tenant,
            network,
            security_groups,
            floating_ip_pool,
            force,
        } => {
            let options = commands::create::CreateOptions {
                datacenter,
                username,
                password,
                domain,
                tenant,
                network,
                security_groups,
                floating_ip_pool,
                force,
            };
            commands::create::handle(&ctx, &cluster, options).await?;
        }
        Commands::Show { cluster } => {
            commands::show::handle(&ctx, &cluster).await?;
        }
        Commands::Validate { cluster } => {
            commands::validate::handle(&ctx, &cluster).await?;
        }
        Commands::Init { cluster } => {
            commands::init::handle(&ctx, &cluster).await?;
        }
        Commands::Cleanup { cluster, purge } => {
            commands::cleanup::handle(&ctx, &cluster, purge).await?;
        }
    }

    Ok(())
}
