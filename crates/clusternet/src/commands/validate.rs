use crate::utils::Context;
use clusternet_cloud::CloudProvider;
use colored::Colorize;

pub async fn handle(ctx: &Context, cluster: &str) -> anyhow::Result<()> {
    let spec = ctx.load_spec(cluster).await?;
    let provider = ctx.provider()?;

    println!("{} {}", "Validating".blue(), cluster.cyan());
    provider.validate(&spec).await?;
    println!("{}", "✓ All referenced resources exist".green().bold());
    Ok(())
}
