use crate::utils::{self, Context};
use colored::Colorize;

pub async fn handle(ctx: &Context, cluster: &str) -> anyhow::Result<()> {
    let spec = ctx.load_spec(cluster).await?;
    utils::print_spec(cluster, &spec);
    Ok(())
}

pub async fn handle_list(ctx: &Context) -> anyhow::Result<()> {
    let clusters = ctx.store().list().await?;
    if clusters.is_empty() {
        println!("{}", "No clusters".yellow());
        return Ok(());
    }

    for cluster in clusters {
        println!("{}", cluster);
    }
    Ok(())
}
