use crate::utils::Context;
use clusternet_cloud::{CloudError, CloudProvider};
use colored::Colorize;

pub async fn handle(ctx: &Context, cluster: &str, purge: bool) -> anyhow::Result<()> {
    let store = ctx.store();
    let lock = store.acquire_lock(cluster).await?;

    let mut spec = ctx.load_spec(cluster).await?;

    let result = if spec.owns_resources() {
        let provider = ctx.provider()?;
        println!("{} {}", "Cleaning up".blue(), cluster.cyan());
        let result = provider
            .clean_up(&mut spec, &store.checkpoint(cluster))
            .await;
        store.save(cluster, &spec).await?;
        result
    } else {
        println!("{}", "No created resources to delete".dimmed());
        Ok(())
    };

    if let Err(e) = result {
        lock.release().await?;
        if let CloudError::PartialCleanup { deleted, .. } = &e {
            eprintln!("{}", "Deleted before the failure:".yellow());
            for resource in deleted {
                eprintln!("  • {}", resource);
            }
        }
        return Err(e.into());
    }

    if purge {
        store.remove(cluster).await?;
        println!("{} {}", "Removed spec for".dimmed(), cluster.cyan());
    }
    lock.release().await?;

    println!("{}", "✓ Cleanup complete".green().bold());
    Ok(())
}
