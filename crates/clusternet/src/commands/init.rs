use crate::utils::{self, Context};
use clusternet_cloud::CloudProvider;
use colored::Colorize;

pub async fn handle(ctx: &Context, cluster: &str) -> anyhow::Result<()> {
    let store = ctx.store();
    let lock = store.acquire_lock(cluster).await?;

    let mut spec = ctx.load_spec(cluster).await?;
    if spec.is_initialized() {
        println!("{} {}", "Nothing to do, already initialized:".dimmed(), cluster.cyan());
        lock.release().await?;
        return Ok(());
    }

    let provider = ctx.provider()?;
    println!("{} {}", "Initializing".blue(), cluster.cyan());

    let result = provider
        .initialize(&mut spec, cluster, &store.checkpoint(cluster))
        .await;

    // Keep whatever completed, even on failure
    store.save(cluster, &spec).await?;
    lock.release().await?;

    match result {
        Ok(()) => {
            println!("{}", "✓ Network infrastructure ready".green().bold());
            utils::print_spec(cluster, &spec);
            Ok(())
        }
        Err(e) => {
            if e.is_retriable() {
                eprintln!("{}", "Temporary failure, re-run init to resume".yellow());
            }
            Err(e.into())
        }
    }
}
