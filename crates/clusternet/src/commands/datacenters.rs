use crate::utils;
use colored::Colorize;

pub fn handle() -> anyhow::Result<()> {
    let registry = utils::load_registry()?;

    if registry.is_empty() {
        println!("{}", "No datacenters configured".yellow());
        return Ok(());
    }

    println!("{}", "Datacenters:".bold());
    for (name, dc) in registry.iter() {
        let backend = match &dc.spec.openstack {
            Some(os) => format!("openstack, region {}", os.region),
            None => "no backend".dimmed().to_string(),
        };
        println!(
            "  {} {} ({}) [{}]",
            "•".cyan(),
            name.cyan().bold(),
            dc.location,
            backend
        );
    }

    Ok(())
}
