use super::Context;
use colored::Colorize;
use influx_provider_core::ResourceStatus;

pub async fn list(ctx: &Context) -> anyhow::Result<()> {
    let state = ctx.state.load().await?;

    if state.resources.is_empty() {
        println!("{}", "No managed resources".dimmed());
        return Ok(());
    }

    println!(
        "{}",
        format!("{:<40} {:<20} {:<18} {}", "RESOURCE", "ID", "STATUS", "UPDATED").bold()
    );
    println!("{}", "─".repeat(100).dimmed());

    for (key, resource) in &state.resources {
        let status = resource.status.to_string();
        let status = match resource.status {
            ResourceStatus::Present => status.green(),
            ResourceStatus::Tainted => status.yellow(),
            ResourceStatus::PartiallyDeleted => status.red(),
        };
        println!(
            "{:<40} {:<20} {:<18} {}",
            key,
            resource.id,
            status,
            resource.updated_at.format("%Y-%m-%d %H:%M:%S")
        );
    }

    Ok(())
}
