use serde_json::json;

use crate::cli::commands::AgentsArgs;
use crate::cli::setup;

pub async fn handle_agents(args: AgentsArgs) -> anyhow::Result<()> {
    let config = setup::load(&args.config).await?;
    let services = setup::build_services(&config)?;
    let manager = setup::build_manager(&config, services)?;

    let health = if args.no_health {
        None
    } else {
        Some(manager.health_check_all().await)
    };

    let out = json!({
        "agents": manager.get_all_status(),
        "health": health,
        "system": manager.get_system_metrics(),
    });
    println!("{}", serde_json::to_string_pretty(&out)?);

    manager.shutdown().await;
    Ok(())
}
