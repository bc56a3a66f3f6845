use console::style;

use crate::cli::commands::ValidateArgs;
use crate::cli::setup;

/// Parse the config and build every configured agent, which runs each
/// agent type's own config validation.
pub async fn handle_validate(args: ValidateArgs) -> anyhow::Result<()> {
    let config = setup::load(&args.config).await?;
    let services = setup::build_services(&config)?;
    let manager = setup::build_manager(&config, services)?;

    println!("{} Configuration is valid: {}", style("✓").green(), args.config);
    for agent in manager.list_agents() {
        println!(
            "  {} {} (v{})",
            style(agent.id()).cyan(),
            agent.agent_type(),
            agent.config_version()
        );
    }
    manager.shutdown().await;
    Ok(())
}
