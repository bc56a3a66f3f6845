use clap::Parser;
use gitmentor::cli::{self, Cli, Commands};
use gitmentor::errors::AgentError;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_level = match (cli.quiet, cli.verbose) {
        (true, _) => "warn",
        (false, 0) => "info",
        (false, 1) => "debug",
        _ => "trace",
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level));

    if cli.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_ansi(!cli.no_color)
            .with_writer(std::io::stderr)
            .init();
    }

    if cli.no_color {
        console::set_colors_enabled(false);
    }

    let result = match cli.command {
        Commands::Run(args) => cli::run::handle_run(args, cli.quiet).await,
        Commands::Validate(args) => cli::validate::handle_validate(args).await,
        Commands::Agents(args) => cli::agents::handle_agents(args).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        let exit_code = match e.downcast_ref::<AgentError>() {
            Some(AgentError::Config(_)) | Some(AgentError::ConfigValidation(_)) => 2,
            Some(AgentError::Authentication(_)) => 4,
            Some(AgentError::UnknownAgentType(_)) => 5,
            _ => 1,
        };
        std::process::exit(exit_code);
    }
}
