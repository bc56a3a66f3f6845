use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "gitmentor", version, about = "Multi-agent commit analysis with quality review")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase log verbosity (repeat for more)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Analyze and review a batch of commits
    Run(RunArgs),
    /// Validate a configuration file and its agent configs
    Validate(ValidateArgs),
    /// Create the configured agents and report their status
    Agents(AgentsArgs),
}

#[derive(Args, Clone)]
pub struct RunArgs {
    /// YAML configuration file
    #[arg(short, long)]
    pub config: String,

    /// JSON file with a list of commits (or `{"commits": [...]}`)
    #[arg(short, long)]
    pub input: String,

    /// Print the full results as JSON instead of one line per commit
    #[arg(long)]
    pub json: bool,

    /// Maximum number of commits in flight at once
    #[arg(long, default_value_t = 4)]
    pub concurrency: usize,
}

#[derive(Args, Clone)]
pub struct ValidateArgs {
    /// Config file to validate
    pub config: String,
}

#[derive(Args, Clone)]
pub struct AgentsArgs {
    /// YAML configuration file
    #[arg(short, long)]
    pub config: String,

    /// Skip the health checks
    #[arg(long)]
    pub no_health: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run_command() {
        let cli = Cli::parse_from(["gitmentor", "-vv", "run", "-c", "g.yaml", "-i", "commits.json"]);
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.config, "g.yaml");
                assert_eq!(args.input, "commits.json");
                assert_eq!(args.concurrency, 4);
                assert!(!args.json);
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn test_parse_validate_command() {
        let cli = Cli::parse_from(["gitmentor", "--log-json", "validate", "g.yaml"]);
        assert!(cli.log_json);
        assert!(matches!(cli.command, Commands::Validate(ValidateArgs { ref config }) if config == "g.yaml"));
    }
}
