use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod setup;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to a schema snapshot, overrides DB_SNAPSHOT
    #[arg(long, global = true)]
    snapshot: Option<std::path::PathBuf>,

    /// Maximum model round trips per message, overrides AGENT_MAX_ITERATIONS
    #[arg(long, global = true)]
    max_iterations: Option<usize>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Send a single message and print the result
    Ask {
        /// The message to send
        message: String,

        /// Print the full run result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Start an interactive session
    Chat,

    /// Print the schemas of the registered tools
    Tools,

    /// Show the resolved configuration with secrets redacted
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let overrides = setup::Overrides {
        snapshot: cli.snapshot,
        max_iterations: cli.max_iterations,
    };

    match cli.command {
        Command::Ask { message, json } => commands::ask::execute(&overrides, &message, json).await,
        Command::Chat => commands::chat::execute(&overrides).await,
        Command::Tools => commands::tools::execute(&overrides),
        Command::CheckConfig => commands::check_config::execute(&overrides),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_ask_with_overrides() {
        let cli = Cli::parse_from([
            "codegen-agent",
            "ask",
            "list the tables",
            "--max-iterations",
            "3",
            "--json",
        ]);
        assert_eq!(cli.max_iterations, Some(3));
        match cli.command {
            Command::Ask { message, json } => {
                assert_eq!(message, "list the tables");
                assert!(json);
            }
            _ => panic!("expected the ask command"),
        }
    }

    #[test]
    fn test_parse_check_config() {
        let cli = Cli::parse_from(["codegen-agent", "check-config"]);
        assert!(matches!(cli.command, Command::CheckConfig));
        assert!(cli.snapshot.is_none());
    }
}
