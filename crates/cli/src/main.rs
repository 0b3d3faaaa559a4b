//! Blockmind CLI: the main entry point.
//!
//! Commands:
//! - `run`     : Put the agent in the simulated world and talk to it
//! - `onboard` : Write a default config
//! - `commands`: Print the command docs the model sees

use std::path::PathBuf;
use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "blockmind",
    about = "Blockmind — an LLM-driven agent living in a block world",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the agent
    Run {
        /// Config file (defaults to ~/.blockmind/config.toml)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Resume the saved session
        #[arg(long)]
        load_memory: bool,

        /// Message handled on startup instead of the greeting
        #[arg(long)]
        init_message: Option<String>,

        /// Name you chat under
        #[arg(short, long, default_value = "player")]
        user: String,
    },

    /// Initialize configuration
    Onboard,

    /// List the commands available to the agent
    Commands {
        /// Config file, for blocked commands
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    match cli.command {
        Commands::Run {
            config,
            load_memory,
            init_message,
            user,
        } => {
            let code = commands::run::run(commands::run::RunArgs {
                config,
                load_memory,
                init_message,
                user,
            })
            .await?;
            std::process::exit(code);
        }
        Commands::Onboard => commands::onboard::run().await?,
        Commands::Commands { config } => commands::list::run(config).await?,
    }

    Ok(())
}
