//! Lorebot CLI: the main entry point.
//!
//! Commands:
//! - `run`     Connect to Discord and answer until Ctrl-C
//! - `ask`     Answer one query against the local corpus
//! - `doctor`  Check configuration and storage paths
//! - `config`  Print the default configuration

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use lorebot_config::AppConfig;

mod commands;

#[derive(Parser)]
#[command(
    name = "lorebot",
    about = "Lorebot: answers questions from a consented corpus",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (defaults to ./lorebot.toml)
    #[arg(short, long, global = true, env = "LOREBOT_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to Discord and handle events until interrupted
    Run,

    /// Answer a single query without connecting to Discord
    Ask {
        /// The question to answer
        query: String,
    },

    /// Diagnose configuration and storage
    Doctor,

    /// Print the default configuration as TOML
    Config {
        /// Print the resolved config file path instead
        #[arg(long)]
        path: bool,
    },
}

/// Load from `path`, or the default location, then fill secrets from the environment.
fn load_config(path: Option<&PathBuf>) -> anyhow::Result<AppConfig> {
    let path = path.cloned().unwrap_or_else(AppConfig::default_path);
    let mut config = AppConfig::load_from(&path)?;
    config.apply_env();
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
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
        Commands::Run => commands::run::run(load_config(cli.config.as_ref())?).await?,
        Commands::Ask { query } => {
            commands::ask::run(load_config(cli.config.as_ref())?, &query).await?
        }
        Commands::Doctor => commands::doctor::run(cli.config.as_ref()).await?,
        Commands::Config { path } => commands::config_cmd::run(cli.config.as_ref(), path),
    }

    Ok(())
}
