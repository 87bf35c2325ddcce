use clap::{Parser, Subcommand};

use std::path::PathBuf;

use super::constants::{ENV_API_KEYS, ENV_CONFIG, ENV_HOST, ENV_PORT};

#[derive(Parser)]
#[command(name = "fanout")]
#[command(version, about = "In-memory pub/sub broker over WebSocket", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Server host address
    #[arg(long, short = 'H', global = true, env = ENV_HOST)]
    pub host: Option<String>,

    /// Server port
    #[arg(long, short = 'p', global = true, env = ENV_PORT)]
    pub port: Option<u16>,

    /// Path to config file
    #[arg(long, short = 'c', global = true, env = ENV_CONFIG)]
    pub config: Option<PathBuf>,

    /// Admitted API keys (comma-separated; replaces the default allow-list)
    #[arg(long, global = true, env = ENV_API_KEYS, value_delimiter = ',')]
    pub api_keys: Option<Vec<String>>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the broker (the default when no subcommand is given)
    Start,
}

/// CLI configuration extracted from parsed arguments
pub struct CliConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub config: Option<PathBuf>,
    pub api_keys: Option<Vec<String>>,
}

/// Parse command line arguments
pub fn parse() -> (CliConfig, Option<Commands>) {
    let cli = Cli::parse();

    let config = CliConfig {
        host: cli.host,
        port: cli.port,
        config: cli.config,
        api_keys: cli.api_keys,
    };
    (config, cli.command)
}
