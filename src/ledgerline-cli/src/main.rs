//! Ledgerline operator CLI.
//!
//! Manages the platform's installed plugins against the configured plugin
//! repository. Booting plugin code is left to the server process; `enable`
//! here only records the transition.

mod plugin_cmd;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use ledgerline_plugins::PluginConfig;

use crate::plugin_cmd::PluginSubcommand;

/// Ledgerline plugin management.
#[derive(Debug, Parser)]
#[command(name = "ledgerline", version, about)]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(long, short = 'c', global = true, env = "LEDGERLINE_CONFIG")]
    config: Option<PathBuf>,

    /// Override the plugins directory
    #[arg(long, global = true)]
    plugins_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: PluginSubcommand,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut config = load_config(cli.config.as_deref())?;
    if let Some(dir) = cli.plugins_dir {
        config.plugins_dir = dir;
    }
    tracing::debug!(
        plugins_dir = %config.plugins_dir.display(),
        repository = %config.repository_path.display(),
        sandbox = config.sandbox_enabled,
        "Configuration loaded"
    );

    cli.command.run(config).await
}

fn load_config(path: Option<&Path>) -> Result<PluginConfig> {
    let config = match path {
        Some(path) => PluginConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => PluginConfig::default(),
    };
    Ok(config.with_env_overrides())
}
