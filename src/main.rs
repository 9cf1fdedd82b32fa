//! Loam - typed content collections from markdown, block documents and data files.

mod articles;
mod build;
mod cli;
mod collection;
mod config;
mod content;
mod error;
mod init;
mod schema;
mod serve;
mod utils;
mod watch;

use anyhow::{Result, bail};
use build::{Builder, build_site};
use clap::Parser;
use cli::{Cli, Commands};
use config::LoamConfig;
use init::new_site;
use serve::serve_site;
use std::{path::Path, sync::Arc};
use watch::watch_for_changes_blocking;

fn main() -> Result<()> {
    let cli: &'static Cli = Box::leak(Box::new(Cli::parse()));
    let config: &'static LoamConfig = Box::leak(Box::new(load_config(cli)?));
    let builder = Arc::new(Builder::new());

    match &cli.command {
        Commands::Init { name } => new_site(config, name.is_some()),
        Commands::Build { watch, .. } => {
            if *watch {
                // Keep watching after a failed first pass; fixing content rebuilds
                if let Err(err) = build_site(config, &builder) {
                    log!("error"; "{err:#}");
                }
                watch_for_changes_blocking(config, &builder)
            } else {
                build_site(config, &builder).map(|_| ())
            }
        }
        Commands::Serve { .. } => {
            if let Err(err) = build_site(config, &builder) {
                log!("error"; "{err:#}");
            }
            serve_site(config, builder)
        }
    }
}

/// Load and validate configuration from CLI arguments
fn load_config(cli: &'static Cli) -> Result<LoamConfig> {
    let root = cli.root.as_deref().unwrap_or(Path::new("./"));
    let config_path = root.join(&cli.config);

    let mut config = if config_path.exists() {
        LoamConfig::from_path(&config_path)?
    } else {
        LoamConfig::default()
    };
    config.update_with_cli(cli);

    // Validate config state based on command
    let config_exists = config.config_path.exists();
    match (cli.is_init(), config_exists) {
        (true, true) => {
            bail!("Config file already exists. Remove it manually or init in a different path.")
        }
        (false, false) => bail!("Config file not found."),
        _ => {}
    }

    if !cli.is_init() {
        config.validate()?;
    }

    Ok(config)
}
