//! Command line inspector for sorcery configuration.
//!
//! Provides commands for:
//! - Dumping config file sections as object sets or JSON
//! - Diffing two versions of a config file
//! - Listing the backend chains of a mapping file

mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};
use sorcery_core::{Registry, RegistryConfig};
use tracing::Level;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    let output = match cli.command {
        Commands::Dump {
            file,
            section,
            criteria,
            json,
        } => commands::dump(&file, section.as_deref(), &criteria, json)?,
        Commands::Diff { old, new, json } => commands::diff(&old, &new, json)?,
        Commands::Mappings { file, section } => {
            let registry = Registry::new(RegistryConfig::default());
            sorcery_backends::register_all(&registry)?;
            commands::mappings(&file, section.as_deref(), &registry)?
        }
    };
    print!("{}", output);
    Ok(())
}
