mod commands;
mod logging;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::commands::{
    archive::ArchiveArgs,
    config::ConfigArgs,
    slots::{SetMaxArgs, UninstallArgs},
    usage::UsageArgs,
};

#[derive(Parser)]
#[command(author, version, about = "Custom variables aggregation and slot management")]
struct Cli {
    /// Path to the configuration file. Defaults to ./.cvars/config.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Get info about configured custom variables
    Info,
    /// Change the number of available custom variables
    #[command(name = "set-max-custom-variables")]
    SetMaxCustomVariables(SetMaxArgs),
    /// Make sure every scope has the default five custom variables
    Install,
    /// Remove every custom variable column
    Uninstall(UninstallArgs),
    /// Aggregate the logged custom variables and print the report as JSON
    Archive(ArchiveArgs),
    /// Show which variable names use which slot
    Usage(UsageArgs),
    /// Update the persisted configuration
    Config(ConfigArgs),
}

fn main() -> Result<()> {
    logging::init()?;

    let Cli { config, command } = Cli::parse();

    match command {
        Commands::Info => commands::info::execute(config)?,
        Commands::SetMaxCustomVariables(args) => commands::slots::set_max(config, args)?,
        Commands::Install => commands::slots::install(config)?,
        Commands::Uninstall(args) => commands::slots::uninstall(config, args)?,
        Commands::Archive(args) => commands::archive::execute(config, args)?,
        Commands::Usage(args) => commands::usage::execute(config, args)?,
        Commands::Config(args) => commands::config::execute(config, args)?,
    }

    Ok(())
}
