use std::path::PathBuf;

use anyhow::Result;
use clap::Args;

use customvars::{
    CustomVariablesArchiver, CustomVariablesReport, SlotRegistry, archiver::resolve_max_slots,
    config::Config, store::SqliteStore,
};

use super::open_store;

#[derive(Args)]
pub struct ArchiveArgs {
    /// Walk at least this many slots, overriding the configured value
    #[arg(long)]
    pub max_slots: Option<u32>,

    /// Pretty-print the JSON report
    #[arg(long)]
    pub pretty: bool,
}

pub fn execute(config_path: Option<PathBuf>, args: ArchiveArgs) -> Result<()> {
    let (config, store) = open_store(config_path)?;
    let report = build_report(&config, &store, args.max_slots)?;
    let json = if args.pretty {
        serde_json::to_string_pretty(&report)?
    } else {
        serde_json::to_string(&report)?
    };
    println!("{json}");
    Ok(())
}

/// Runs one aggregation pass with the configured options.
pub(crate) fn build_report(
    config: &Config,
    store: &SqliteStore,
    max_slots: Option<u32>,
) -> Result<CustomVariablesReport> {
    let registry = SlotRegistry::new(store);
    // Mismatches are only reported; each scope still serves what it has.
    registry.consistency()?;
    let provisioned = registry.usable_slot_count()?;
    let max_slots = resolve_max_slots(max_slots.or(config.max_custom_variables), provisioned);
    tracing::debug!(max_slots, provisioned, "aggregating custom variables");

    let archiver = CustomVariablesArchiver::new(store, config.archiver_options());
    Ok(archiver.aggregate(max_slots)?)
}
