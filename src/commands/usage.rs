use std::path::PathBuf;

use anyhow::Result;
use clap::Args;

use super::{archive::build_report, open_store};

#[derive(Args)]
pub struct UsageArgs {
    /// Print the summary as JSON
    #[arg(long)]
    pub json: bool,
}

pub fn execute(config_path: Option<PathBuf>, args: UsageArgs) -> Result<()> {
    let (config, store) = open_store(config_path)?;
    let report = build_report(&config, &store, None)?;
    let summaries = report.slot_usages();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summaries)?);
        return Ok(());
    }

    for summary in &summaries {
        println!(
            "Scope \"{}\" slot {}:",
            summary.scope.display_name(),
            summary.index
        );
        if summary.usages.is_empty() {
            println!("  (unused)");
            continue;
        }
        for usage in &summary.usages {
            println!(
                "  {} - {} visits, {} actions",
                usage.name, usage.nb_visits, usage.nb_actions
            );
        }
    }
    Ok(())
}
