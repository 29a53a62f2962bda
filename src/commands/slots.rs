use std::path::PathBuf;

use anyhow::{Result, anyhow};
use clap::Args;

use customvars::{
    SlotRegistry,
    provision::{
        SlotChangeKind, apply_plan, install_default_slots, plan_slot_changes, remove_all_slots,
        validate_target,
    },
};

use super::{confirm, open_store};

#[derive(Args)]
pub struct SetMaxArgs {
    /// Number of custom variables every scope should provide
    pub max_custom_vars: String,

    /// Apply the changes without asking for confirmation
    #[arg(long, short = 'y')]
    pub yes: bool,
}

#[derive(Args)]
pub struct UninstallArgs {
    /// Drop the columns without asking for confirmation
    #[arg(long, short = 'y')]
    pub yes: bool,
}

pub fn set_max(config_path: Option<PathBuf>, args: SetMaxArgs) -> Result<()> {
    let target = parse_target(&args.max_custom_vars)?;
    let (_, store) = open_store(config_path)?;
    let registry = SlotRegistry::new(&store);
    let plan = plan_slot_changes(&registry, target)?;

    if plan.is_noop() {
        println!("Your installation is already configured for {target} custom variables.");
        return Ok(());
    }

    println!();
    println!("Configuring for {target} custom variables");
    for scope_plan in &plan.scopes {
        println!();
        println!("Scope \"{}\"", scope_plan.scope.display_name());
        match scope_plan.describe() {
            Some(line) => {
                println!("{line}");
                if scope_plan.kind == Some(SlotChangeKind::Remove) {
                    println!("This is an irreversible change");
                }
            }
            None => println!("Nothing to change"),
        }
    }

    if !args.yes {
        println!();
        if !confirm("Are you sure you want to perform these actions?")? {
            println!("No changes applied.");
            return Ok(());
        }
    }

    println!();
    println!("Starting to apply changes");
    println!();

    let outcome = apply_plan(&store, &plan, |change| {
        let verb = match change.kind {
            SlotChangeKind::Add => "Added",
            SlotChangeKind::Remove => "Removed",
        };
        println!(
            "  {verb} a variable in scope \"{}\" having the index {}",
            change.scope.display_name(),
            change.index
        );
    });

    if !outcome.is_success() {
        for failure in &outcome.failed {
            eprintln!(
                "  Failed to change a variable in scope \"{}\": {}",
                failure.scope.display_name(),
                failure.message
            );
        }
        return Err(anyhow!(
            "{} of {} changes failed",
            outcome.failed.len(),
            plan.total_changes()
        ));
    }

    println!();
    println!("Your installation is now configured for {target} custom variables.");
    Ok(())
}

pub fn install(config_path: Option<PathBuf>) -> Result<()> {
    let (_, store) = open_store(config_path)?;
    let outcome = install_default_slots(&SlotRegistry::new(&store), &store);
    for change in &outcome.applied {
        println!(
            "  Added a variable in scope \"{}\" having the index {}",
            change.scope.display_name(),
            change.index
        );
    }
    if !outcome.is_success() {
        return Err(anyhow!(
            "failed to install custom variables in {} scope(s)",
            outcome.failed.len()
        ));
    }
    println!("Custom variables installed.");
    Ok(())
}

pub fn uninstall(config_path: Option<PathBuf>, args: UninstallArgs) -> Result<()> {
    let (_, store) = open_store(config_path)?;
    if !args.yes
        && !confirm("All custom variable columns and their data will be dropped. Continue?")?
    {
        println!("Uninstall cancelled.");
        return Ok(());
    }
    let removed = remove_all_slots(&store)?;
    println!("Removed {} custom variable slot(s).", removed.len());
    Ok(())
}

fn parse_target(raw: &str) -> Result<u32> {
    let target: u32 = raw
        .trim()
        .parse()
        .map_err(|_| anyhow!("The number of available custom variables has to be a number"))?;
    validate_target(target).map_err(|_| anyhow!("There has to be at least five custom variables"))
}
