use std::path::PathBuf;

use anyhow::Result;

use customvars::{Scope, SlotRegistry};

use super::open_store;

pub fn execute(config_path: Option<PathBuf>) -> Result<()> {
    let (_, store) = open_store(config_path)?;
    let registry = SlotRegistry::new(&store);
    let max_vars = registry.usable_slot_count()?;
    let consistency = registry.consistency()?;

    if consistency.is_consistent() {
        println!("Your installation is configured for {max_vars} custom variables.");
        return Ok(());
    }

    println!("There is a problem with your custom variables configuration:");
    println!("Some database tables miss custom variables columns.");
    println!();
    println!("Your installation seems to be configured for {max_vars} custom variables.");
    println!("Executing \"cvars set-max-custom-variables {max_vars}\" might fix this issue.");
    println!(
        "If not check the following tables whether they have the same columns starting with custom_var_:"
    );
    for scope in Scope::ALL {
        println!("{}", scope.table_name());
    }
    println!();
    println!("Slot indexes found: {}", consistency.describe());
    Ok(())
}
