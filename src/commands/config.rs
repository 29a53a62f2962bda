use std::path::PathBuf;

use anyhow::{Result, anyhow};
use clap::Args;

use customvars::config::{ConfigUpdate, load_or_default};

#[derive(Args)]
pub struct ConfigArgs {
    #[arg(long)]
    pub database_path: Option<PathBuf>,

    #[arg(long, conflicts_with = "clear_max_custom_variables")]
    pub max_custom_variables: Option<u32>,

    /// Forget the configured maximum and walk only the provisioned slots
    #[arg(long)]
    pub clear_max_custom_variables: bool,

    #[arg(long)]
    pub legacy_ecommerce_price: Option<bool>,

    #[arg(long)]
    pub conversions_enabled: Option<bool>,

    #[arg(long)]
    pub max_product_categories: Option<usize>,

    #[arg(long)]
    pub column_length: Option<u32>,
}

pub fn execute(config_path: Option<PathBuf>, args: ConfigArgs) -> Result<()> {
    let (mut config, path) = load_or_default(config_path)?;

    let ConfigArgs {
        database_path,
        max_custom_variables,
        clear_max_custom_variables,
        legacy_ecommerce_price,
        conversions_enabled,
        max_product_categories,
        column_length,
    } = args;

    let max_custom_variables = if clear_max_custom_variables {
        Some(None)
    } else {
        max_custom_variables.map(Some)
    };

    let update = ConfigUpdate {
        database_path,
        max_custom_variables,
        legacy_ecommerce_price,
        conversions_enabled,
        max_product_categories,
        column_length,
    };

    if update.is_empty() {
        println!("{}", toml::to_string_pretty(&config)?);
        return Ok(());
    }

    config.apply_update(update);
    config
        .validate()
        .map_err(|err| anyhow!("configuration not saved: {err}"))?;
    config.save(&path)?;

    tracing::info!("Configuration saved to {}", path.display());
    Ok(())
}
