use std::{
    io::{self, Write},
    path::PathBuf,
};

use anyhow::{Context, Result};

use customvars::{
    SqliteStore,
    config::{Config, load_or_default},
};

pub mod archive;
pub mod config;
pub mod info;
pub mod slots;
pub mod usage;

/// Loads the configuration and opens the log database it points at.
pub(crate) fn open_store(config_path: Option<PathBuf>) -> Result<(Config, SqliteStore)> {
    let (config, path) = load_or_default(config_path)?;
    let database = config.resolved_database_path(&path);
    let store = SqliteStore::open(&database, config.store_options())
        .with_context(|| format!("failed to open log database {}", database.display()))?;
    Ok((config, store))
}

/// Asks a yes/no question on stderr; anything but `y`/`yes` declines.
pub(crate) fn confirm(question: &str) -> Result<bool> {
    eprint!("{question} (y/N) ");
    io::stderr().flush()?;
    let mut answer = String::new();
    io::stdin().read_line(&mut answer)?;
    Ok(matches!(
        answer.trim().to_ascii_lowercase().as_str(),
        "y" | "yes"
    ))
}
