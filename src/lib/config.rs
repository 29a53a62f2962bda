use std::{
    env, fs,
    path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{
    archiver::{ArchiverOptions, DEFAULT_MAX_PRODUCT_CATEGORIES},
    error::{CustomVarsError, Result},
    store::{DEFAULT_COLUMN_LENGTH, StoreOptions},
};

pub const CONFIG_DIR: &str = ".cvars";
pub const CONFIG_FILE: &str = "config.toml";
pub const DEFAULT_DATABASE_FILE: &str = "logs.db";

fn default_database_path() -> PathBuf {
    PathBuf::from(DEFAULT_DATABASE_FILE)
}

fn default_bool_true() -> bool {
    true
}

fn default_max_product_categories() -> usize {
    DEFAULT_MAX_PRODUCT_CATEGORIES
}

fn default_column_length() -> u32 {
    DEFAULT_COLUMN_LENGTH
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Relative paths resolve against the directory holding the config file.
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
    /// Slot count the archiver walks at least, even when fewer are provisioned.
    #[serde(default)]
    pub max_custom_variables: Option<u32>,
    #[serde(default)]
    pub legacy_ecommerce_price: bool,
    #[serde(default = "default_bool_true")]
    pub conversions_enabled: bool,
    #[serde(default = "default_max_product_categories")]
    pub max_product_categories: usize,
    #[serde(default = "default_column_length")]
    pub column_length: u32,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl Default for Config {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            database_path: default_database_path(),
            max_custom_variables: None,
            legacy_ecommerce_price: false,
            conversions_enabled: true,
            max_product_categories: DEFAULT_MAX_PRODUCT_CATEGORIES,
            column_length: DEFAULT_COLUMN_LENGTH,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConfigUpdate {
    pub database_path: Option<PathBuf>,
    pub max_custom_variables: Option<Option<u32>>,
    pub legacy_ecommerce_price: Option<bool>,
    pub conversions_enabled: Option<bool>,
    pub max_product_categories: Option<usize>,
    pub column_length: Option<u32>,
}

impl ConfigUpdate {
    pub fn is_empty(&self) -> bool {
        self.database_path.is_none()
            && self.max_custom_variables.is_none()
            && self.legacy_ecommerce_price.is_none()
            && self.conversions_enabled.is_none()
            && self.max_product_categories.is_none()
            && self.column_length.is_none()
    }
}

pub fn default_config_path() -> Result<PathBuf> {
    env::current_dir()
        .map(|dir| dir.join(CONFIG_DIR).join(CONFIG_FILE))
        .map_err(|err| CustomVarsError::Config(err.to_string()))
}

/// Loads the config at `path` (or the default location), writing a fresh
/// default file when none exists yet.
pub fn load_or_default(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let config_path = match path {
        Some(path) => path,
        None => default_config_path()?,
    };
    if let Some(parent) = config_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    if config_path.exists() {
        let contents = fs::read_to_string(&config_path)?;
        let cfg: Config = toml::from_str(&contents)?;
        cfg.validate()?;
        Ok((cfg, config_path))
    } else {
        let cfg = Config::default();
        cfg.save(&config_path)?;
        Ok((cfg, config_path))
    }
}

impl Config {
    pub fn save(&self, path: &Path) -> Result<()> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_product_categories == 0 {
            return Err(CustomVarsError::Config(
                "max_product_categories must be at least 1".to_string(),
            ));
        }
        if self.column_length == 0 {
            return Err(CustomVarsError::Config(
                "column_length must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn apply_update(&mut self, update: ConfigUpdate) {
        if let Some(path) = update.database_path {
            self.database_path = path;
        }
        if let Some(max) = update.max_custom_variables {
            self.max_custom_variables = max;
        }
        if let Some(legacy) = update.legacy_ecommerce_price {
            self.legacy_ecommerce_price = legacy;
        }
        if let Some(enabled) = update.conversions_enabled {
            self.conversions_enabled = enabled;
        }
        if let Some(max) = update.max_product_categories {
            self.max_product_categories = max;
        }
        if let Some(length) = update.column_length {
            self.column_length = length;
        }
        self.updated_at = Utc::now();
    }

    pub fn resolved_database_path(&self, config_path: &Path) -> PathBuf {
        if self.database_path.is_absolute() {
            return self.database_path.clone();
        }
        match config_path.parent() {
            Some(parent) => parent.join(&self.database_path),
            None => self.database_path.clone(),
        }
    }

    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            column_length: self.column_length,
            conversions_enabled: self.conversions_enabled,
        }
    }

    pub fn archiver_options(&self) -> ArchiverOptions {
        ArchiverOptions {
            legacy_ecommerce_price: self.legacy_ecommerce_price,
            max_product_categories: self.max_product_categories,
        }
    }
}
