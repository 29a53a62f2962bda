use std::io;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CustomVarsError>;

#[derive(Debug, Error)]
pub enum CustomVarsError {
    #[error("invalid custom variable scope: {0}")]
    InvalidScope(String),
    #[error("invalid number of custom variables: {0}")]
    InvalidSlotCount(String),
    #[error("custom variable columns differ across scopes: {details}")]
    SchemaInconsistency { details: String },
    #[error("configuration error: {0}")]
    Config(String),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<rusqlite::Error> for CustomVarsError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<toml::de::Error> for CustomVarsError {
    fn from(err: toml::de::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<toml::ser::Error> for CustomVarsError {
    fn from(err: toml::ser::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for CustomVarsError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
