//! Custom variables: slot registry, aggregation of logged visits, actions
//! and conversions into a name → value report, and slot provisioning.

pub mod archiver;
pub mod config;
pub mod error;
pub mod metrics;
pub mod provision;
pub mod reconcile;
pub mod report;
pub mod schema;
pub mod scope;
pub mod slot;
pub mod source;
pub mod store;

pub use archiver::{ArchiverOptions, CustomVariablesArchiver};
pub use error::{CustomVarsError, Result};
pub use report::CustomVariablesReport;
pub use schema::SlotRegistry;
pub use scope::Scope;
pub use store::SqliteStore;
