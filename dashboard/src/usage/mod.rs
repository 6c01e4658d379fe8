//! Library usage log
//!
//! Records how often a project calls a method of a metered library. The
//! records are served under `/api/library-usage` next to the contract
//! dashboard.

pub mod models;
pub mod store;

pub use models::{LibraryUsage, UsageInput};
pub use store::{LibraryUsageStore, USAGE_FILE};

use beaglegaze::StorageError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum UsageError {
    #[error("Invalid usage record: {0}")]
    Invalid(String),

    #[error("LibraryUsage not found with id {0}")]
    NotFound(u64),

    #[error(transparent)]
    Storage(#[from] StorageError),
}
