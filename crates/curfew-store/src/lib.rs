//! Persistence layer for curfewd
//!
//! Provides:
//! - The reconciliation data model (students, stay requests, entry events, penalties)
//! - Collaborator traits read and written by the reconciler
//! - Plumbing store trait for the surrounding services
//! - SQLite implementation with an all-or-nothing penalty batch
//! - Audit log (append-only)

mod audit;
mod model;
mod sqlite;
mod traits;

pub use audit::*;
pub use model::*;
pub use sqlite::*;
pub use traits::*;

use thiserror::Error;

/// Store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
