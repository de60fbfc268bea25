//! Reconciliation errors

use chrono::NaiveDate;
use curfew_store::StoreError;
use thiserror::Error;

/// The date falls outside both academic terms
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("no active semester for {date}")]
pub struct NoActiveSemester {
    pub date: NaiveDate,
}

/// Reasons a run aborts. Nothing is committed in any of these cases.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error(transparent)]
    NoActiveSemester(#[from] NoActiveSemester),

    #[error("failed to fetch roster: {0}")]
    Roster(#[source] StoreError),

    #[error("failed to fetch approved stay requests: {0}")]
    StayRequests(#[source] StoreError),

    #[error("failed to fetch entry events: {0}")]
    EntryLog(#[source] StoreError),

    #[error("failed to commit penalty batch: {0}")]
    Commit(#[source] StoreError),
}

impl ReconcileError {
    /// Whether running again for the same date could succeed.
    ///
    /// A date outside the academic calendar will never have a semester, so
    /// retrying it is pointless. Collaborator failures may be transient.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ReconcileError::NoActiveSemester(_))
    }
}
