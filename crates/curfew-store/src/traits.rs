//! Store trait definitions
//!
//! The four collaborator traits are what the reconciler reads from and
//! writes to; they are async so the three reads can run concurrently
//! against backends that support it. `Store` covers the surrounding
//! plumbing (roster upkeep, request/entry intake, reporting, audit).

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use curfew_util::{SemesterId, StayRequestId, StudentId};
use std::collections::HashSet;

use crate::{
    AuditEvent, EntryEvent, LateEntry, PenaltyPoints, PenaltyReason, PenaltyRecord, StayRequest,
    StayStatus, Student, StoreResult,
};

/// Students enrolled in a semester
#[async_trait]
pub trait RosterSource: Send + Sync {
    async fn fetch_enrolled_students(&self, semester: &SemesterId) -> StoreResult<Vec<Student>>;
}

/// Students holding an approved stay exemption
#[async_trait]
pub trait StayRequestSource: Send + Sync {
    /// IDs of students with an `approved` stay request for `date`
    async fn fetch_approved_stay_requests(&self, date: NaiveDate)
        -> StoreResult<HashSet<StudentId>>;
}

/// Raw entry events
#[async_trait]
pub trait EntryLogSource: Send + Sync {
    /// All entry events whose timestamp falls on `date`, in no particular order
    async fn fetch_entry_events(&self, date: NaiveDate) -> StoreResult<Vec<EntryEvent>>;
}

/// Destination for a night's violations
#[async_trait]
pub trait PenaltySink: Send + Sync {
    /// Persist one record per violation as a single atomic batch.
    ///
    /// Either every record is visible afterwards or none is. Each record gets
    /// a fresh id; all share one store-assigned `created_at`.
    async fn commit_penalty_batch(
        &self,
        date: NaiveDate,
        unexcused_absences: &[StudentId],
        late_entries: &[LateEntry],
        points: PenaltyPoints,
    ) -> StoreResult<Vec<PenaltyRecord>>;
}

/// Main store trait
pub trait Store: Send + Sync {
    // Audit log

    /// Append an audit event
    fn append_audit(&self, event: AuditEvent) -> StoreResult<()>;

    /// Get recent audit events, newest first
    fn get_recent_audits(&self, limit: usize) -> StoreResult<Vec<AuditEvent>>;

    // Roster

    /// Enroll a student for their semester (no-op if already enrolled)
    fn enroll_student(&self, student: &Student) -> StoreResult<()>;

    // Stay requests

    /// Record a new stay request in `pending` state
    fn submit_stay_request(
        &self,
        student_id: &StudentId,
        date: NaiveDate,
        reason: &str,
        request_time: NaiveTime,
    ) -> StoreResult<StayRequest>;

    /// Change a request's status
    fn update_stay_status(&self, id: &StayRequestId, status: StayStatus) -> StoreResult<()>;

    /// A student's requests, newest date first
    fn stay_requests_for_student(&self, student_id: &StudentId) -> StoreResult<Vec<StayRequest>>;

    // Entry log

    /// Append an entry event
    fn record_entry(&self, event: &EntryEvent) -> StoreResult<()>;

    // Penalties

    /// Write a single penalty outside the nightly batch
    fn record_penalty(
        &self,
        student_id: &StudentId,
        date: NaiveDate,
        reason: PenaltyReason,
        points: u32,
    ) -> StoreResult<PenaltyRecord>;

    /// A student's penalties, newest date first
    fn penalties_for_student(&self, student_id: &StudentId) -> StoreResult<Vec<PenaltyRecord>>;

    /// Every penalty for a business date
    fn penalties_for_date(&self, date: NaiveDate) -> StoreResult<Vec<PenaltyRecord>>;

    // Health

    /// Check if store is healthy
    fn is_healthy(&self) -> bool;
}
