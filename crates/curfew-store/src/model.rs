//! Reconciliation data model

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use curfew_util::{PenaltyId, SemesterId, StayRequestId, StudentId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A student enrolled in a semester's dormitory roster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Student {
    pub student_id: StudentId,
    pub semester: SemesterId,
}

impl Student {
    pub fn new(student_id: impl Into<StudentId>, semester: SemesterId) -> Self {
        Self {
            student_id: student_id.into(),
            semester,
        }
    }
}

/// Lifecycle of an overnight-stay request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StayStatus {
    Pending,
    Approved,
    Rejected,
    Cancelled,
}

impl StayStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StayStatus::Pending => "pending",
            StayStatus::Approved => "approved",
            StayStatus::Rejected => "rejected",
            StayStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(StayStatus::Pending),
            "approved" => Some(StayStatus::Approved),
            "rejected" => Some(StayStatus::Rejected),
            "cancelled" => Some(StayStatus::Cancelled),
            _ => None,
        }
    }
}

impl fmt::Display for StayStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An overnight-stay ("no-return") request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StayRequest {
    pub id: StayRequestId,
    pub student_id: StudentId,
    /// Night the student will be away
    pub date: NaiveDate,
    pub reason: String,
    /// Time of day the student submitted the request
    pub request_time: NaiveTime,
    pub status: StayStatus,
    pub created_at: DateTime<Utc>,
}

/// A raw badge/entry event. `timestamp` is wall-clock time in the service timezone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryEvent {
    pub student_id: StudentId,
    pub timestamp: NaiveDateTime,
}

impl EntryEvent {
    pub fn new(student_id: impl Into<StudentId>, timestamp: NaiveDateTime) -> Self {
        Self {
            student_id: student_id.into(),
            timestamp,
        }
    }
}

/// A student whose last entry of the day came after curfew
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LateEntry {
    pub student_id: StudentId,
    pub entry_time: NaiveDateTime,
}

/// Why a penalty was assessed. Each cause stays a distinct variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PenaltyReason {
    /// No entry record and no approved stay request for the night
    UnexcusedAbsence,

    /// Last entry of the day was after curfew
    LateEntry { entry_time: NaiveTime },

    /// Stay request submitted after the daily cutoff (written by the submission path)
    LateStayRequest,
}

impl PenaltyReason {
    /// Human-readable label persisted alongside the record
    pub fn label(&self) -> String {
        match self {
            PenaltyReason::UnexcusedAbsence => "unexcused overnight absence".to_string(),
            PenaltyReason::LateEntry { entry_time } => {
                format!("late entry after curfew ({})", entry_time.format("%H:%M:%S"))
            }
            PenaltyReason::LateStayRequest => "late stay request submission".to_string(),
        }
    }
}

/// Point values used when committing a night's violations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PenaltyPoints {
    pub unexcused_absence: u32,
    pub late_entry: u32,
}

impl Default for PenaltyPoints {
    fn default() -> Self {
        Self {
            unexcused_absence: 3,
            late_entry: 1,
        }
    }
}

/// A persisted, write-once penalty
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PenaltyRecord {
    pub id: PenaltyId,
    pub student_id: StudentId,
    /// Business date the penalty refers to
    pub date: NaiveDate,
    pub reason: PenaltyReason,
    pub points: u32,
    /// Assigned by the store at write time
    pub created_at: DateTime<Utc>,
}
