//! Audit event types

use chrono::{DateTime, Local, NaiveDate};
use curfew_util::SemesterId;
use serde::{Deserialize, Serialize};

/// Types of audit events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEventType {
    /// Service started
    ServiceStarted,

    /// Service stopped
    ServiceStopped,

    /// A reconciliation attempt began
    ReconciliationStarted { date: NaiveDate, attempt: u32 },

    /// A reconciliation batch was committed
    ReconciliationCommitted {
        date: NaiveDate,
        semester: SemesterId,
        enrolled: usize,
        unexcused_absences: usize,
        late_entries: usize,
    },

    /// A reconciliation attempt failed; nothing was committed
    ReconciliationFailed {
        date: NaiveDate,
        attempt: u32,
        error: String,
        will_retry: bool,
    },

    /// The date had nothing to reconcile (vacation period)
    ReconciliationSkipped { date: NaiveDate, reason: String },
}

/// Full audit event with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Unique event ID
    pub id: i64,

    /// Event timestamp
    pub timestamp: DateTime<Local>,

    /// Event type and details
    pub event: AuditEventType,
}

impl AuditEvent {
    pub fn new(event: AuditEventType) -> Self {
        Self {
            id: 0, // Will be set by store
            timestamp: curfew_util::now(),
            event,
        }
    }
}
