//! Penalty decision engine
//!
//! Classification is a pure function of the roster, the exemptions, each
//! student's last entry and the curfew instant. The first matching rule wins:
//!
//! 1. approved stay request → compliant (exempt)
//! 2. no entry that day → unexcused absence
//! 3. last entry strictly after curfew → late entry
//! 4. otherwise → compliant (on time)

use chrono::NaiveDateTime;
use curfew_store::{LateEntry, Student};
use curfew_util::StudentId;
use std::collections::{HashMap, HashSet};

/// Why a student owes nothing for the night
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compliance {
    /// Covered by an approved stay request
    Exempt,
    /// Last entry at or before curfew
    OnTime,
}

/// Outcome for a single student
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Compliant(Compliance),
    UnexcusedAbsence,
    LateEntry { entry_time: NaiveDateTime },
}

impl Classification {
    pub fn is_violation(&self) -> bool {
        !matches!(self, Classification::Compliant(_))
    }
}

/// Classify one student
pub fn classify(
    student_id: &StudentId,
    exemptions: &HashSet<StudentId>,
    latest: &HashMap<StudentId, NaiveDateTime>,
    curfew: NaiveDateTime,
) -> Classification {
    if exemptions.contains(student_id) {
        return Classification::Compliant(Compliance::Exempt);
    }

    match latest.get(student_id) {
        None => Classification::UnexcusedAbsence,
        Some(&entry_time) if entry_time > curfew => Classification::LateEntry { entry_time },
        Some(_) => Classification::Compliant(Compliance::OnTime),
    }
}

/// A night's violations, each list in roster order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Decision {
    pub unexcused_absences: Vec<StudentId>,
    pub late_entries: Vec<LateEntry>,
    pub compliant: Vec<StudentId>,
}

impl Decision {
    pub fn violation_count(&self) -> usize {
        self.unexcused_absences.len() + self.late_entries.len()
    }
}

/// Classify every enrolled student. Each student lands in exactly one list.
pub fn decide(
    roster: &[Student],
    exemptions: &HashSet<StudentId>,
    latest: &HashMap<StudentId, NaiveDateTime>,
    curfew: NaiveDateTime,
) -> Decision {
    roster.iter().fold(Decision::default(), |mut decision, student| {
        let student_id = student.student_id.clone();
        match classify(&student_id, exemptions, latest, curfew) {
            Classification::Compliant(_) => decision.compliant.push(student_id),
            Classification::UnexcusedAbsence => decision.unexcused_absences.push(student_id),
            Classification::LateEntry { entry_time } => decision.late_entries.push(LateEntry {
                student_id,
                entry_time,
            }),
        }
        decision
    })
}
