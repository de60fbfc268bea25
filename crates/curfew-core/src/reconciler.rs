//! Run orchestration

use chrono::NaiveDate;
use curfew_config::CurfewRules;
use curfew_store::{
    EntryLogSource, PenaltyPoints, PenaltyRecord, PenaltySink, RosterSource, StayRequestSource,
};
use curfew_util::SemesterId;
use std::sync::Arc;
use tracing::{debug, info};

use crate::{decide, latest_entries, resolve_semester, ReconcileError};

/// Outcome of a committed run
#[derive(Debug, Clone)]
pub struct RunReport {
    pub date: NaiveDate,
    pub semester: SemesterId,
    /// Students on the semester roster
    pub enrolled: usize,
    pub unexcused_absences: usize,
    pub late_entries: usize,
    pub compliant: usize,
    /// Penalties written by this run
    pub records: Vec<PenaltyRecord>,
}

impl RunReport {
    pub fn total_points(&self) -> u32 {
        self.records.iter().map(|r| r.points).sum()
    }
}

/// Reconciles one business date against its four collaborators.
///
/// Holds no state between runs; re-running a date writes a fresh batch.
pub struct Reconciler {
    roster: Arc<dyn RosterSource>,
    stays: Arc<dyn StayRequestSource>,
    entries: Arc<dyn EntryLogSource>,
    sink: Arc<dyn PenaltySink>,
    rules: CurfewRules,
}

impl Reconciler {
    pub fn new(
        roster: Arc<dyn RosterSource>,
        stays: Arc<dyn StayRequestSource>,
        entries: Arc<dyn EntryLogSource>,
        sink: Arc<dyn PenaltySink>,
        rules: CurfewRules,
    ) -> Self {
        Self {
            roster,
            stays,
            entries,
            sink,
            rules,
        }
    }

    /// Use one backend for every collaborator
    pub fn from_store<S>(store: Arc<S>, rules: CurfewRules) -> Self
    where
        S: RosterSource + StayRequestSource + EntryLogSource + PenaltySink + 'static,
    {
        let roster: Arc<dyn RosterSource> = store.clone();
        let stays: Arc<dyn StayRequestSource> = store.clone();
        let entries: Arc<dyn EntryLogSource> = store.clone();
        let sink: Arc<dyn PenaltySink> = store;
        Self::new(roster, stays, entries, sink, rules)
    }

    fn penalty_points(&self) -> PenaltyPoints {
        PenaltyPoints {
            unexcused_absence: self.rules.unexcused_absence_points,
            late_entry: self.rules.late_entry_points,
        }
    }

    /// Reconcile `date`: fetch, decide, then commit every violation as one batch.
    ///
    /// Any failure aborts the run before the commit, or fails the commit
    /// itself; in both cases no penalty for the run is persisted.
    pub async fn run(&self, date: NaiveDate) -> Result<RunReport, ReconcileError> {
        let semester = resolve_semester(date)?;
        debug!(date = %date, semester = %semester, "Reconciliation started");

        // All three reads must succeed before anything is decided
        let (roster, exemptions, events) = tokio::try_join!(
            async {
                self.roster
                    .fetch_enrolled_students(&semester)
                    .await
                    .map_err(ReconcileError::Roster)
            },
            async {
                self.stays
                    .fetch_approved_stay_requests(date)
                    .await
                    .map_err(ReconcileError::StayRequests)
            },
            async {
                self.entries
                    .fetch_entry_events(date)
                    .await
                    .map_err(ReconcileError::EntryLog)
            },
        )?;

        debug!(
            enrolled = roster.len(),
            exemptions = exemptions.len(),
            events = events.len(),
            "Inputs fetched"
        );

        let latest = latest_entries(events);
        let curfew = self.rules.curfew.on(date);
        let decision = decide(&roster, &exemptions, &latest, curfew);

        let records = self
            .sink
            .commit_penalty_batch(
                date,
                &decision.unexcused_absences,
                &decision.late_entries,
                self.penalty_points(),
            )
            .await
            .map_err(ReconcileError::Commit)?;

        let report = RunReport {
            date,
            semester,
            enrolled: roster.len(),
            unexcused_absences: decision.unexcused_absences.len(),
            late_entries: decision.late_entries.len(),
            compliant: decision.compliant.len(),
            records,
        };

        info!(
            date = %report.date,
            semester = %report.semester,
            enrolled = report.enrolled,
            unexcused_absences = report.unexcused_absences,
            late_entries = report.late_entries,
            points = report.total_points(),
            "Reconciliation committed"
        );

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{NaiveDateTime, Utc};
    use curfew_store::{
        EntryEvent, LateEntry, PenaltyReason, StoreError, StoreResult, Student,
    };
    use curfew_util::{PenaltyId, StudentId, WallClock};
    use std::collections::HashSet;
    use std::sync::Mutex;

    /// In-memory collaborators with switchable failures
    #[derive(Default)]
    struct FakeDorm {
        roster: Vec<Student>,
        exemptions: HashSet<StudentId>,
        events: Vec<EntryEvent>,
        fail_roster: bool,
        fail_entries: bool,
        fail_commit: bool,
        commits: Mutex<Vec<Vec<PenaltyRecord>>>,
        requested_semesters: Mutex<Vec<SemesterId>>,
    }

    impl FakeDorm {
        fn commit_count(&self) -> usize {
            self.commits.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl RosterSource for FakeDorm {
        async fn fetch_enrolled_students(&self, semester: &SemesterId) -> StoreResult<Vec<Student>> {
            self.requested_semesters.lock().unwrap().push(semester.clone());
            if self.fail_roster {
                return Err(StoreError::Database("roster unavailable".into()));
            }
            Ok(self.roster.clone())
        }
    }

    #[async_trait]
    impl StayRequestSource for FakeDorm {
        async fn fetch_approved_stay_requests(
            &self,
            _date: NaiveDate,
        ) -> StoreResult<HashSet<StudentId>> {
            Ok(self.exemptions.clone())
        }
    }

    #[async_trait]
    impl EntryLogSource for FakeDorm {
        async fn fetch_entry_events(&self, _date: NaiveDate) -> StoreResult<Vec<EntryEvent>> {
            if self.fail_entries {
                return Err(StoreError::Database("entry log timed out".into()));
            }
            Ok(self.events.clone())
        }
    }

    #[async_trait]
    impl PenaltySink for FakeDorm {
        async fn commit_penalty_batch(
            &self,
            date: NaiveDate,
            unexcused_absences: &[StudentId],
            late_entries: &[LateEntry],
            points: PenaltyPoints,
        ) -> StoreResult<Vec<PenaltyRecord>> {
            if self.fail_commit {
                return Err(StoreError::Database("disk full".into()));
            }
            let created_at = Utc::now();
            let records: Vec<PenaltyRecord> = unexcused_absences
                .iter()
                .map(|id| (id.clone(), PenaltyReason::UnexcusedAbsence, points.unexcused_absence))
                .chain(late_entries.iter().map(|l| {
                    (
                        l.student_id.clone(),
                        PenaltyReason::LateEntry {
                            entry_time: l.entry_time.time(),
                        },
                        points.late_entry,
                    )
                }))
                .map(|(student_id, reason, points)| PenaltyRecord {
                    id: PenaltyId::new(),
                    student_id,
                    date,
                    reason,
                    points,
                    created_at,
                })
                .collect();
            self.commits.lock().unwrap().push(records.clone());
            Ok(records)
        }
    }

    fn may_day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()
    }

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        may_day().and_hms_opt(h, m, s).unwrap()
    }

    fn three_students() -> Vec<Student> {
        ["u1", "u2", "u3"]
            .iter()
            .map(|id| Student::new(*id, SemesterId::new("2024-1")))
            .collect()
    }

    #[tokio::test]
    async fn test_run_commits_late_entry() {
        let dorm = Arc::new(FakeDorm {
            roster: three_students(),
            exemptions: HashSet::from([StudentId::new("u2")]),
            events: vec![
                EntryEvent::new("u1", at(8, 0, 0)),
                EntryEvent::new("u1", at(20, 0, 0)),
                EntryEvent::new("u3", at(16, 30, 0)),
            ],
            ..Default::default()
        });
        let reconciler = Reconciler::from_store(dorm.clone(), CurfewRules::default());

        let report = reconciler.run(may_day()).await.unwrap();

        assert_eq!(report.semester, SemesterId::new("2024-1"));
        assert_eq!(report.enrolled, 3);
        assert_eq!(report.unexcused_absences, 0);
        assert_eq!(report.late_entries, 1);
        assert_eq!(report.compliant, 2);
        assert_eq!(report.records.len(), 1);
        assert_eq!(report.records[0].student_id, StudentId::new("u1"));
        assert_eq!(
            report.records[0].reason.label(),
            "late entry after curfew (20:00:00)"
        );
        assert_eq!(report.total_points(), 1);
        assert_eq!(
            *dorm.requested_semesters.lock().unwrap(),
            vec![SemesterId::new("2024-1")]
        );
    }

    #[tokio::test]
    async fn test_run_commits_absences_with_configured_points() {
        let dorm = Arc::new(FakeDorm {
            roster: three_students(),
            ..Default::default()
        });
        let rules = CurfewRules {
            curfew: WallClock::new(22, 0).unwrap(),
            unexcused_absence_points: 5,
            late_entry_points: 2,
        };
        let reconciler = Reconciler::from_store(dorm.clone(), rules);

        let report = reconciler.run(may_day()).await.unwrap();

        let absent: Vec<&str> = report.records.iter().map(|r| r.student_id.as_str()).collect();
        assert_eq!(absent, vec!["u1", "u2", "u3"]);
        assert!(report.records.iter().all(|r| r.points == 5));
        assert_eq!(report.total_points(), 15);
        assert_eq!(dorm.commit_count(), 1);
    }

    #[tokio::test]
    async fn test_curfew_comes_from_rules() {
        let dorm = Arc::new(FakeDorm {
            roster: three_students(),
            events: vec![
                EntryEvent::new("u1", at(20, 0, 0)),
                EntryEvent::new("u2", at(20, 0, 0)),
                EntryEvent::new("u3", at(22, 0, 1)),
            ],
            ..Default::default()
        });
        let rules = CurfewRules {
            curfew: WallClock::new(22, 0).unwrap(),
            ..CurfewRules::default()
        };

        let report = Reconciler::from_store(dorm, rules)
            .run(may_day())
            .await
            .unwrap();

        assert_eq!(report.late_entries, 1);
        assert_eq!(report.records[0].student_id, StudentId::new("u3"));
    }

    #[tokio::test]
    async fn test_vacation_date_touches_nothing() {
        let dorm = Arc::new(FakeDorm {
            roster: three_students(),
            ..Default::default()
        });
        let reconciler = Reconciler::from_store(dorm.clone(), CurfewRules::default());

        let result = reconciler
            .run(NaiveDate::from_ymd_opt(2024, 8, 1).unwrap())
            .await;

        assert!(matches!(result, Err(ReconcileError::NoActiveSemester(_))));
        assert!(dorm.requested_semesters.lock().unwrap().is_empty());
        assert_eq!(dorm.commit_count(), 0);
    }

    #[tokio::test]
    async fn test_fetch_failure_aborts_before_commit() {
        let dorm = Arc::new(FakeDorm {
            roster: three_students(),
            fail_entries: true,
            ..Default::default()
        });
        let reconciler = Reconciler::from_store(dorm.clone(), CurfewRules::default());

        let err = reconciler.run(may_day()).await.unwrap_err();
        assert!(matches!(err, ReconcileError::EntryLog(_)));
        assert!(err.is_retryable());
        assert_eq!(dorm.commit_count(), 0);

        let dorm = Arc::new(FakeDorm {
            fail_roster: true,
            ..Default::default()
        });
        let err = Reconciler::from_store(dorm.clone(), CurfewRules::default())
            .run(may_day())
            .await
            .unwrap_err();
        assert!(matches!(err, ReconcileError::Roster(_)));
        assert_eq!(dorm.commit_count(), 0);
    }

    #[tokio::test]
    async fn test_commit_failure_is_reported() {
        let dorm = Arc::new(FakeDorm {
            roster: three_students(),
            fail_commit: true,
            ..Default::default()
        });

        let err = Reconciler::from_store(dorm, CurfewRules::default())
            .run(may_day())
            .await
            .unwrap_err();
        assert!(matches!(err, ReconcileError::Commit(_)));
    }

    #[tokio::test]
    async fn test_event_order_does_not_change_the_outcome() {
        let events = vec![
            EntryEvent::new("u1", at(20, 0, 0)),
            EntryEvent::new("u1", at(9, 0, 0)),
            EntryEvent::new("u2", at(16, 59, 59)),
            EntryEvent::new("u2", at(17, 0, 0)),
        ];
        let mut reversed = events.clone();
        reversed.reverse();

        let mut outcomes = Vec::new();
        for events in [events, reversed] {
            let dorm = Arc::new(FakeDorm {
                roster: three_students(),
                events,
                ..Default::default()
            });
            let report = Reconciler::from_store(dorm, CurfewRules::default())
                .run(may_day())
                .await
                .unwrap();
            let summary: Vec<(String, String)> = report
                .records
                .iter()
                .map(|r| (r.student_id.to_string(), r.reason.label()))
                .collect();
            outcomes.push(summary);
        }

        assert_eq!(outcomes[0], outcomes[1]);
        assert_eq!(
            outcomes[0],
            vec![
                ("u3".to_string(), "unexcused overnight absence".to_string()),
                ("u1".to_string(), "late entry after curfew (20:00:00)".to_string()),
            ]
        );
    }
}
