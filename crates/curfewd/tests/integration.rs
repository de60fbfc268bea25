//! Integration tests for curfewd
//!
//! These tests run whole reconciliations against an on-disk store, with the
//! rules coming from a parsed config file.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use curfew_config::{CurfewPolicy, parse_config};
use curfew_core::{ReconcileError, Reconciler};
use curfew_store::{
    EntryEvent, PenaltyReason, SqliteStore, StayStatus, Store, StoreError, Student,
};
use curfew_util::{DATABASE_FILENAME, SemesterId, StudentId};
use std::sync::Arc;

const CONFIG: &str = r#"
config_version = 1

[service]
timezone = "+09:00"
run_at = "00:30"

[curfew]
time = "17:00"
unexcused_absence_points = 3
late_entry_points = 1
"#;

fn policy() -> CurfewPolicy {
    parse_config(CONFIG).unwrap()
}

fn may_day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()
}

fn at(date: NaiveDate, h: u32, m: u32, s: u32) -> NaiveDateTime {
    date.and_hms_opt(h, m, s).unwrap()
}

/// Three enrolled students; u2 holds an approved stay request for May 1st
fn seed(store: &SqliteStore) {
    let semester = SemesterId::new("2024-1");
    for id in ["u1", "u2", "u3"] {
        store.enroll_student(&Student::new(id, semester.clone())).unwrap();
    }

    let request = store
        .submit_stay_request(
            &StudentId::new("u2"),
            may_day(),
            "family visit",
            NaiveTime::from_hms_opt(13, 0, 0).unwrap(),
        )
        .unwrap();
    store
        .update_stay_status(&request.id, StayStatus::Approved)
        .unwrap();
}

#[tokio::test]
async fn test_late_entry_and_exemption() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(SqliteStore::open(dir.path().join(DATABASE_FILENAME)).unwrap());
    seed(&store);

    store.record_entry(&EntryEvent::new("u1", at(may_day(), 20, 0, 0))).unwrap();
    store.record_entry(&EntryEvent::new("u3", at(may_day(), 16, 30, 0))).unwrap();

    let reconciler = Reconciler::from_store(store.clone(), policy().rules);
    let report = reconciler.run(may_day()).await.unwrap();

    assert_eq!(report.enrolled, 3);
    assert_eq!(report.unexcused_absences, 0);
    assert_eq!(report.late_entries, 1);
    assert_eq!(report.compliant, 2);

    let stored = store.penalties_for_date(may_day()).unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].student_id, StudentId::new("u1"));
    assert_eq!(
        stored[0].reason,
        PenaltyReason::LateEntry {
            entry_time: NaiveTime::from_hms_opt(20, 0, 0).unwrap()
        }
    );
    assert_eq!(stored[0].points, 1);
}

#[tokio::test]
async fn test_everyone_absent_without_requests() {
    let store = Arc::new(SqliteStore::in_memory().unwrap());
    let semester = SemesterId::new("2024-1");
    for id in ["u1", "u2", "u3"] {
        store.enroll_student(&Student::new(id, semester.clone())).unwrap();
    }

    let report = Reconciler::from_store(store.clone(), policy().rules)
        .run(may_day())
        .await
        .unwrap();

    assert_eq!(report.unexcused_absences, 3);
    assert_eq!(report.late_entries, 0);
    assert_eq!(report.total_points(), 9);

    let stored = store.penalties_for_date(may_day()).unwrap();
    let ids: Vec<&str> = stored.iter().map(|p| p.student_id.as_str()).collect();
    assert_eq!(ids, vec!["u1", "u2", "u3"]);
    assert!(stored
        .iter()
        .all(|p| p.reason == PenaltyReason::UnexcusedAbsence && p.points == 3));
}

#[tokio::test]
async fn test_only_the_target_day_counts() {
    let store = Arc::new(SqliteStore::in_memory().unwrap());
    seed(&store);

    // u1 came home late the night before and again just after midnight
    let april_30 = NaiveDate::from_ymd_opt(2024, 4, 30).unwrap();
    let may_2 = NaiveDate::from_ymd_opt(2024, 5, 2).unwrap();
    store.record_entry(&EntryEvent::new("u1", at(april_30, 23, 0, 0))).unwrap();
    store.record_entry(&EntryEvent::new("u1", at(may_2, 0, 5, 0))).unwrap();
    // u3 checked in early and then at exactly curfew
    store.record_entry(&EntryEvent::new("u3", at(may_day(), 8, 0, 0))).unwrap();
    store.record_entry(&EntryEvent::new("u3", at(may_day(), 17, 0, 0))).unwrap();

    let report = Reconciler::from_store(store.clone(), policy().rules)
        .run(may_day())
        .await
        .unwrap();

    assert_eq!(report.unexcused_absences, 1);
    assert_eq!(report.late_entries, 0);
    assert_eq!(report.records[0].student_id, StudentId::new("u1"));
}

#[tokio::test]
async fn test_pending_and_rejected_requests_do_not_exempt() {
    let store = Arc::new(SqliteStore::in_memory().unwrap());
    let semester = SemesterId::new("2024-1");
    let request_time = NaiveTime::from_hms_opt(12, 0, 0).unwrap();
    for id in ["u1", "u2"] {
        store.enroll_student(&Student::new(id, semester.clone())).unwrap();
    }

    store
        .submit_stay_request(&StudentId::new("u1"), may_day(), "pending", request_time)
        .unwrap();
    let rejected = store
        .submit_stay_request(&StudentId::new("u2"), may_day(), "rejected", request_time)
        .unwrap();
    store
        .update_stay_status(&rejected.id, StayStatus::Rejected)
        .unwrap();

    let report = Reconciler::from_store(store, policy().rules)
        .run(may_day())
        .await
        .unwrap();

    assert_eq!(report.unexcused_absences, 2);
}

#[tokio::test]
async fn test_failed_commit_rolls_back_earlier_penalties() {
    let store = Arc::new(SqliteStore::in_memory().unwrap());
    let semester = SemesterId::new("2024-1");
    // The blank id is enrolled fine but cannot be written as a penalty
    for id in ["u1", ""] {
        store.enroll_student(&Student::new(id, semester.clone())).unwrap();
    }
    // u1's absence is written first; the blank id's late entry then fails
    store.record_entry(&EntryEvent::new("", at(may_day(), 20, 0, 0))).unwrap();

    let err = Reconciler::from_store(store.clone(), policy().rules)
        .run(may_day())
        .await
        .unwrap_err();

    assert!(matches!(err, ReconcileError::Commit(StoreError::Database(_))));
    assert!(store.penalties_for_date(may_day()).unwrap().is_empty());
    assert!(store
        .penalties_for_student(&StudentId::new("u1"))
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_vacation_day_is_rejected() {
    let store = Arc::new(SqliteStore::in_memory().unwrap());
    let august = NaiveDate::from_ymd_opt(2024, 8, 10).unwrap();

    let err = Reconciler::from_store(store.clone(), policy().rules)
        .run(august)
        .await
        .unwrap_err();

    assert!(matches!(err, ReconcileError::NoActiveSemester(_)));
    assert!(!err.is_retryable());
    assert!(store.penalties_for_date(august).unwrap().is_empty());
}

#[tokio::test]
async fn test_rerun_writes_a_second_batch() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join(DATABASE_FILENAME);

    {
        let store = Arc::new(SqliteStore::open(&db_path).unwrap());
        seed(&store);
        Reconciler::from_store(store, policy().rules)
            .run(may_day())
            .await
            .unwrap();
    }

    // Reopen: the first batch persisted and a rerun adds another one
    let store = Arc::new(SqliteStore::open(&db_path).unwrap());
    assert_eq!(store.penalties_for_date(may_day()).unwrap().len(), 2);

    Reconciler::from_store(store.clone(), policy().rules)
        .run(may_day())
        .await
        .unwrap();

    let stored = store.penalties_for_date(may_day()).unwrap();
    assert_eq!(stored.len(), 4);
    assert_eq!(
        store
            .penalties_for_student(&StudentId::new("u1"))
            .unwrap()
            .len(),
        2
    );
}
