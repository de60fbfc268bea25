//! SQLite-based store implementation

use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveDate, NaiveTime, Utc};
use curfew_util::{
    day_bounds, format_date, format_timestamp, parse_date, parse_timestamp, PenaltyId,
    SemesterId, StayRequestId, StudentId,
};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashSet;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::{
    AuditEvent, EntryEvent, EntryLogSource, LateEntry, PenaltyPoints, PenaltyReason,
    PenaltyRecord, PenaltySink, RosterSource, StayRequest, StayRequestSource, StayStatus, Store,
    StoreError, StoreResult, Student,
};

const REQUEST_TIME_FORMAT: &str = "%H:%M:%S";

/// SQLite-based store
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a store at the given path
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory store (for testing)
    pub fn in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn conn(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Database("store lock poisoned".into()))
    }

    fn init_schema(&self) -> StoreResult<()> {
        let conn = self.conn()?;

        conn.execute_batch(
            r#"
            -- Audit log (append-only)
            CREATE TABLE IF NOT EXISTS audit_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                event_json TEXT NOT NULL
            );

            -- Semester roster
            CREATE TABLE IF NOT EXISTS enrollments (
                student_id TEXT NOT NULL,
                semester TEXT NOT NULL,
                PRIMARY KEY (student_id, semester)
            );

            -- Overnight-stay requests
            CREATE TABLE IF NOT EXISTS stay_requests (
                id TEXT PRIMARY KEY,
                student_id TEXT NOT NULL,
                date TEXT NOT NULL,
                reason TEXT NOT NULL,
                request_time TEXT NOT NULL,
                status TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            -- Entry events (append-only)
            CREATE TABLE IF NOT EXISTS entry_logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                student_id TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            -- Penalties (write-once)
            CREATE TABLE IF NOT EXISTS penalties (
                id TEXT PRIMARY KEY,
                student_id TEXT NOT NULL CHECK (length(student_id) > 0),
                date TEXT NOT NULL,
                reason TEXT NOT NULL,
                reason_json TEXT NOT NULL,
                points INTEGER NOT NULL CHECK (points > 0),
                created_at TEXT NOT NULL
            );

            -- Indexes
            CREATE INDEX IF NOT EXISTS idx_audit_timestamp ON audit_log(timestamp);
            CREATE INDEX IF NOT EXISTS idx_enrollments_semester ON enrollments(semester);
            CREATE INDEX IF NOT EXISTS idx_stay_requests_date ON stay_requests(date, status);
            CREATE INDEX IF NOT EXISTS idx_stay_requests_student ON stay_requests(student_id);
            CREATE INDEX IF NOT EXISTS idx_entry_logs_timestamp ON entry_logs(timestamp);
            CREATE INDEX IF NOT EXISTS idx_penalties_student ON penalties(student_id);
            CREATE INDEX IF NOT EXISTS idx_penalties_date ON penalties(date);
            "#,
        )?;

        debug!("Store schema initialized");
        Ok(())
    }

    fn query_roster(&self, semester: &SemesterId) -> StoreResult<Vec<Student>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(
            "SELECT student_id FROM enrollments WHERE semester = ? ORDER BY student_id",
        )?;
        let ids = stmt
            .query_map([semester.as_str()], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        debug!(semester = %semester, count = ids.len(), "Roster fetched");

        Ok(ids
            .into_iter()
            .map(|id| Student::new(id, semester.clone()))
            .collect())
    }

    fn query_approved_stays(&self, date: NaiveDate) -> StoreResult<HashSet<StudentId>> {
        let conn = self.conn()?;

        let mut stmt = conn
            .prepare("SELECT student_id FROM stay_requests WHERE date = ? AND status = ?")?;
        let ids = stmt
            .query_map(
                params![format_date(date), StayStatus::Approved.as_str()],
                |row| row.get::<_, String>(0),
            )?
            .map(|id| id.map(StudentId::from))
            .collect::<Result<HashSet<_>, _>>()?;

        debug!(date = %date, count = ids.len(), "Approved stay requests fetched");
        Ok(ids)
    }

    fn query_entries(&self, date: NaiveDate) -> StoreResult<Vec<EntryEvent>> {
        let conn = self.conn()?;
        let (start, end) = day_bounds(date);

        let mut stmt = conn.prepare(
            "SELECT student_id, timestamp FROM entry_logs WHERE timestamp >= ? AND timestamp < ?",
        )?;
        let rows = stmt
            .query_map(
                params![format_timestamp(&start), format_timestamp(&end)],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
            )?
            .collect::<Result<Vec<_>, _>>()?;

        let mut events = Vec::with_capacity(rows.len());
        for (student_id, raw) in rows {
            let Some(timestamp) = parse_timestamp(&raw) else {
                return Err(StoreError::Serialization(format!(
                    "invalid entry timestamp '{}' for student {}",
                    raw, student_id
                )));
            };
            events.push(EntryEvent::new(student_id, timestamp));
        }

        debug!(date = %date, count = events.len(), "Entry events fetched");
        Ok(events)
    }

    fn insert_penalty_batch(
        &self,
        date: NaiveDate,
        unexcused_absences: &[StudentId],
        late_entries: &[LateEntry],
        points: PenaltyPoints,
    ) -> StoreResult<Vec<PenaltyRecord>> {
        let created_at = server_timestamp();

        let records: Vec<PenaltyRecord> = unexcused_absences
            .iter()
            .map(|student_id| {
                (
                    student_id.clone(),
                    PenaltyReason::UnexcusedAbsence,
                    points.unexcused_absence,
                )
            })
            .chain(late_entries.iter().map(|late| {
                (
                    late.student_id.clone(),
                    PenaltyReason::LateEntry {
                        entry_time: late.entry_time.time(),
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

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO penalties (id, student_id, date, reason, reason_json, points, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )?;
            for record in &records {
                insert_record(&mut stmt, record)?;
            }
        }
        // Dropping an uncommitted transaction rolls it back
        tx.commit()?;

        info!(
            date = %date,
            unexcused_absences = unexcused_absences.len(),
            late_entries = late_entries.len(),
            "Penalty batch committed"
        );
        Ok(records)
    }

    fn query_penalties(&self, sql: &str, param: &str) -> StoreResult<Vec<PenaltyRecord>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(sql)?;
        let rows = stmt
            .query_map([param], |row| {
                Ok(PenaltyRow {
                    id: row.get(0)?,
                    student_id: row.get(1)?,
                    date: row.get(2)?,
                    reason_json: row.get(3)?,
                    points: row.get(4)?,
                    created_at: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter().map(PenaltyRow::into_record).collect()
    }
}

fn server_timestamp() -> DateTime<Utc> {
    curfew_util::now().with_timezone(&Utc)
}

fn insert_record(stmt: &mut rusqlite::Statement<'_>, record: &PenaltyRecord) -> StoreResult<()> {
    stmt.execute(params![
        record.id.to_string(),
        record.student_id.as_str(),
        format_date(record.date),
        record.reason.label(),
        serde_json::to_string(&record.reason)?,
        record.points,
        record.created_at.to_rfc3339(),
    ])?;
    Ok(())
}

fn parse_utc(s: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Serialization(format!("invalid timestamp '{}': {}", s, e)))
}

fn parse_stored_date(s: &str) -> StoreResult<NaiveDate> {
    parse_date(s).ok_or_else(|| StoreError::Serialization(format!("invalid date '{}'", s)))
}

struct PenaltyRow {
    id: String,
    student_id: String,
    date: String,
    reason_json: String,
    points: u32,
    created_at: String,
}

impl PenaltyRow {
    fn into_record(self) -> StoreResult<PenaltyRecord> {
        Ok(PenaltyRecord {
            id: PenaltyId::parse(&self.id)
                .map_err(|e| StoreError::Serialization(e.to_string()))?,
            student_id: StudentId::from(self.student_id),
            date: parse_stored_date(&self.date)?,
            reason: serde_json::from_str(&self.reason_json)?,
            points: self.points,
            created_at: parse_utc(&self.created_at)?,
        })
    }
}

struct StayRequestRow {
    id: String,
    student_id: String,
    date: String,
    reason: String,
    request_time: String,
    status: String,
    created_at: String,
}

impl StayRequestRow {
    fn into_request(self) -> StoreResult<StayRequest> {
        Ok(StayRequest {
            id: StayRequestId::parse(&self.id)
                .map_err(|e| StoreError::Serialization(e.to_string()))?,
            student_id: StudentId::from(self.student_id),
            date: parse_stored_date(&self.date)?,
            reason: self.reason,
            request_time: NaiveTime::parse_from_str(&self.request_time, REQUEST_TIME_FORMAT)
                .map_err(|e| StoreError::Serialization(e.to_string()))?,
            status: StayStatus::parse(&self.status).ok_or_else(|| {
                StoreError::Serialization(format!("unknown stay status '{}'", self.status))
            })?,
            created_at: parse_utc(&self.created_at)?,
        })
    }
}

#[async_trait]
impl RosterSource for SqliteStore {
    async fn fetch_enrolled_students(&self, semester: &SemesterId) -> StoreResult<Vec<Student>> {
        self.query_roster(semester)
    }
}

#[async_trait]
impl StayRequestSource for SqliteStore {
    async fn fetch_approved_stay_requests(
        &self,
        date: NaiveDate,
    ) -> StoreResult<HashSet<StudentId>> {
        self.query_approved_stays(date)
    }
}

#[async_trait]
impl EntryLogSource for SqliteStore {
    async fn fetch_entry_events(&self, date: NaiveDate) -> StoreResult<Vec<EntryEvent>> {
        self.query_entries(date)
    }
}

#[async_trait]
impl PenaltySink for SqliteStore {
    async fn commit_penalty_batch(
        &self,
        date: NaiveDate,
        unexcused_absences: &[StudentId],
        late_entries: &[LateEntry],
        points: PenaltyPoints,
    ) -> StoreResult<Vec<PenaltyRecord>> {
        self.insert_penalty_batch(date, unexcused_absences, late_entries, points)
    }
}

impl Store for SqliteStore {
    fn append_audit(&self, mut event: AuditEvent) -> StoreResult<()> {
        let conn = self.conn()?;
        let event_json = serde_json::to_string(&event.event)?;

        conn.execute(
            "INSERT INTO audit_log (timestamp, event_json) VALUES (?, ?)",
            params![event.timestamp.to_rfc3339(), event_json],
        )?;

        event.id = conn.last_insert_rowid();
        debug!(event_id = event.id, "Audit event appended");

        Ok(())
    }

    fn get_recent_audits(&self, limit: usize) -> StoreResult<Vec<AuditEvent>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(
            "SELECT id, timestamp, event_json FROM audit_log ORDER BY id DESC LIMIT ?",
        )?;

        let rows = stmt.query_map([limit], |row| {
            let id: i64 = row.get(0)?;
            let timestamp_str: String = row.get(1)?;
            let event_json: String = row.get(2)?;
            Ok((id, timestamp_str, event_json))
        })?;

        let mut events = Vec::new();
        for row in rows {
            let (id, timestamp_str, event_json) = row?;
            let timestamp = DateTime::parse_from_rfc3339(&timestamp_str)
                .map(|dt| dt.with_timezone(&Local))
                .unwrap_or_else(|_| curfew_util::now());
            let event: crate::AuditEventType = serde_json::from_str(&event_json)?;

            events.push(AuditEvent {
                id,
                timestamp,
                event,
            });
        }

        Ok(events)
    }

    fn enroll_student(&self, student: &Student) -> StoreResult<()> {
        let conn = self.conn()?;

        conn.execute(
            "INSERT OR IGNORE INTO enrollments (student_id, semester) VALUES (?, ?)",
            params![student.student_id.as_str(), student.semester.as_str()],
        )?;

        debug!(student_id = %student.student_id, semester = %student.semester, "Student enrolled");
        Ok(())
    }

    fn submit_stay_request(
        &self,
        student_id: &StudentId,
        date: NaiveDate,
        reason: &str,
        request_time: NaiveTime,
    ) -> StoreResult<StayRequest> {
        let conn = self.conn()?;
        let request = StayRequest {
            id: StayRequestId::new(),
            student_id: student_id.clone(),
            date,
            reason: reason.to_string(),
            request_time,
            status: StayStatus::Pending,
            created_at: server_timestamp(),
        };

        conn.execute(
            r#"
            INSERT INTO stay_requests (id, student_id, date, reason, request_time, status, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                request.id.to_string(),
                request.student_id.as_str(),
                format_date(request.date),
                request.reason,
                request.request_time.format(REQUEST_TIME_FORMAT).to_string(),
                request.status.as_str(),
                request.created_at.to_rfc3339(),
            ],
        )?;

        debug!(request_id = %request.id, student_id = %student_id, date = %date, "Stay request submitted");
        Ok(request)
    }

    fn update_stay_status(&self, id: &StayRequestId, status: StayStatus) -> StoreResult<()> {
        let conn = self.conn()?;

        let updated = conn.execute(
            "UPDATE stay_requests SET status = ? WHERE id = ?",
            params![status.as_str(), id.to_string()],
        )?;
        if updated == 0 {
            return Err(StoreError::NotFound(format!("stay request {}", id)));
        }

        debug!(request_id = %id, status = %status, "Stay request status updated");
        Ok(())
    }

    fn stay_requests_for_student(&self, student_id: &StudentId) -> StoreResult<Vec<StayRequest>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(
            r#"
            SELECT id, student_id, date, reason, request_time, status, created_at
            FROM stay_requests WHERE student_id = ? ORDER BY date DESC, created_at DESC
            "#,
        )?;
        let rows = stmt
            .query_map([student_id.as_str()], |row| {
                Ok(StayRequestRow {
                    id: row.get(0)?,
                    student_id: row.get(1)?,
                    date: row.get(2)?,
                    reason: row.get(3)?,
                    request_time: row.get(4)?,
                    status: row.get(5)?,
                    created_at: row.get(6)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter().map(StayRequestRow::into_request).collect()
    }

    fn record_entry(&self, event: &EntryEvent) -> StoreResult<()> {
        let conn = self.conn()?;

        conn.execute(
            "INSERT INTO entry_logs (student_id, timestamp, created_at) VALUES (?, ?, ?)",
            params![
                event.student_id.as_str(),
                format_timestamp(&event.timestamp),
                server_timestamp().to_rfc3339(),
            ],
        )?;

        debug!(student_id = %event.student_id, timestamp = %event.timestamp, "Entry recorded");
        Ok(())
    }

    fn record_penalty(
        &self,
        student_id: &StudentId,
        date: NaiveDate,
        reason: PenaltyReason,
        points: u32,
    ) -> StoreResult<PenaltyRecord> {
        let conn = self.conn()?;
        let record = PenaltyRecord {
            id: PenaltyId::new(),
            student_id: student_id.clone(),
            date,
            reason,
            points,
            created_at: server_timestamp(),
        };

        let mut stmt = conn.prepare(
            r#"
            INSERT INTO penalties (id, student_id, date, reason, reason_json, points, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )?;
        insert_record(&mut stmt, &record)?;

        debug!(penalty_id = %record.id, student_id = %student_id, points, "Penalty recorded");
        Ok(record)
    }

    fn penalties_for_student(&self, student_id: &StudentId) -> StoreResult<Vec<PenaltyRecord>> {
        self.query_penalties(
            r#"
            SELECT id, student_id, date, reason_json, points, created_at
            FROM penalties WHERE student_id = ? ORDER BY date DESC, created_at DESC
            "#,
            student_id.as_str(),
        )
    }

    fn penalties_for_date(&self, date: NaiveDate) -> StoreResult<Vec<PenaltyRecord>> {
        self.query_penalties(
            r#"
            SELECT id, student_id, date, reason_json, points, created_at
            FROM penalties WHERE date = ? ORDER BY rowid
            "#,
            &format_date(date),
        )
    }

    fn is_healthy(&self) -> bool {
        match self.conn.lock() {
            Ok(conn) => conn.query_row("SELECT 1", [], |_| Ok(())).is_ok(),
            Err(_) => {
                warn!("Store lock poisoned");
                false
            }
        }
    }
}
