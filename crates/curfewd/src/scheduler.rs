//! Daily trigger and bounded retry around a reconciliation run

use chrono::{DateTime, FixedOffset, NaiveDate};
use curfew_config::RetryPolicy;
use curfew_core::{ReconcileError, Reconciler, RunReport};
use curfew_store::{AuditEvent, AuditEventType, Store};
use curfew_util::{format_duration, next_occurrence, previous_day, WallClock};
use std::sync::Arc;
use tracing::{error, info, warn};

/// How a scheduled date ended up
#[derive(Debug)]
pub enum RunOutcome {
    Committed(RunReport),
    /// The date has no semester; nothing to reconcile
    Skipped(ReconcileError),
    /// Every attempt failed; nothing was committed
    Failed(ReconcileError),
}

pub struct Scheduler {
    reconciler: Reconciler,
    store: Arc<dyn Store>,
    retry: RetryPolicy,
    run_at: WallClock,
}

impl Scheduler {
    pub fn new(
        reconciler: Reconciler,
        store: Arc<dyn Store>,
        retry: RetryPolicy,
        run_at: WallClock,
    ) -> Self {
        Self {
            reconciler,
            store,
            retry,
            run_at,
        }
    }

    /// Next trigger strictly after `now`
    pub fn next_run(&self, now: &DateTime<FixedOffset>) -> DateTime<FixedOffset> {
        next_occurrence(now, self.run_at)
    }

    /// Trigger to wait for after `last` has fired.
    ///
    /// The clock may read slightly before `last` on wake, so the search
    /// starts from whichever is later.
    pub fn following_run(
        &self,
        now: &DateTime<FixedOffset>,
        last: Option<DateTime<FixedOffset>>,
    ) -> DateTime<FixedOffset> {
        let from = last.map_or(*now, |last| (*now).max(last));
        self.next_run(&from)
    }

    /// Business date reconciled by a trigger firing at `now`
    pub fn target_date(now: &DateTime<FixedOffset>) -> NaiveDate {
        previous_day(now)
    }

    /// Reconcile `date`, retrying transient failures with backoff.
    pub async fn reconcile_with_retry(&self, date: NaiveDate) -> RunOutcome {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            self.audit(AuditEventType::ReconciliationStarted { date, attempt });

            let err = match self.reconciler.run(date).await {
                Ok(report) => {
                    self.audit(AuditEventType::ReconciliationCommitted {
                        date,
                        semester: report.semester.clone(),
                        enrolled: report.enrolled,
                        unexcused_absences: report.unexcused_absences,
                        late_entries: report.late_entries,
                    });
                    return RunOutcome::Committed(report);
                }
                Err(err) => err,
            };

            if !err.is_retryable() {
                info!(date = %date, reason = %err, "Nothing to reconcile");
                self.audit(AuditEventType::ReconciliationSkipped {
                    date,
                    reason: err.to_string(),
                });
                return RunOutcome::Skipped(err);
            }

            let will_retry = attempt < max_attempts;
            self.audit(AuditEventType::ReconciliationFailed {
                date,
                attempt,
                error: err.to_string(),
                will_retry,
            });

            if !will_retry {
                error!(date = %date, attempts = attempt, error = %err, "Reconciliation failed");
                return RunOutcome::Failed(err);
            }

            let backoff = self.retry.backoff_after(attempt);
            warn!(
                date = %date,
                attempt,
                error = %err,
                retry_in = %format_duration(backoff),
                "Reconciliation attempt failed"
            );
            tokio::time::sleep(backoff).await;
            attempt += 1;
        }
    }

    fn audit(&self, event: AuditEventType) {
        if let Err(e) = self.store.append_audit(AuditEvent::new(event)) {
            warn!(error = %e, "Failed to append audit event");
        }
    }
}
