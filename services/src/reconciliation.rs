use std::collections::{BTreeSet, HashSet};

use chrono::{DateTime, NaiveDate, Utc};
use db::models::attendance_record::{Model as AttendanceRecord, NewRecord};
use db::models::attendance_session::Model as AttendanceSession;
use sea_orm::DatabaseConnection;
use serde::Serialize;

use crate::error::AttendanceResult;
use crate::roster::RosterProvider;

/// Tally of one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconciliationReport {
    pub sessions_examined: usize,
    pub sessions_closed: usize,
    pub sessions_failed: usize,
    pub absent_marked: u64,
}

/// Closes expired sessions and backfills `absent` for everyone on the roster
/// who never checked in.
///
/// Holds no state between runs. A session that fails part-way stays active
/// and is picked up again by the next run; rows already written are skipped.
pub struct ReconciliationWorker<R> {
    db: DatabaseConnection,
    roster: R,
}

impl<R: RosterProvider> ReconciliationWorker<R> {
    pub fn new(db: DatabaseConnection, roster: R) -> Self {
        Self { db, roster }
    }

    pub async fn run(&self, now: DateTime<Utc>) -> AttendanceResult<ReconciliationReport> {
        let expired = AttendanceSession::find_expired_active(&self.db, now).await?;

        let mut report = ReconciliationReport {
            sessions_examined: expired.len(),
            ..Default::default()
        };
        if expired.is_empty() {
            tracing::debug!("No expired attendance sessions to reconcile");
            return Ok(report);
        }

        // absent rows carry the run date, not the session's own date
        let today = now.date_naive();

        for session in &expired {
            match self.reconcile_session(session, today).await {
                Ok(marked) => {
                    report.sessions_closed += 1;
                    report.absent_marked += marked;
                    tracing::info!(
                        session_id = session.id,
                        absent_marked = marked,
                        "Attendance session reconciled"
                    );
                }
                Err(e) => {
                    report.sessions_failed += 1;
                    tracing::error!(
                        session_id = session.id,
                        error = %e,
                        "Failed to reconcile attendance session"
                    );
                }
            }
        }

        tracing::info!(
            examined = report.sessions_examined,
            closed = report.sessions_closed,
            failed = report.sessions_failed,
            absent_marked = report.absent_marked,
            "Attendance reconciliation finished"
        );
        Ok(report)
    }

    async fn reconcile_session(
        &self,
        session: &AttendanceSession,
        today: NaiveDate,
    ) -> AttendanceResult<u64> {
        let roster: BTreeSet<i64> = self
            .roster
            .participants(session)
            .await?
            .into_iter()
            .collect();

        let recorded: HashSet<i64> = AttendanceRecord::find_by_session(&self.db, session.id)
            .await?
            .into_iter()
            .map(|r| r.user_id)
            .collect();

        let to_mark: Vec<NewRecord> = roster
            .into_iter()
            .filter(|id| !recorded.contains(id))
            .map(|id| NewRecord::absent(session.id, id, today))
            .collect();

        let marked = if to_mark.is_empty() {
            0
        } else {
            AttendanceRecord::insert_many(&self.db, to_mark).await?
        };

        AttendanceSession::deactivate(&self.db, session.id).await?;
        Ok(marked)
    }
}
