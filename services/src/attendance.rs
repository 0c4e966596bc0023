use chrono::{DateTime, Duration, NaiveTime, Utc};
use db::StoreError;
use db::models::attendance_record::{
    AttendanceStatus, AttendanceSummary, Model as AttendanceRecord, NewRecord,
};
use db::models::attendance_session::{
    DEFAULT_DURATION_HOURS, DEFAULT_LATE_AFTER_MINUTES, DEFAULT_TITLE, ListSessions,
    Model as AttendanceSession, NewSession, WindowState,
};
use db::models::user::Model as User;
use sea_orm::{DatabaseConnection, DbErr};
use serde::Serialize;
use util::config;

use crate::error::{AttendanceError, AttendanceResult};
use crate::identity::Identity;
use crate::proof::Proof;

/// Parameters for [`AttendanceService::create_session`]. Omitted fields take
/// the hostel defaults: titled "Daily Attendance", opening now, 24 hours long,
/// late after 8 hours.
#[derive(Debug, Clone, Default)]
pub struct CreateSession {
    pub title: Option<String>,
    pub start_at: Option<DateTime<Utc>>,
    /// Takes precedence over `duration_hours` when both are given.
    pub expires_at: Option<DateTime<Utc>>,
    pub duration_hours: Option<f64>,
    pub late_after_minutes: Option<i32>,
}

/// How a participant names the session they are checking into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionRef {
    Id(i64),
    /// Raw scanned proof payload.
    Proof(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CheckInOutcome {
    Recorded {
        status: AttendanceStatus,
        time: Option<NaiveTime>,
    },
    /// The participant already holds a record; it is reported, never overwritten.
    AlreadyMarked {
        status: AttendanceStatus,
        time: Option<NaiveTime>,
    },
}

impl CheckInOutcome {
    pub fn status(&self) -> AttendanceStatus {
        match self {
            CheckInOutcome::Recorded { status, .. } | CheckInOutcome::AlreadyMarked { status, .. } => {
                *status
            }
        }
    }

    pub fn time(&self) -> Option<NaiveTime> {
        match self {
            CheckInOutcome::Recorded { time, .. } | CheckInOutcome::AlreadyMarked { time, .. } => {
                *time
            }
        }
    }

    pub fn is_already_marked(&self) -> bool {
        matches!(self, CheckInOutcome::AlreadyMarked { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreatorInfo {
    pub id: i64,
    pub name: String,
    pub email: String,
}

impl From<User> for CreatorInfo {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
        }
    }
}

/// Session metadata together with whoever opened it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionDetails {
    #[serde(flatten)]
    pub session: AttendanceSession,
    pub creator: Option<CreatorInfo>,
}

/// Interactive side of attendance: sessions, proofs and check-ins.
#[derive(Debug, Clone)]
pub struct AttendanceService {
    db: DatabaseConnection,
}

impl AttendanceService {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub fn db(&self) -> &DatabaseConnection {
        &self.db
    }

    pub async fn create_session(
        &self,
        creator: &Identity,
        params: CreateSession,
        now: DateTime<Utc>,
    ) -> AttendanceResult<(AttendanceSession, Proof)> {
        require_elevated(creator, "Only admins and wardens can create attendance sessions")?;

        let duration_hours = params.duration_hours.unwrap_or(DEFAULT_DURATION_HOURS);
        if !duration_hours.is_finite() || duration_hours <= 0.0 {
            return Err(AttendanceError::Validation(
                "duration_hours must be a positive number".into(),
            ));
        }

        let late_after_minutes = params
            .late_after_minutes
            .unwrap_or(DEFAULT_LATE_AFTER_MINUTES);
        if late_after_minutes < 0 {
            return Err(AttendanceError::Validation(
                "late_after_minutes must not be negative".into(),
            ));
        }

        let start_at = params.start_at.unwrap_or(now);
        let expires_at = match params.expires_at {
            Some(expires_at) => expires_at,
            None => Duration::try_milliseconds((duration_hours * 3_600_000.0).round() as i64)
                .and_then(|d| start_at.checked_add_signed(d))
                .ok_or_else(|| {
                    AttendanceError::Validation("duration_hours is out of range".into())
                })?,
        };

        let title = params
            .title
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(DEFAULT_TITLE)
            .to_string();

        let session = AttendanceSession::create(
            &self.db,
            NewSession {
                title,
                created_by: creator.user_id,
                start_at,
                expires_at,
                late_after_minutes,
            },
        )
        .await?;

        tracing::info!(
            session_id = session.id,
            created_by = creator.user_id,
            start_at = %session.start_at,
            expires_at = %session.expires_at,
            "Attendance session created"
        );

        let proof = Proof::for_session(session.id)?;
        Ok((session, proof))
    }

    /// Re-issues the proof payload of an existing session.
    pub async fn issue_proof(&self, session_id: i64) -> AttendanceResult<Proof> {
        let session = AttendanceSession::get(&self.db, session_id).await?;
        Proof::for_session(session.id)
    }

    pub async fn check_in(
        &self,
        participant: &Identity,
        session_ref: SessionRef,
        now: DateTime<Utc>,
    ) -> AttendanceResult<CheckInOutcome> {
        let session_id = match session_ref {
            SessionRef::Id(id) => id,
            SessionRef::Proof(payload) => Proof::decode(&payload)?,
        };

        let session = AttendanceSession::get(&self.db, session_id).await?;

        let state = session.window_state(now);
        if state != WindowState::Open {
            tracing::debug!(
                session_id,
                user_id = participant.user_id,
                %state,
                "Check-in rejected"
            );
            return Err(AttendanceError::SessionClosed { session_id, state });
        }

        let status = session.status_at(now);
        let record = NewRecord::checked_in(session.id, participant.user_id, status, now);

        match AttendanceRecord::insert_one(&self.db, record).await {
            Ok(rec) => {
                tracing::info!(
                    session_id,
                    user_id = participant.user_id,
                    status = %rec.status,
                    "Attendance marked"
                );
                Ok(CheckInOutcome::Recorded {
                    status: rec.status,
                    time: rec.check_in_time,
                })
            }
            Err(StoreError::Duplicate { .. }) => {
                let existing =
                    AttendanceRecord::find_one(&self.db, session_id, participant.user_id)
                        .await?
                        .ok_or_else(|| {
                            AttendanceError::Storage(DbErr::RecordNotFound(format!(
                                "attendance record for user {} in session {session_id}",
                                participant.user_id
                            )))
                        })?;
                Ok(CheckInOutcome::AlreadyMarked {
                    status: existing.status,
                    time: existing.check_in_time,
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn get_session(
        &self,
        _requester: &Identity,
        session_id: i64,
    ) -> AttendanceResult<SessionDetails> {
        let (session, creator) = AttendanceSession::get_with_creator(&self.db, session_id).await?;
        Ok(SessionDetails {
            session,
            creator: creator.map(CreatorInfo::from),
        })
    }

    /// Paginated listing, newest first. Returns the page and the total count.
    pub async fn list_sessions(
        &self,
        requester: &Identity,
        params: ListSessions,
    ) -> AttendanceResult<(Vec<AttendanceSession>, u64)> {
        require_elevated(requester, "Only admins and wardens can list attendance sessions")?;
        Ok(AttendanceSession::list(&self.db, &params).await?)
    }

    pub async fn session_records(
        &self,
        requester: &Identity,
        session_id: i64,
    ) -> AttendanceResult<Vec<(AttendanceRecord, Option<User>)>> {
        require_elevated(requester, "Only admins and wardens can view session records")?;
        AttendanceSession::get(&self.db, session_id).await?;
        Ok(AttendanceRecord::find_by_session_with_users(&self.db, session_id).await?)
    }

    /// Attendance summary over the trailing `since_days` (configured default
    /// when `None`). Students may only read their own.
    pub async fn participant_summary(
        &self,
        requester: &Identity,
        participant_id: i64,
        since_days: Option<u32>,
        now: DateTime<Utc>,
    ) -> AttendanceResult<AttendanceSummary> {
        if !requester.is_elevated() && requester.user_id != participant_id {
            return Err(AttendanceError::Unauthorized(
                "Students can only view their own attendance".into(),
            ));
        }

        let days = since_days.unwrap_or_else(config::attendance_summary_days);
        Ok(AttendanceRecord::count_and_status_for_participant(
            &self.db,
            participant_id,
            days,
            now.date_naive(),
        )
        .await?)
    }
}

fn require_elevated(identity: &Identity, msg: &str) -> AttendanceResult<()> {
    if identity.is_elevated() {
        Ok(())
    } else {
        Err(AttendanceError::Unauthorized(msg.to_string()))
    }
}
