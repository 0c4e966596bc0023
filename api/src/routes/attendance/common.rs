use axum::http::StatusCode;
use chrono::{DateTime, NaiveTime, Utc};
use db::models::attendance_record::{AttendanceSummary, Model as AttendanceRecord};
use db::models::attendance_session::Model as AttendanceSession;
use db::models::user::Model as User;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use services::{AttendanceError, CheckInOutcome, Proof, SessionDetails};
use validator::Validate;

use crate::response::{ApiReply, ApiResponse};

pub const DEFAULT_PER_PAGE: u64 = 20;

#[derive(Debug, Serialize, Default)]
pub struct CreatorResponse {
    pub id: i64,
    pub name: String,
    pub email: String,
}

#[derive(Debug, Serialize, Default)]
pub struct SessionResponse {
    pub id: i64,
    pub title: String,
    pub created_by: i64,
    pub start_at: String,
    pub expires_at: String,
    pub duration_hours: f64,
    pub late_after_minutes: i32,
    pub active: bool,
    /// Lifecycle state at response time: `scheduled`, `open`,
    /// `closed_pending_reconciliation` or `reconciled`.
    pub state: String,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creator: Option<CreatorResponse>,
}

impl SessionResponse {
    pub fn new(m: AttendanceSession, now: DateTime<Utc>) -> Self {
        let state = serde_json::to_value(m.window_state(now))
            .ok()
            .and_then(|v| v.as_str().map(str::to_owned))
            .unwrap_or_default();
        Self {
            id: m.id,
            title: m.title,
            created_by: m.created_by,
            start_at: m.start_at.to_rfc3339(),
            expires_at: m.expires_at.to_rfc3339(),
            duration_hours: m.duration_hours,
            late_after_minutes: m.late_after_minutes,
            active: m.active,
            state,
            created_at: m.created_at.to_rfc3339(),
            creator: None,
        }
    }

    pub fn from_details(details: SessionDetails, now: DateTime<Utc>) -> Self {
        let mut base = Self::new(details.session, now);
        base.creator = details.creator.map(|c| CreatorResponse {
            id: c.id,
            name: c.name,
            email: c.email,
        });
        base
    }
}

#[derive(Debug, Serialize, Default)]
pub struct ProofResponse {
    pub session_id: i64,
    /// Text encoded in the QR code shown to residents.
    pub payload: String,
    /// SVG rendering of `payload` as a `data:` URL.
    pub qr_code: String,
}

impl From<Proof> for ProofResponse {
    fn from(p: Proof) -> Self {
        Self {
            session_id: p.session_id,
            payload: p.payload,
            qr_code: p.qr_code,
        }
    }
}

#[derive(Debug, Serialize, Default)]
pub struct CreateSessionResponse {
    pub session: SessionResponse,
    pub proof: ProofResponse,
}

#[derive(Debug, Serialize, Default)]
pub struct ListResponse {
    pub sessions: Vec<SessionResponse>,
    pub page: u64,
    pub per_page: u64,
    pub total: u64,
}

#[derive(Debug, Serialize, Default)]
pub struct RecordResponse {
    pub id: i64,
    pub session_id: i64,
    pub user_id: i64,
    pub user_name: Option<String>,
    pub user_email: Option<String>,
    pub date: String,
    pub status: String,
    pub check_in_time: Option<String>,
    pub created_at: String,
}

impl From<(AttendanceRecord, Option<User>)> for RecordResponse {
    fn from((r, user): (AttendanceRecord, Option<User>)) -> Self {
        Self {
            id: r.id,
            session_id: r.session_id,
            user_id: r.user_id,
            user_name: user.as_ref().map(|u| u.name.clone()),
            user_email: user.map(|u| u.email),
            date: r.date.to_string(),
            status: r.status.to_string(),
            check_in_time: r.check_in_time.map(format_time),
            created_at: r.created_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize, Default)]
pub struct CheckInResponse {
    pub status: String,
    pub time: Option<String>,
    pub already_marked: bool,
}

impl From<&CheckInOutcome> for CheckInResponse {
    fn from(outcome: &CheckInOutcome) -> Self {
        Self {
            status: outcome.status().to_string(),
            time: outcome.time().map(format_time),
            already_marked: outcome.is_already_marked(),
        }
    }
}

#[derive(Debug, Serialize, Default)]
pub struct SummaryResponse {
    pub user_id: i64,
    pub days: u32,
    pub total: i64,
    pub present: i64,
    pub late: i64,
    pub absent: i64,
    pub attendance_percentage: i64,
}

impl SummaryResponse {
    pub fn new(user_id: i64, days: u32, s: AttendanceSummary) -> Self {
        Self {
            user_id,
            days,
            total: s.total,
            present: s.present,
            late: s.late,
            absent: s.absent,
            attendance_percentage: s.attendance_percentage,
        }
    }
}

#[derive(Debug, Deserialize, Validate, Default)]
pub struct CreateSessionReq {
    #[validate(length(max = 200, message = "Title must be at most 200 characters"))]
    pub title: Option<String>,
    pub start_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    #[validate(range(exclusive_min = 0.0, message = "duration_hours must be a positive number"))]
    pub duration_hours: Option<f64>,
    #[validate(range(min = 0, message = "late_after_minutes must not be negative"))]
    pub late_after_minutes: Option<i32>,
}

/// Either `session_id` or the scanned `proof` (a string or the decoded object).
#[derive(Debug, Deserialize, Default)]
pub struct CheckInReq {
    pub session_id: Option<i64>,
    pub proof: Option<Value>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ListQuery {
    #[validate(range(min = 1, max = 1_000_000, message = "page must be between 1 and 1000000"))]
    pub page: Option<u64>,
    #[validate(range(min = 1, max = 100, message = "per_page must be between 1 and 100"))]
    pub per_page: Option<u64>,
    /// Title search.
    pub q: Option<String>,
    pub active: Option<bool>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct SummaryQuery {
    #[validate(range(min = 1, max = 365, message = "days must be between 1 and 365"))]
    pub days: Option<u32>,
}

pub fn format_time(t: NaiveTime) -> String {
    t.format("%H:%M:%S").to_string()
}

/// Maps a service failure onto the response envelope.
pub fn error_reply<T>(err: AttendanceError) -> ApiReply<T>
where
    T: Serialize + Default,
{
    let status = match &err {
        AttendanceError::Validation(_)
        | AttendanceError::InvalidProof(_)
        | AttendanceError::SessionClosed { .. } => StatusCode::BAD_REQUEST,
        AttendanceError::Unauthorized(_) => StatusCode::FORBIDDEN,
        AttendanceError::NotFound(_) => StatusCode::NOT_FOUND,
        AttendanceError::QrCode(e) => {
            tracing::error!(error = %e, "QR code rendering failed");
            return ApiResponse::fail(StatusCode::INTERNAL_SERVER_ERROR, "Could not render QR code");
        }
        AttendanceError::Storage(e) => {
            tracing::error!(error = %e, "Attendance storage failure");
            return ApiResponse::fail(StatusCode::INTERNAL_SERVER_ERROR, "Database error");
        }
    };
    ApiResponse::fail(status, err.to_string())
}
