use axum::{Extension, Json, extract::State, http::StatusCode};
use chrono::Utc;
use serde_json::Value;
use services::{AttendanceService, CheckInOutcome, CreateSession, SessionRef};
use util::state::AppState;
use validator::Validate;

use super::common::{
    CheckInReq, CheckInResponse, CreateSessionReq, CreateSessionResponse, ProofResponse,
    SessionResponse, error_reply,
};
use crate::auth::AuthUser;
use crate::response::{ApiReply, ApiResponse};
use crate::routes::common::format_validation_errors;

/// POST /api/attendance/sessions
///
/// Opens a check-in session and returns it with its QR payload. Admins and
/// wardens only.
///
/// ### Request Body
/// ```json
/// {
///   "title": "Night roll call",
///   "start_at": "2025-09-08T20:00:00Z",
///   "duration_hours": 2,
///   "late_after_minutes": 30
/// }
/// ```
/// Every field is optional. `expires_at` overrides `duration_hours` (default 24);
/// `late_after_minutes` defaults to 480; `start_at` defaults to now.
///
/// ### Responses
/// - `201 Created` `{ session, proof }`
/// - `400 Bad Request` on invalid timing values
/// - `403 Forbidden` for students
pub async fn create_session(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<CreateSessionReq>,
) -> ApiReply<CreateSessionResponse> {
    if let Err(e) = body.validate() {
        return ApiResponse::fail(StatusCode::BAD_REQUEST, format_validation_errors(&e));
    }

    let params = CreateSession {
        title: body.title,
        start_at: body.start_at,
        expires_at: body.expires_at,
        duration_hours: body.duration_hours,
        late_after_minutes: body.late_after_minutes,
    };

    let now = Utc::now();
    let service = AttendanceService::new(state.db_clone());
    match service.create_session(&user.identity(), params, now).await {
        Ok((session, proof)) => ApiResponse::reply(
            StatusCode::CREATED,
            CreateSessionResponse {
                session: SessionResponse::new(session, now),
                proof: ProofResponse::from(proof),
            },
            "Attendance session created",
        ),
        Err(e) => error_reply(e),
    }
}

/// POST /api/attendance/check-in
///
/// Records the caller's attendance. The body names the session either
/// directly or through the scanned QR payload:
///
/// ```json
/// { "proof": "{\"session_id\":12}" }
/// ```
///
/// ### Responses
/// - `200 OK` `{ status, time, already_marked }`. A repeat
///   check-in is not an error: it reports the standing record with
///   `already_marked: true`.
/// - `400 Bad Request` for a malformed proof or a session that is not open
/// - `404 Not Found`
pub async fn check_in(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<CheckInReq>,
) -> ApiReply<CheckInResponse> {
    let session_ref = match (body.session_id, body.proof) {
        (Some(id), _) => SessionRef::Id(id),
        (None, Some(Value::String(raw))) => SessionRef::Proof(raw),
        (None, Some(value)) => SessionRef::Proof(value.to_string()),
        (None, None) => {
            return ApiResponse::fail(
                StatusCode::BAD_REQUEST,
                "Either session_id or proof is required",
            );
        }
    };

    let service = AttendanceService::new(state.db_clone());
    match service
        .check_in(&user.identity(), session_ref, Utc::now())
        .await
    {
        Ok(outcome) => {
            let message = match &outcome {
                CheckInOutcome::Recorded { status, .. } => format!("Attendance marked as {status}"),
                CheckInOutcome::AlreadyMarked { .. } => {
                    "Attendance already marked for this session".to_string()
                }
            };
            ApiResponse::reply(
                StatusCode::OK,
                CheckInResponse::from(&outcome),
                message,
            )
        }
        Err(e) => error_reply(e),
    }
}
