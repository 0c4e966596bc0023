use axum::{
    Extension,
    extract::{Path, Query, State},
    http::StatusCode,
};
use chrono::Utc;
use db::models::attendance_session::ListSessions;
use services::AttendanceService;
use util::{config, state::AppState};
use validator::Validate;

use super::common::{
    DEFAULT_PER_PAGE, ListQuery, ListResponse, ProofResponse, RecordResponse, SessionResponse,
    SummaryQuery, SummaryResponse, error_reply,
};
use crate::auth::AuthUser;
use crate::response::{ApiReply, ApiResponse};
use crate::routes::common::format_validation_errors;

/// GET /api/attendance/sessions
///
/// Paginated session listing, newest first. Admins and wardens only.
///
/// ### Query
/// - `page` (default 1), `per_page` (default 20, max 100)
/// - `active` (optional) filter on the active flag
/// - `q` (optional) title search
///
/// ### Responses
/// - `200 OK` `{ sessions, page, per_page, total }`
/// - `400 Bad Request` on out-of-range paging
/// - `403 Forbidden` for students
pub async fn list_sessions(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<ListQuery>,
) -> ApiReply<ListResponse> {
    if let Err(e) = query.validate() {
        return ApiResponse::fail(StatusCode::BAD_REQUEST, format_validation_errors(&e));
    }

    let page = query.page.unwrap_or(1);
    let per_page = query.per_page.unwrap_or(DEFAULT_PER_PAGE);
    let params = ListSessions {
        page,
        per_page,
        active: query.active,
        query: query.q,
    };

    let service = AttendanceService::new(state.db_clone());
    match service.list_sessions(&user.identity(), params).await {
        Ok((rows, total)) => {
            let now = Utc::now();
            let sessions = rows
                .into_iter()
                .map(|m| SessionResponse::new(m, now))
                .collect();
            ApiResponse::reply(
                StatusCode::OK,
                ListResponse {
                    sessions,
                    page,
                    per_page,
                    total,
                },
                "Attendance sessions retrieved",
            )
        }
        Err(e) => error_reply(e),
    }
}

/// GET /api/attendance/sessions/{session_id}
///
/// Session metadata with its creator. Any authenticated user.
///
/// ### Responses
/// - `200 OK`
/// - `404 Not Found`
pub async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<i64>,
    Extension(user): Extension<AuthUser>,
) -> ApiReply<SessionResponse> {
    let service = AttendanceService::new(state.db_clone());
    match service.get_session(&user.identity(), session_id).await {
        Ok(details) => ApiResponse::reply(
            StatusCode::OK,
            SessionResponse::from_details(details, Utc::now()),
            "Attendance session retrieved",
        ),
        Err(e) => error_reply(e),
    }
}

/// GET /api/attendance/sessions/{session_id}/proof
///
/// Re-issues the QR payload of a session. Admins and wardens only.
pub async fn get_session_proof(
    State(state): State<AppState>,
    Path(session_id): Path<i64>,
) -> ApiReply<ProofResponse> {
    let service = AttendanceService::new(state.db_clone());
    match service.issue_proof(session_id).await {
        Ok(proof) => ApiResponse::reply(
            StatusCode::OK,
            ProofResponse::from(proof),
            "Attendance proof issued",
        ),
        Err(e) => error_reply(e),
    }
}

/// GET /api/attendance/sessions/{session_id}/records
///
/// Every ledger row of the session with the participant's name and email.
/// Admins and wardens only.
pub async fn list_session_records(
    State(state): State<AppState>,
    Path(session_id): Path<i64>,
    Extension(user): Extension<AuthUser>,
) -> ApiReply<Vec<RecordResponse>> {
    let service = AttendanceService::new(state.db_clone());
    match service.session_records(&user.identity(), session_id).await {
        Ok(rows) => ApiResponse::reply(
            StatusCode::OK,
            rows.into_iter().map(RecordResponse::from).collect(),
            "Attendance records retrieved",
        ),
        Err(e) => error_reply(e),
    }
}

/// GET /api/attendance/me/summary?days=30
///
/// The caller's own attendance over the trailing window.
pub async fn get_my_summary(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<SummaryQuery>,
) -> ApiReply<SummaryResponse> {
    let user_id = user.0.sub;
    summary(state, user, user_id, query).await
}

/// GET /api/attendance/users/{user_id}/summary?days=30
///
/// ### Responses
/// - `200 OK`
/// - `403 Forbidden` when a student asks for someone else
pub async fn get_user_summary(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<SummaryQuery>,
) -> ApiReply<SummaryResponse> {
    summary(state, user, user_id, query).await
}

async fn summary(
    state: AppState,
    user: AuthUser,
    participant_id: i64,
    query: SummaryQuery,
) -> ApiReply<SummaryResponse> {
    if let Err(e) = query.validate() {
        return ApiResponse::fail(StatusCode::BAD_REQUEST, format_validation_errors(&e));
    }

    let days = query.days.unwrap_or_else(config::attendance_summary_days);
    let service = AttendanceService::new(state.db_clone());
    match service
        .participant_summary(&user.identity(), participant_id, Some(days), Utc::now())
        .await
    {
        Ok(s) => ApiResponse::reply(
            StatusCode::OK,
            SummaryResponse::new(participant_id, days, s),
            "Attendance summary retrieved",
        ),
        Err(e) => error_reply(e),
    }
}
