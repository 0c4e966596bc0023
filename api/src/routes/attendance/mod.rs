use axum::{
    Router,
    middleware::from_fn,
    routing::{get, post},
};
use util::state::AppState;

mod common;
mod get;
mod post;

pub use get::{
    get_my_summary, get_session, get_session_proof, get_user_summary, list_session_records,
    list_sessions,
};
pub use post::{check_in, create_session};

use crate::auth::guards::allow_elevated;

/// `/api/attendance` routes. Expects `allow_authenticated` to be applied by the caller.
pub fn attendance_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/sessions",
            get(list_sessions)
                .post(create_session)
                .route_layer(from_fn(allow_elevated)),
        )
        .route("/sessions/{session_id}", get(get_session))
        .route(
            "/sessions/{session_id}/proof",
            get(get_session_proof).route_layer(from_fn(allow_elevated)),
        )
        .route(
            "/sessions/{session_id}/records",
            get(list_session_records).route_layer(from_fn(allow_elevated)),
        )
        .route("/check-in", post(check_in))
        .route("/me/summary", get(get_my_summary))
        .route("/users/{user_id}/summary", get(get_user_summary))
}
