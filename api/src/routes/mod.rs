//! HTTP routes under `/api`.
//!
//! - `/health` → liveness probe (public)
//! - `/attendance` → sessions, check-ins and summaries (authenticated; some
//!   routes further restricted to admins and wardens)

use crate::auth::guards::allow_authenticated;
use crate::routes::{attendance::attendance_routes, health::health_routes};
use axum::{Router, middleware::from_fn};
use util::state::AppState;

pub mod attendance;
pub mod common;
pub mod health;

/// Builds the `/api` router with its state already applied.
pub fn routes(app_state: AppState) -> Router {
    Router::new()
        .nest("/health", health_routes())
        .nest(
            "/attendance",
            attendance_routes().route_layer(from_fn(allow_authenticated)),
        )
        .with_state(app_state)
}
