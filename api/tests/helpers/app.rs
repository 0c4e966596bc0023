use api::auth::generate_jwt;
use api::routes::routes;
use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use db::models::user;
use db::test_utils::setup_test_db;
use sea_orm::DatabaseConnection;
use serde_json::Value;
use tower::ServiceExt;
use util::config::AppConfig;
use util::state::AppState;

pub const TEST_JWT_SECRET: &str = "test-secret-for-attendance-routes";

/// Fresh in-memory database plus the `/api` router on top of it.
pub async fn make_test_app() -> (Router, DatabaseConnection) {
    AppConfig::set_jwt_secret(TEST_JWT_SECRET);
    AppConfig::set_jwt_duration_minutes(60);

    let db = setup_test_db().await;
    let app = Router::new().nest("/api", routes(AppState::new(db.clone())));
    (app, db)
}

pub fn bearer(user: &user::Model) -> String {
    let (token, _) = generate_jwt(user.id, user.role).expect("Failed to sign test token");
    format!("Bearer {token}")
}

/// Fires one request and decodes the JSON envelope.
pub async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, json)
}
